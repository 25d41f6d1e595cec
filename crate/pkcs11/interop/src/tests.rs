#![allow(clippy::as_conversions)]

use std::{
    ffi::c_void,
    mem::{align_of, offset_of, size_of},
    ptr,
    str::FromStr,
    sync::OnceLock,
};

use chrono::NaiveDate;
use cosmian_logger::log_init;
use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE, CK_C_GetFunctionList, CK_DATE, CK_FUNCTION_LIST, CK_FUNCTION_LIST_PACKED,
    CK_FUNCTION_LIST_PTR_PTR, CK_FUNCTION_NAMES, CK_INFO, CK_RSA_PKCS_OAEP_PARAMS,
    CK_RSA_PKCS_PSS_PARAMS, CK_RV, CK_ULONG, CK_VERSION, CKA_ALLOWED_MECHANISMS, CKA_CLASS,
    CKA_END_DATE, CKA_ID, CKA_LABEL, CKA_MODULUS_BITS, CKA_START_DATE, CKA_TOKEN, CKA_VALUE,
    CKA_WRAP_TEMPLATE, CKG_MGF1_SHA256, CKM_AES_CBC, CKM_AES_GCM, CKM_RSA_PKCS_OAEP,
    CKM_RSA_PKCS_PSS, CKM_SHA256, CKO_SECRET_KEY, CKR_BUFFER_TOO_SMALL, CKR_GENERAL_ERROR,
    CKR_OK, CKZ_DATA_SPECIFIED, rv_name,
};

use crate::{
    FunctionListLayout, FunctionTable, FunctionTableStrategy, InteropError, NativeLibrary,
    NativeMechanism, ObjectAttribute, Pkcs11Config, UnmanagedBuffer, adapter::bind, check_rv,
    ck_size_of, info::Info, live_allocations, protocol::call_with_buffer,
};

extern "C" fn dummy_entry_point() {}

fn dummy_address() -> usize {
    dummy_entry_point as usize
}

/// A function list laid out like `T`, its version set and every slot pointing
/// to `dummy_entry_point`, except the one at `missing`.
fn fake_function_list<T: Copy>(first_slot: usize, missing: Option<usize>) -> T {
    let mut buffer = UnmanagedBuffer::allocate(size_of::<T>()).unwrap();
    buffer
        .write_value(0, &CK_VERSION { major: 2, minor: 40 })
        .unwrap();
    for i in 0..CK_FUNCTION_NAMES.len() {
        let address = if missing == Some(i) { 0 } else { dummy_address() };
        buffer
            .write_value(first_slot + i * size_of::<usize>(), &address)
            .unwrap();
    }
    unsafe { buffer.read_value::<T>(0) }.unwrap()
}

fn natural_list(missing: Option<usize>) -> CK_FUNCTION_LIST {
    fake_function_list(offset_of!(CK_FUNCTION_LIST, C_Initialize), missing)
}

fn packed_list(missing: Option<usize>) -> CK_FUNCTION_LIST_PACKED {
    fake_function_list(offset_of!(CK_FUNCTION_LIST_PACKED, C_Initialize), missing)
}

fn assert_complete(table: &FunctionTable) {
    let entries = table.entries();
    assert_eq!(entries.len(), CK_FUNCTION_NAMES.len());
    for ((name, address), expected) in entries.iter().zip(CK_FUNCTION_NAMES) {
        assert_eq!(name, expected);
        assert!(!address.is_null(), "{name} is null");
    }
}

#[test]
fn test_allocate_rejects_negative_size() {
    log_init(None);
    let result = UnmanagedBuffer::allocate(-1_i64);
    assert!(matches!(result, Err(InteropError::Allocation(_))));
}

#[test]
fn test_allocate_zero_is_null() {
    let before = live_allocations();
    let buffer = UnmanagedBuffer::allocate(0_usize).unwrap();
    assert!(buffer.as_mut_ptr().is_null());
    assert_eq!(buffer.ck_len(), 0);
    assert_eq!(live_allocations(), before);
}

#[test]
fn test_allocate_is_zeroed_and_tracked() {
    let before = live_allocations();
    let buffer = UnmanagedBuffer::allocate(32_u32).unwrap();
    assert_eq!(live_allocations(), before + 1);
    assert!(buffer.as_slice().iter().all(|b| *b == 0));
    buffer.free();
    assert_eq!(live_allocations(), before);
}

#[test]
fn test_buffer_bounds() {
    let mut buffer = UnmanagedBuffer::allocate(4_usize).unwrap();
    buffer.write_bytes(1, &[1, 2, 3]).unwrap();
    assert_eq!(buffer.read_bytes(0, 4).unwrap(), vec![0, 1, 2, 3]);
    assert!(matches!(
        buffer.write_bytes(2, &[1, 2, 3]),
        Err(InteropError::OutOfBounds {
            offset: 2,
            len: 3,
            capacity: 4
        })
    ));
    assert!(buffer.read_bytes(3, 2).is_err());
    assert!(buffer.write_value(1, &0_u32).is_err());

    let mut empty = UnmanagedBuffer::empty();
    assert!(matches!(
        empty.write_bytes(0, b"x"),
        Err(InteropError::NullArgument(_))
    ));
    empty.write_bytes(0, &[]).unwrap();
}

#[test]
fn test_buffer_value_round_trip() {
    let value = CK_RSA_PKCS_PSS_PARAMS {
        hashAlg: CKM_SHA256,
        mgf: CKG_MGF1_SHA256,
        sLen: 32,
    };
    let buffer = UnmanagedBuffer::from_value(&value).unwrap();
    assert_eq!(buffer.len(), size_of::<CK_RSA_PKCS_PSS_PARAMS>());
    assert_eq!(
        buffer.ck_len(),
        ck_size_of::<CK_RSA_PKCS_PSS_PARAMS>().unwrap()
    );
    let read = unsafe { buffer.read_value::<CK_RSA_PKCS_PSS_PARAMS>(0) }.unwrap();
    assert_eq!({ read.hashAlg }, CKM_SHA256);
    assert_eq!({ read.mgf }, CKG_MGF1_SHA256);
    assert_eq!({ read.sLen }, 32);

    let copy = buffer.try_clone().unwrap();
    assert_ne!(copy.as_mut_ptr(), buffer.as_mut_ptr());
    assert_eq!(copy.as_slice(), buffer.as_slice());
}

#[test]
fn test_attribute_without_value() {
    let attribute = ObjectAttribute::new(CKA_LABEL);
    let raw = attribute.raw();
    assert!(raw.pValue.is_null());
    assert_eq!({ raw.ulValueLen }, 0);
    assert_eq!(attribute.get_string().unwrap(), None);
}

#[test]
fn test_attribute_ulong_and_bool() {
    let class = ObjectAttribute::from_ulong(CKA_CLASS, CKO_SECRET_KEY).unwrap();
    assert_eq!(class.value_len(), size_of::<CK_ULONG>());
    assert_eq!(class.get_ulong().unwrap(), Some(CKO_SECRET_KEY));

    let token = ObjectAttribute::from_bool(CKA_TOKEN, true).unwrap();
    assert_eq!(token.value(), Some(&[1_u8][..]));
    assert_eq!(token.get_bool().unwrap(), Some(true));
    let token = ObjectAttribute::from_bool(CKA_TOKEN, false).unwrap();
    assert_eq!(token.get_bool().unwrap(), Some(false));

    // a boolean read as an integer has the wrong size
    assert!(matches!(
        token.get_ulong(),
        Err(InteropError::MalformedValue { length: 1, .. })
    ));
}

#[test]
fn test_attribute_string_has_no_terminator() {
    let label = ObjectAttribute::from_string(CKA_LABEL, Some("Hello world")).unwrap();
    assert_eq!(label.value_len(), "Hello world".len());
    assert_eq!(label.get_string().unwrap().as_deref(), Some("Hello world"));

    let accents = ObjectAttribute::from_string(CKA_LABEL, Some("clé")).unwrap();
    assert_eq!(accents.value_len(), 4);
    assert_eq!(accents.get_string().unwrap().as_deref(), Some("clé"));
}

#[test]
fn test_attribute_null_values() {
    let label = ObjectAttribute::from_string(CKA_LABEL, None).unwrap();
    let raw = label.raw();
    assert!(raw.pValue.is_null());
    assert_eq!({ raw.ulValueLen }, 0);
    assert_eq!(label.get_string().unwrap(), None);

    let value = ObjectAttribute::from_bytes(CKA_VALUE, None).unwrap();
    assert!(value.raw().pValue.is_null());
    assert_eq!(value.get_bytes().unwrap(), None);

    // an empty value shares the no-value encoding
    let empty = ObjectAttribute::from_bytes(CKA_VALUE, Some(&[])).unwrap();
    assert!(empty.raw().pValue.is_null());
    assert_eq!(empty.get_bytes().unwrap(), None);
}

#[test]
fn test_attribute_bytes() {
    let id = ObjectAttribute::from_bytes(CKA_ID, Some(&[0xde, 0xad, 0xbe, 0xef])).unwrap();
    assert_eq!(id.get_bytes().unwrap(), Some(vec![0xde, 0xad, 0xbe, 0xef]));
}

#[test]
fn test_attribute_null_pointer_with_length_is_rejected() {
    let raw = CK_ATTRIBUTE {
        type_: CKA_VALUE,
        pValue: ptr::null_mut(),
        ulValueLen: 4,
    };
    assert!(matches!(
        unsafe { crate::attribute::read_bytes(&raw) },
        Err(InteropError::NullArgument(_))
    ));
}

#[test]
fn test_attribute_date() {
    let date = NaiveDate::from_ymd_opt(2012, 1, 30).unwrap();
    let start = ObjectAttribute::from_date(CKA_START_DATE, Some(date)).unwrap();
    assert_eq!(start.value_len(), size_of::<CK_DATE>());
    assert_eq!(start.value(), Some(&b"20120130"[..]));
    assert_eq!(start.get_date().unwrap(), Some(date));

    let padded = NaiveDate::from_ymd_opt(987, 3, 4).unwrap();
    let end = ObjectAttribute::from_date(CKA_END_DATE, Some(padded)).unwrap();
    assert_eq!(end.value(), Some(&b"09870304"[..]));
    assert_eq!(end.get_date().unwrap(), Some(padded));

    let none = ObjectAttribute::from_date(CKA_END_DATE, None).unwrap();
    assert_eq!(none.get_date().unwrap(), None);
}

#[test]
fn test_attribute_date_rejects_other_lengths() {
    let short = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"2012013")).unwrap();
    assert!(matches!(
        short.get_date(),
        Err(InteropError::MalformedValue {
            length: 7,
            element_size: 8,
            ..
        })
    ));
    let long = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"201201300")).unwrap();
    assert!(long.get_date().is_err());

    let not_digits = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"2012-1-3")).unwrap();
    assert!(matches!(
        not_digits.get_date(),
        Err(InteropError::InvalidDate(_))
    ));
    let out_of_range = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"20121340")).unwrap();
    assert!(matches!(
        out_of_range.get_date(),
        Err(InteropError::InvalidDate(_))
    ));

    let blank = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"        ")).unwrap();
    assert_eq!(blank.get_date().unwrap(), None);
    let zeros = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"00000000")).unwrap();
    assert_eq!(zeros.get_date().unwrap(), None);
    let nuls = ObjectAttribute::from_bytes(CKA_START_DATE, Some(&[0_u8; 8])).unwrap();
    assert_eq!(nuls.get_date().unwrap(), None);

    let mixed = ObjectAttribute::from_bytes(CKA_START_DATE, Some(b"0 0\0    ")).unwrap();
    assert!(matches!(mixed.get_date(), Err(InteropError::InvalidDate(_))));
}

#[test]
fn test_attribute_nested_array() {
    let children = vec![
        ObjectAttribute::from_ulong(CKA_CLASS, CKO_SECRET_KEY).unwrap(),
        ObjectAttribute::from_string(CKA_LABEL, Some("wrapped")).unwrap(),
        ObjectAttribute::from_bool(CKA_TOKEN, true).unwrap(),
    ];
    let template = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, Some(&children)).unwrap();
    assert_eq!(template.value_len(), children.len() * size_of::<CK_ATTRIBUTE>());

    let records = template.get_attributes().unwrap().unwrap();
    assert_eq!(records.len(), children.len());
    for (record, child) in records.iter().zip(&children) {
        assert_eq!({ record.type_ }, child.type_());
        // the parent points to its own copies
        assert_ne!(record.pValue, child.raw().pValue);
        let decoded = unsafe { ObjectAttribute::from_raw(record) }.unwrap();
        assert_eq!(&decoded, child);
    }

    let nested = template.get_nested().unwrap().unwrap();
    assert_eq!(nested, children);

    // dropping the children leaves the parent readable
    drop(children);
    let label = unsafe { ObjectAttribute::from_raw(&records[1]) }.unwrap();
    assert_eq!(label.get_string().unwrap().as_deref(), Some("wrapped"));
}

#[test]
fn test_attribute_nested_copies_compare_equal() {
    let children = vec![
        ObjectAttribute::from_ulong(CKA_CLASS, CKO_SECRET_KEY).unwrap(),
        ObjectAttribute::from_string(CKA_LABEL, Some("wrapped")).unwrap(),
    ];
    let template = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, Some(&children)).unwrap();

    let copy = template.try_clone().unwrap();
    assert_ne!(copy.raw().pValue, template.raw().pValue);
    assert_eq!(copy, template);
    let rebuilt = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, Some(&children)).unwrap();
    assert_eq!(rebuilt, template);

    let other = vec![ObjectAttribute::from_string(CKA_LABEL, Some("other")).unwrap()];
    let different = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, Some(&other)).unwrap();
    assert_ne!(different, template);
}

#[test]
fn test_attribute_nested_array_empty() {
    let empty = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, Some(&[])).unwrap();
    assert!(empty.raw().pValue.is_null());
    assert!(empty.get_attributes().unwrap().is_none());
    let none = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, None).unwrap();
    assert!(!none.has_value());
}

#[test]
fn test_attribute_nested_array_malformed() {
    let bytes = vec![0_u8; size_of::<CK_ATTRIBUTE>() + 1];
    let attribute = ObjectAttribute::from_bytes(CKA_WRAP_TEMPLATE, Some(&bytes)).unwrap();
    assert!(matches!(
        attribute.get_attributes(),
        Err(InteropError::MalformedValue { length, element_size, .. })
            if length == size_of::<CK_ATTRIBUTE>() + 1 && element_size == size_of::<CK_ATTRIBUTE>()
    ));
}

#[test]
fn test_attribute_ulong_array() {
    let mechanisms = [CKM_AES_CBC, CKM_AES_GCM, CKM_RSA_PKCS_OAEP];
    let allowed =
        ObjectAttribute::from_ulongs(CKA_ALLOWED_MECHANISMS, Some(&mechanisms)).unwrap();
    assert_eq!(allowed.value_len(), 3 * size_of::<CK_ULONG>());
    assert_eq!(allowed.get_ulongs().unwrap(), Some(mechanisms.to_vec()));

    let bytes = vec![0_u8; 2 * size_of::<CK_ULONG>() - 1];
    let malformed = ObjectAttribute::from_bytes(CKA_ALLOWED_MECHANISMS, Some(&bytes)).unwrap();
    assert!(matches!(
        malformed.get_ulongs(),
        Err(InteropError::MalformedValue { .. })
    ));

    let none = ObjectAttribute::from_ulongs(CKA_ALLOWED_MECHANISMS, Some(&[])).unwrap();
    assert_eq!(none.get_ulongs().unwrap(), None);
}

#[test]
fn test_attributes_are_freed() {
    let before = live_allocations();
    let children = [
        ObjectAttribute::from_ulong(CKA_MODULUS_BITS, 2048).unwrap(),
        ObjectAttribute::from_string(CKA_LABEL, Some("key")).unwrap(),
    ];
    let template = ObjectAttribute::from_attributes(CKA_WRAP_TEMPLATE, Some(&children)).unwrap();
    // both children, their copies and the record array
    assert_eq!(live_allocations(), before + 5);
    drop(children);
    assert_eq!(live_allocations(), before + 3);
    template.free();
    assert_eq!(live_allocations(), before);
}

#[test]
fn test_mechanism_without_parameter() {
    let mechanism = NativeMechanism::new(CKM_SHA256);
    let raw = mechanism.raw();
    assert_eq!({ raw.mechanism }, CKM_SHA256);
    assert!(raw.pParameter.is_null());
    assert_eq!({ raw.ulParameterLen }, 0);
    assert!(unsafe { mechanism.read_parameters::<CK_RSA_PKCS_PSS_PARAMS>() }
        .unwrap()
        .is_none());
}

#[test]
fn test_mechanism_bytes_parameter() {
    let iv = [7_u8; 16];
    let mechanism = NativeMechanism::with_bytes(CKM_AES_CBC, Some(&iv)).unwrap();
    assert_eq!({ mechanism.raw().ulParameterLen }, 16);
    assert_eq!(mechanism.parameter(), Some(&iv[..]));
}

#[test]
fn test_mechanism_structured_parameter() {
    let params = CK_RSA_PKCS_PSS_PARAMS {
        hashAlg: CKM_SHA256,
        mgf: CKG_MGF1_SHA256,
        sLen: 32,
    };
    let mechanism = NativeMechanism::with_parameters(CKM_RSA_PKCS_PSS, &params).unwrap();
    assert_eq!(
        { mechanism.raw().ulParameterLen },
        ck_size_of::<CK_RSA_PKCS_PSS_PARAMS>().unwrap()
    );
    let read = unsafe { mechanism.read_parameters::<CK_RSA_PKCS_PSS_PARAMS>() }
        .unwrap()
        .unwrap();
    assert_eq!({ read.sLen }, 32);

    // reading with the wrong shape is rejected
    assert!(matches!(
        unsafe { mechanism.read_parameters::<CK_RSA_PKCS_OAEP_PARAMS>() },
        Err(InteropError::MalformedValue { .. })
    ));
}

#[test]
fn test_mechanism_oaep_owns_its_label() {
    let before = live_allocations();
    let mechanism =
        NativeMechanism::rsa_pkcs_oaep(CKM_SHA256, CKG_MGF1_SHA256, Some(b"label")).unwrap();
    let params = unsafe { mechanism.read_parameters::<CK_RSA_PKCS_OAEP_PARAMS>() }
        .unwrap()
        .unwrap();
    assert_eq!({ params.source }, CKZ_DATA_SPECIFIED);
    assert_eq!({ params.ulSourceDataLen }, 5);
    let label =
        unsafe { std::slice::from_raw_parts(params.pSourceData.cast::<u8>(), 5) }.to_vec();
    assert_eq!(label, b"label");
    mechanism.free();
    assert_eq!(live_allocations(), before);

    let without_label = NativeMechanism::rsa_pkcs_oaep(CKM_SHA256, CKG_MGF1_SHA256, None).unwrap();
    let params = unsafe { without_label.read_parameters::<CK_RSA_PKCS_OAEP_PARAMS>() }
        .unwrap()
        .unwrap();
    assert!(params.pSourceData.is_null());
    assert_eq!({ params.ulSourceDataLen }, 0);
}

#[test]
fn test_mechanism_gcm() {
    let mechanism = NativeMechanism::aes_gcm(&[1_u8; 12], Some(b"aad"), 128).unwrap();
    assert_eq!(mechanism.mechanism_type(), CKM_AES_GCM);
    let params = unsafe { mechanism.read_parameters::<cosmian_pkcs11_sys::CK_GCM_PARAMS>() }
        .unwrap()
        .unwrap();
    assert_eq!({ params.ulIvLen }, 12);
    assert_eq!({ params.ulIvBits }, 96);
    assert_eq!({ params.ulAADLen }, 3);
    assert_eq!({ params.ulTagBits }, 128);
}

#[test]
fn test_two_call_protocol_fills_reported_count() {
    let mut calls = 0;
    let values = call_with_buffer::<CK_ULONG, _>("C_GetSlotList", |buffer, count| {
        calls += 1;
        if !buffer.is_null() {
            for i in 0..3 {
                unsafe { *buffer.add(i) = 10 + i as CK_ULONG };
            }
        }
        *count = 3;
        CKR_OK
    })
    .unwrap();
    assert_eq!(calls, 2);
    assert_eq!(values, vec![10, 11, 12]);
}

#[test]
fn test_two_call_protocol_skips_second_call_on_zero() {
    let mut calls = 0;
    let values = call_with_buffer::<CK_ULONG, _>("C_GetMechanismList", |buffer, count| {
        calls += 1;
        assert!(buffer.is_null(), "the second call must not happen");
        *count = 0;
        CKR_OK
    })
    .unwrap();
    assert_eq!(calls, 1);
    assert!(values.is_empty());
}

#[test]
fn test_two_call_protocol_rejects_unallocatable_count() {
    let mut calls = 0;
    let result = call_with_buffer::<[u64; 8], _>("C_GetSlotList", |buffer, count| {
        calls += 1;
        assert!(buffer.is_null(), "the second call must not happen");
        *count = CK_ULONG::MAX;
        CKR_OK
    });
    assert!(matches!(result, Err(InteropError::Allocation(_))));
    assert_eq!(calls, 1);
}

#[test]
fn test_two_call_protocol_truncates_to_actual_count() {
    let values = call_with_buffer::<u8, _>("C_Sign", |buffer, count| {
        if buffer.is_null() {
            *count = 8;
        } else {
            unsafe { ptr::copy_nonoverlapping(b"abc".as_ptr(), buffer, 3) };
            *count = 3;
        }
        CKR_OK
    })
    .unwrap();
    assert_eq!(values, b"abc");

    // a module claiming more than it was given never makes the result overrun
    let values = call_with_buffer::<u8, _>("C_Sign", |buffer, count| {
        *count = if buffer.is_null() { 2 } else { 5 };
        CKR_OK
    })
    .unwrap();
    assert_eq!(values.len(), 2);
}

#[test]
fn test_two_call_protocol_propagates_errors() {
    let result = call_with_buffer::<u8, _>("C_Encrypt", |buffer, count| {
        if buffer.is_null() {
            *count = 4;
            CKR_OK
        } else {
            CKR_BUFFER_TOO_SMALL
        }
    });
    match result {
        Err(e @ InteropError::ReturnValue { .. }) => {
            assert_eq!(e.rv(), Some(CKR_BUFFER_TOO_SMALL));
            assert!(e.to_string().contains("CKR_BUFFER_TOO_SMALL"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_object_count_error_names_both_counts() {
    let error = InteropError::ObjectCount {
        function: "C_FindObjects",
        returned: 70,
        requested: 64,
    };
    assert_eq!(
        error.to_string(),
        "C_FindObjects returned 70 handles, 64 requested"
    );
    assert_eq!(error.rv(), None);
}

#[test]
fn test_function_list_layouts() {
    // natural alignment pads the version to a pointer boundary, packing does not
    assert_eq!(
        offset_of!(CK_FUNCTION_LIST, C_Initialize),
        align_of::<usize>()
    );
    assert_eq!(
        offset_of!(CK_FUNCTION_LIST_PACKED, C_Initialize),
        size_of::<CK_VERSION>()
    );
    assert_eq!(
        size_of::<CK_FUNCTION_LIST_PACKED>(),
        size_of::<CK_VERSION>() + CK_FUNCTION_NAMES.len() * size_of::<usize>()
    );
    assert_eq!(CK_FUNCTION_NAMES.len(), 68);
    assert_eq!(CK_FUNCTION_NAMES[0], "C_Initialize");
    assert_eq!(CK_FUNCTION_NAMES[67], "C_WaitForSlotEvent");
}

#[test]
fn test_function_table_from_natural_list_is_exhaustive() {
    let table = FunctionTable::from_natural(natural_list(None)).unwrap();
    assert_complete(&table);
    assert_eq!(table.version(), Some(CK_VERSION { major: 2, minor: 40 }));
}

#[test]
fn test_function_table_from_packed_list_is_exhaustive() {
    let table = FunctionTable::from_packed(packed_list(None)).unwrap();
    assert_complete(&table);
    assert_eq!(table.version(), Some(CK_VERSION { major: 2, minor: 40 }));
}

#[test]
fn test_function_table_rejects_incomplete_lists() {
    match FunctionTable::from_natural(natural_list(Some(10))) {
        Err(InteropError::IncompleteFunctionList(missing)) => {
            assert_eq!(missing, vec![CK_FUNCTION_NAMES[10]]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    match FunctionTable::from_packed(packed_list(Some(67))) {
        Err(InteropError::IncompleteFunctionList(missing)) => {
            assert_eq!(missing, vec!["C_WaitForSlotEvent"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

static FAKE_LIST: OnceLock<usize> = OnceLock::new();

unsafe extern "C" fn fake_get_function_list(list: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV {
    let address = *FAKE_LIST.get_or_init(|| Box::into_raw(Box::new(natural_list(None))) as usize);
    unsafe { *list = address as *mut CK_FUNCTION_LIST };
    CKR_OK
}

unsafe extern "C" fn failing_get_function_list(_list: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV {
    CKR_GENERAL_ERROR
}

unsafe extern "C" fn null_get_function_list(list: CK_FUNCTION_LIST_PTR_PTR) -> CK_RV {
    unsafe { *list = ptr::null_mut() };
    CKR_OK
}

#[test]
fn test_function_table_from_function_list() {
    let get_function_list: CK_C_GetFunctionList = fake_get_function_list;
    let table = unsafe {
        FunctionTable::from_function_list(get_function_list, FunctionListLayout::Natural)
    }
    .unwrap();
    assert_complete(&table);

    let failing: CK_C_GetFunctionList = failing_get_function_list;
    assert!(matches!(
        unsafe { FunctionTable::from_function_list(failing, FunctionListLayout::Natural) },
        Err(InteropError::FunctionList(CKR_GENERAL_ERROR))
    ));

    let null: CK_C_GetFunctionList = null_get_function_list;
    assert!(matches!(
        unsafe { FunctionTable::from_function_list(null, FunctionListLayout::Packed) },
        Err(InteropError::NullFunctionList)
    ));
}

#[test]
fn test_function_table_per_symbol() {
    let mut requested = Vec::new();
    let table = FunctionTable::resolve_each(|name| {
        requested.push(name);
        Ok(dummy_address() as *mut c_void)
    })
    .unwrap();
    assert_complete(&table);
    assert_eq!(table.version(), None);
    assert_eq!(requested, CK_FUNCTION_NAMES);
}

#[test]
fn test_function_table_per_symbol_reports_every_failure() {
    let result = FunctionTable::resolve_each(|name| match name {
        "C_DigestKey" => Err(InteropError::LibraryNotLoaded),
        "C_SeedRandom" => Ok(ptr::null_mut()),
        _ => Ok(dummy_address() as *mut c_void),
    });
    match result {
        Err(InteropError::UnresolvedEntryPoints(failures)) => {
            assert_eq!(failures.len(), 2);
            assert!(failures[1].contains("C_SeedRandom"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_bind() {
    assert!(matches!(
        unsafe { bind::<CK_C_GetFunctionList>("C_GetFunctionList", ptr::null_mut()) },
        Err(InteropError::NullFunctionPointer(symbol)) if symbol == "C_GetFunctionList"
    ));
    assert!(matches!(
        unsafe { bind::<u8>("C_Login", dummy_address() as *mut c_void) },
        Err(InteropError::FunctionPointerSize { size: 1, .. })
    ));
    let entry: Option<extern "C" fn()> =
        unsafe { bind::<extern "C" fn()>("dummy", dummy_address() as *mut c_void) }.ok();
    assert!(entry.is_some());
}

#[test]
fn test_layout_detection() {
    assert_eq!(
        FunctionListLayout::for_family("windows"),
        FunctionListLayout::Packed
    );
    assert_eq!(
        FunctionListLayout::for_family("unix"),
        FunctionListLayout::Natural
    );
    #[cfg(target_os = "windows")]
    assert_eq!(FunctionListLayout::detect(), FunctionListLayout::Packed);
    #[cfg(not(target_os = "windows"))]
    assert_eq!(FunctionListLayout::detect(), FunctionListLayout::Natural);

    assert_eq!(
        FunctionTableStrategy::from_str("per_symbol").unwrap(),
        FunctionTableStrategy::PerSymbol
    );
    assert_eq!(
        FunctionTableStrategy::SelfDescribing.to_string(),
        "self_describing"
    );
}

#[test]
fn test_config_from_toml() {
    let config = Pkcs11Config::from_toml_str(
        r#"
        library_path = "/usr/lib/softhsm/libsofthsm2.so"
        strategy = "per_symbol"
        function_list_layout = "packed"
        "#,
    )
    .unwrap();
    assert_eq!(
        config,
        Pkcs11Config::new("/usr/lib/softhsm/libsofthsm2.so")
            .with_strategy(FunctionTableStrategy::PerSymbol)
            .with_function_list_layout(FunctionListLayout::Packed)
    );
    assert_eq!(config.layout(), FunctionListLayout::Packed);

    let defaults = Pkcs11Config::from_toml_str(r#"library_path = "libfoo.so""#).unwrap();
    assert_eq!(defaults.strategy, FunctionTableStrategy::SelfDescribing);
    assert_eq!(defaults.layout(), FunctionListLayout::detect());
}

#[test]
fn test_config_errors() {
    assert!(matches!(
        Pkcs11Config::from_toml_str("strategy = \"per_symbol\""),
        Err(InteropError::Config(_))
    ));
    assert!(matches!(
        Pkcs11Config::from_toml_str("library_path = \"a.so\"\nunknown = 1"),
        Err(InteropError::Toml(_))
    ));
    assert!(matches!(
        Pkcs11Config::from_toml_str("library_path = \"a.so\"\nstrategy = \"lazy\""),
        Err(InteropError::Toml(_))
    ));
}

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pkcs11.toml");
    std::fs::write(&path, "library_path = \"libmodule.so\"\n").unwrap();
    let config = Pkcs11Config::from_file(&path).unwrap();
    assert_eq!(config.library_path, std::path::PathBuf::from("libmodule.so"));

    assert!(matches!(
        Pkcs11Config::from_file(dir.path().join("missing.toml")),
        Err(InteropError::Io(_))
    ));
}

#[test]
fn test_load_missing_library() {
    log_init(None);
    match NativeLibrary::load("/nonexistent/libno_such_pkcs11_module.so") {
        Err(InteropError::LibraryLoad { path, .. }) => {
            assert!(path.contains("libno_such_pkcs11_module"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("a missing library was loaded"),
    }
}

#[test]
fn test_info_trims_padding() {
    let mut info = CK_INFO {
        cryptokiVersion: CK_VERSION { major: 2, minor: 40 },
        ..CK_INFO::default()
    };
    info.manufacturerID = [b' '; 32];
    info.manufacturerID[..7].copy_from_slice(b"Cosmian");
    info.libraryDescription[..4].copy_from_slice(b"mock");
    let info = Info::from(info);
    assert_eq!(info.manufacturer_id, "Cosmian");
    assert_eq!(info.library_description, "mock");
    assert_eq!(info.cryptoki_version.to_string(), "2.40");
}

#[test]
fn test_check_rv() {
    check_rv("C_Login", CKR_OK).unwrap();
    let e = check_rv("C_Login", CKR_GENERAL_ERROR).unwrap_err();
    assert_eq!(e.rv(), Some(CKR_GENERAL_ERROR));
    assert_eq!(rv_name(CKR_GENERAL_ERROR), "CKR_GENERAL_ERROR");
    assert_eq!(rv_name(0x8000_0001), "CKR_VENDOR_DEFINED");
}
