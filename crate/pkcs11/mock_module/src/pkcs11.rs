//! The exported `C_*` entry points and the function list returned by
//! `C_GetFunctionList`.

#![allow(clippy::significant_drop_tightening)]

use std::{
    ptr, slice,
    sync::atomic::{AtomicBool, Ordering},
};

use cosmian_logger::{debug, info};
use cosmian_pkcs11_sys::*;
use sha3::{Digest, Sha3_256};

use crate::{
    MockError, MockResult,
    store::{
        EMPTY_SLOT_ID, MECHANISMS, Object, Operation, TOKEN_SLOT_ID, USER_PIN, is_sensitive,
        token,
    },
};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

pub(crate) fn result_to_rv<F>(name: &str, f: F) -> CK_RV
where
    F: FnOnce() -> MockResult<()>,
{
    match f() {
        Ok(()) => CKR_OK,
        Err(e) => {
            debug!("{name}: {e}");
            e.into()
        }
    }
}

macro_rules! cryptoki_fn {
    (unsafe fn $name:ident ( $($arg:ident : $type:ty),* $(,)?) $body:block) => {
        #[tracing::instrument(level = tracing::Level::TRACE, ret)]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name($($arg: $type),*) -> CK_RV {
            result_to_rv(stringify!($name), || $body)
        }
    };
}

macro_rules! cryptoki_fn_not_supported {
    ($name:ident, $($arg:ident: $type:ty),*) => {
        cryptoki_fn!(unsafe fn $name($($arg: $type),*) {
            initialized!();
            Err(MockError::FunctionNotSupported)
        });
    };
}

macro_rules! not_null {
    ($ptr:expr, $variable_name:expr) => {
        if $ptr.is_null() {
            return Err(MockError::BadArguments(format!(
                "{} is a null pointer",
                $variable_name
            )));
        }
    };
}

macro_rules! initialized {
    () => {
        if !INITIALIZED.load(Ordering::SeqCst) {
            return Err(MockError::CryptokiNotInitialized);
        }
    };
}

macro_rules! function_list {
    ($($name:ident: $signature:ty),* $(,)?) => {
        #[cfg(not(target_os = "windows"))]
        static FUNC_LIST: CK_FUNCTION_LIST = CK_FUNCTION_LIST {
            version: CK_VERSION {
                major: CRYPTOKI_VERSION_MAJOR,
                minor: CRYPTOKI_VERSION_MINOR,
            },
            $($name: Some($name),)*
        };

        #[cfg(target_os = "windows")]
        static FUNC_LIST: CK_FUNCTION_LIST_PACKED = CK_FUNCTION_LIST_PACKED {
            version: CK_VERSION {
                major: CRYPTOKI_VERSION_MAJOR,
                minor: CRYPTOKI_VERSION_MINOR,
            },
            $($name: Some($name),)*
        };
    };
}

with_pkcs11_functions!(function_list);

/// `text` padded with spaces to a fixed-width field.
fn padded<const N: usize>(text: &str) -> [u8; N] {
    let mut field = [b' '; N];
    let len = text.len().min(N);
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
    field
}

fn check_token_slot(slot_id: CK_SLOT_ID) -> MockResult<()> {
    match slot_id {
        TOKEN_SLOT_ID => Ok(()),
        EMPTY_SLOT_ID => Err(MockError::TokenNotPresent(slot_id)),
        _ => Err(MockError::SlotIdInvalid(slot_id)),
    }
}

fn ulong_value(type_: CK_ATTRIBUTE_TYPE, bytes: &[u8]) -> MockResult<CK_ULONG> {
    bytes
        .try_into()
        .map(CK_ULONG::from_ne_bytes)
        .map_err(|_| MockError::AttributeValueInvalid(type_))
}

/// Copy `len` caller bytes; a null pointer is only accepted with a zero length.
unsafe fn input(data: CK_BYTE_PTR, len: CK_ULONG) -> MockResult<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    not_null!(data, "input data");
    Ok(unsafe { slice::from_raw_parts(data, usize::try_from(len)?) }.to_vec())
}

/// Copy the attributes of a caller template.
unsafe fn read_template(
    template: CK_ATTRIBUTE_PTR,
    count: CK_ULONG,
) -> MockResult<Vec<(CK_ATTRIBUTE_TYPE, Vec<u8>)>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    not_null!(template, "pTemplate");
    let attributes = unsafe { slice::from_raw_parts(template, usize::try_from(count)?) };
    attributes
        .iter()
        .map(|attribute| -> MockResult<(CK_ATTRIBUTE_TYPE, Vec<u8>)> {
            let (type_, value, len) = (attribute.type_, attribute.pValue, attribute.ulValueLen);
            if len == 0 {
                return Ok((type_, Vec::new()));
            }
            not_null!(value, format!("the value of attribute {type_:#x}"));
            let bytes = unsafe { slice::from_raw_parts(value.cast::<u8>(), usize::try_from(len)?) };
            Ok((type_, bytes.to_vec()))
        })
        .collect()
}

/// Answer a variable-length output request: report the length when `out` is
/// null, fail with `CKR_BUFFER_TOO_SMALL` when `*count` is too small, copy otherwise.
unsafe fn write_list<T: Copy>(values: &[T], out: *mut T, count: CK_ULONG_PTR) -> MockResult<()> {
    not_null!(count, "the output length");
    let len = CK_ULONG::try_from(values.len())?;
    if out.is_null() {
        unsafe { *count = len };
        return Ok(());
    }
    let capacity = unsafe { *count };
    unsafe { *count = len };
    if capacity < len {
        return Err(MockError::BufferTooSmall);
    }
    unsafe { ptr::copy_nonoverlapping(values.as_ptr(), out, values.len()) };
    Ok(())
}

/// Fill one record of a `C_GetAttributeValue` template.
fn write_value(value: &[u8], attribute: &mut CK_ATTRIBUTE) -> MockResult<()> {
    let len = CK_ULONG::try_from(value.len())?;
    let (target, capacity) = (attribute.pValue, attribute.ulValueLen);
    if !target.is_null() {
        if capacity < len {
            return Err(MockError::BufferTooSmall);
        }
        unsafe { ptr::copy_nonoverlapping(value.as_ptr(), target.cast::<u8>(), value.len()) };
    }
    attribute.ulValueLen = len;
    Ok(())
}

/// Whether a digest call ends the operation: a length query or a short
/// buffer leaves it active.
fn digest_done(output: CK_BYTE_PTR, result: &MockResult<()>) -> bool {
    !output.is_null() && !matches!(result, Err(MockError::BufferTooSmall))
}

cryptoki_fn!(
    unsafe fn C_Initialize(pInitArgs: CK_VOID_PTR) {
        if !pInitArgs.is_null() {
            let args = unsafe { *pInitArgs.cast::<CK_C_INITIALIZE_ARGS>() };
            let reserved = args.pReserved;
            if !reserved.is_null() {
                return Err(MockError::BadArguments(
                    "C_Initialize: pReserved must be null".to_owned(),
                ));
            }
        }
        if INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(MockError::CryptokiAlreadyInitialized);
        }
        info!("mock module initialized");
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_Finalize(pReserved: CK_VOID_PTR) {
        initialized!();
        if !pReserved.is_null() {
            return Err(MockError::BadArguments(
                "C_Finalize: pReserved must be null".to_owned(),
            ));
        }
        token()?.reset();
        INITIALIZED.store(false, Ordering::SeqCst);
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetInfo(pInfo: CK_INFO_PTR) {
        initialized!();
        not_null!(pInfo, "C_GetInfo: pInfo");
        let info = CK_INFO {
            cryptokiVersion: CK_VERSION {
                major: CRYPTOKI_VERSION_MAJOR,
                minor: CRYPTOKI_VERSION_MINOR,
            },
            manufacturerID: padded("Cosmian"),
            flags: 0,
            libraryDescription: padded("Cosmian PKCS#11 mock module"),
            libraryVersion: CK_VERSION { major: 1, minor: 0 },
        };
        unsafe { *pInfo = info };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetFunctionList(ppFunctionList: CK_FUNCTION_LIST_PTR_PTR) {
        not_null!(ppFunctionList, "C_GetFunctionList: ppFunctionList");
        unsafe { *ppFunctionList = ptr::from_ref(&FUNC_LIST).cast_mut().cast() };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetSlotList(
        tokenPresent: CK_BBOOL,
        pSlotList: CK_SLOT_ID_PTR,
        pulCount: CK_ULONG_PTR,
    ) {
        initialized!();
        let slots: &[CK_SLOT_ID] = if tokenPresent == CK_FALSE {
            &[TOKEN_SLOT_ID, EMPTY_SLOT_ID]
        } else {
            &[TOKEN_SLOT_ID]
        };
        unsafe { write_list(slots, pSlotList, pulCount) }
    }
);

cryptoki_fn!(
    unsafe fn C_GetSlotInfo(slotID: CK_SLOT_ID, pInfo: CK_SLOT_INFO_PTR) {
        initialized!();
        not_null!(pInfo, "C_GetSlotInfo: pInfo");
        let (description, flags) = match slotID {
            TOKEN_SLOT_ID => ("Mock slot with token", CKF_TOKEN_PRESENT | CKF_REMOVABLE_DEVICE),
            EMPTY_SLOT_ID => ("Mock slot without token", CKF_REMOVABLE_DEVICE),
            _ => return Err(MockError::SlotIdInvalid(slotID)),
        };
        let info = CK_SLOT_INFO {
            slotDescription: padded(description),
            manufacturerID: padded("Cosmian"),
            flags,
            hardwareVersion: CK_VERSION { major: 1, minor: 0 },
            firmwareVersion: CK_VERSION { major: 1, minor: 0 },
        };
        unsafe { *pInfo = info };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetTokenInfo(slotID: CK_SLOT_ID, pInfo: CK_TOKEN_INFO_PTR) {
        initialized!();
        check_token_slot(slotID)?;
        not_null!(pInfo, "C_GetTokenInfo: pInfo");
        let (session_count, rw_session_count) = token()?.session_counts()?;
        let info = CK_TOKEN_INFO {
            label: padded("Cosmian mock token"),
            manufacturerID: padded("Cosmian"),
            model: padded("mock"),
            serialNumber: padded("0000000000000001"),
            flags: CKF_TOKEN_INITIALIZED
                | CKF_USER_PIN_INITIALIZED
                | CKF_LOGIN_REQUIRED
                | CKF_RNG,
            ulMaxSessionCount: CK_EFFECTIVELY_INFINITE,
            ulSessionCount: session_count,
            ulMaxRwSessionCount: CK_EFFECTIVELY_INFINITE,
            ulRwSessionCount: rw_session_count,
            ulMaxPinLen: 8,
            ulMinPinLen: 4,
            ulTotalPublicMemory: CK_UNAVAILABLE_INFORMATION,
            ulFreePublicMemory: CK_UNAVAILABLE_INFORMATION,
            ulTotalPrivateMemory: CK_UNAVAILABLE_INFORMATION,
            ulFreePrivateMemory: CK_UNAVAILABLE_INFORMATION,
            hardwareVersion: CK_VERSION { major: 1, minor: 0 },
            firmwareVersion: CK_VERSION { major: 1, minor: 0 },
            utcTime: padded(""),
        };
        unsafe { *pInfo = info };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetMechanismList(
        slotID: CK_SLOT_ID,
        pMechanismList: CK_MECHANISM_TYPE_PTR,
        pulCount: CK_ULONG_PTR,
    ) {
        initialized!();
        check_token_slot(slotID)?;
        let mechanisms: Vec<CK_MECHANISM_TYPE> =
            MECHANISMS.iter().map(|(mechanism, ..)| *mechanism).collect();
        unsafe { write_list(&mechanisms, pMechanismList, pulCount) }
    }
);

cryptoki_fn!(
    unsafe fn C_GetMechanismInfo(
        slotID: CK_SLOT_ID,
        type_: CK_MECHANISM_TYPE,
        pInfo: CK_MECHANISM_INFO_PTR,
    ) {
        initialized!();
        check_token_slot(slotID)?;
        not_null!(pInfo, "C_GetMechanismInfo: pInfo");
        let (_, min, max, flags) = MECHANISMS
            .iter()
            .find(|(mechanism, ..)| *mechanism == type_)
            .ok_or(MockError::MechanismInvalid(type_))?;
        let info = CK_MECHANISM_INFO {
            ulMinKeySize: *min,
            ulMaxKeySize: *max,
            flags: *flags,
        };
        unsafe { *pInfo = info };
        Ok(())
    }
);

cryptoki_fn_not_supported!(
    C_InitToken,
    slotID: CK_SLOT_ID,
    pPin: CK_UTF8CHAR_PTR,
    ulPinLen: CK_ULONG,
    pLabel: CK_UTF8CHAR_PTR
);
cryptoki_fn_not_supported!(
    C_InitPIN,
    hSession: CK_SESSION_HANDLE,
    pPin: CK_UTF8CHAR_PTR,
    ulPinLen: CK_ULONG
);
cryptoki_fn_not_supported!(
    C_SetPIN,
    hSession: CK_SESSION_HANDLE,
    pOldPin: CK_UTF8CHAR_PTR,
    ulOldLen: CK_ULONG,
    pNewPin: CK_UTF8CHAR_PTR,
    ulNewLen: CK_ULONG
);

cryptoki_fn!(
    unsafe fn C_OpenSession(
        slotID: CK_SLOT_ID,
        flags: CK_FLAGS,
        pApplication: CK_VOID_PTR,
        Notify: CK_NOTIFY,
        phSession: CK_SESSION_HANDLE_PTR,
    ) {
        initialized!();
        check_token_slot(slotID)?;
        not_null!(phSession, "C_OpenSession: phSession");
        if flags & CKF_SERIAL_SESSION == 0 {
            return Err(MockError::SessionParallelNotSupported);
        }
        let session = token()?.open_session(slotID, flags);
        debug!("C_OpenSession: session {session} opened");
        unsafe { *phSession = session };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_CloseSession(hSession: CK_SESSION_HANDLE) {
        initialized!();
        token()?.close_session(hSession)
    }
);

cryptoki_fn!(
    unsafe fn C_CloseAllSessions(slotID: CK_SLOT_ID) {
        initialized!();
        check_token_slot(slotID)?;
        token()?.close_all_sessions(slotID);
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetSessionInfo(hSession: CK_SESSION_HANDLE, pInfo: CK_SESSION_INFO_PTR) {
        initialized!();
        not_null!(pInfo, "C_GetSessionInfo: pInfo");
        let token = token()?;
        let session = token.session(hSession)?;
        let info = CK_SESSION_INFO {
            slotID: session.slot_id,
            state: token.session_state(session),
            flags: session.flags,
            ulDeviceError: 0,
        };
        unsafe { *pInfo = info };
        Ok(())
    }
);

cryptoki_fn_not_supported!(
    C_GetOperationState,
    hSession: CK_SESSION_HANDLE,
    pOperationState: CK_BYTE_PTR,
    pulOperationStateLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_SetOperationState,
    hSession: CK_SESSION_HANDLE,
    pOperationState: CK_BYTE_PTR,
    ulOperationStateLen: CK_ULONG,
    hEncryptionKey: CK_OBJECT_HANDLE,
    hAuthenticationKey: CK_OBJECT_HANDLE
);

cryptoki_fn!(
    unsafe fn C_Login(
        hSession: CK_SESSION_HANDLE,
        userType: CK_USER_TYPE,
        pPin: CK_UTF8CHAR_PTR,
        ulPinLen: CK_ULONG,
    ) {
        initialized!();
        let pin = unsafe { input(pPin, ulPinLen) }?;
        let mut token = token()?;
        token.session(hSession)?;
        if userType != CKU_USER {
            return Err(MockError::UserTypeInvalid(userType));
        }
        if token.logged_in {
            return Err(MockError::UserAlreadyLoggedIn);
        }
        if pin != USER_PIN {
            return Err(MockError::PinIncorrect);
        }
        token.logged_in = true;
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_Logout(hSession: CK_SESSION_HANDLE) {
        initialized!();
        let mut token = token()?;
        token.session(hSession)?;
        if !token.logged_in {
            return Err(MockError::UserNotLoggedIn);
        }
        token.logged_in = false;
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_CreateObject(
        hSession: CK_SESSION_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
        phObject: CK_OBJECT_HANDLE_PTR,
    ) {
        initialized!();
        not_null!(phObject, "C_CreateObject: phObject");
        let template = unsafe { read_template(pTemplate, ulCount) }?;
        let mut token = token()?;
        token.session(hSession)?;
        if !template.iter().any(|(type_, _)| *type_ == CKA_CLASS) {
            return Err(MockError::TemplateIncomplete(CKA_CLASS));
        }
        let object = token.insert_object(template.into_iter().collect());
        debug!("C_CreateObject: object {object} created");
        unsafe { *phObject = object };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_CopyObject(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
        phNewObject: CK_OBJECT_HANDLE_PTR,
    ) {
        initialized!();
        not_null!(phNewObject, "C_CopyObject: phNewObject");
        let template = unsafe { read_template(pTemplate, ulCount) }?;
        let mut token = token()?;
        token.session(hSession)?;
        let mut copy = token.object(hObject)?.clone();
        copy.extend(template);
        let object = token.insert_object(copy);
        unsafe { *phNewObject = object };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_DestroyObject(hSession: CK_SESSION_HANDLE, hObject: CK_OBJECT_HANDLE) {
        initialized!();
        let mut token = token()?;
        token.session(hSession)?;
        token.remove_object(hObject)
    }
);

cryptoki_fn!(
    unsafe fn C_GetObjectSize(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pulSize: CK_ULONG_PTR,
    ) {
        initialized!();
        not_null!(pulSize, "C_GetObjectSize: pulSize");
        let token = token()?;
        token.session(hSession)?;
        let size: usize = token.object(hObject)?.values().map(Vec::len).sum();
        unsafe { *pulSize = CK_ULONG::try_from(size)? };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetAttributeValue(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) {
        initialized!();
        let token = token()?;
        token.session(hSession)?;
        let object = token.object(hObject)?;
        if ulCount == 0 {
            return Ok(());
        }
        not_null!(pTemplate, "C_GetAttributeValue: pTemplate");
        let template = unsafe { slice::from_raw_parts_mut(pTemplate, usize::try_from(ulCount)?) };
        // every record is processed; the last failure is the one reported
        let mut result = Ok(());
        for attribute in template.iter_mut() {
            let type_ = attribute.type_;
            let outcome = match object.get(&type_) {
                None => Err(MockError::AttributeTypeInvalid(type_)),
                Some(_) if is_sensitive(object, type_) => Err(MockError::AttributeSensitive(type_)),
                Some(value) => write_value(value, attribute),
            };
            if let Err(e) = outcome {
                attribute.ulValueLen = CK_UNAVAILABLE_INFORMATION;
                result = Err(e);
            }
        }
        result
    }
);

cryptoki_fn!(
    unsafe fn C_SetAttributeValue(
        hSession: CK_SESSION_HANDLE,
        hObject: CK_OBJECT_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) {
        initialized!();
        let template = unsafe { read_template(pTemplate, ulCount) }?;
        let mut token = token()?;
        token.session(hSession)?;
        token.object_mut(hObject)?.extend(template);
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_FindObjectsInit(
        hSession: CK_SESSION_HANDLE,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
    ) {
        initialized!();
        let template = unsafe { read_template(pTemplate, ulCount) }?;
        let mut token = token()?;
        let found = token.matching(&template);
        let session = token.session_mut(hSession)?;
        if session.operation.is_some() {
            return Err(MockError::OperationActive(hSession));
        }
        debug!("C_FindObjectsInit: {} objects match", found.len());
        session.operation = Some(Operation::Find(found));
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_FindObjects(
        hSession: CK_SESSION_HANDLE,
        phObject: CK_OBJECT_HANDLE_PTR,
        ulMaxObjectCount: CK_ULONG,
        pulObjectCount: CK_ULONG_PTR,
    ) {
        initialized!();
        not_null!(pulObjectCount, "C_FindObjects: pulObjectCount");
        let mut token = token()?;
        let session = token.session_mut(hSession)?;
        let Some(Operation::Find(remaining)) = &mut session.operation else {
            return Err(MockError::OperationNotInitialized(hSession));
        };
        let count = remaining.len().min(usize::try_from(ulMaxObjectCount)?);
        if count > 0 {
            not_null!(phObject, "C_FindObjects: phObject");
            unsafe { ptr::copy_nonoverlapping(remaining.as_ptr(), phObject, count) };
            *remaining = remaining.split_off(count);
        }
        unsafe { *pulObjectCount = CK_ULONG::try_from(count)? };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_FindObjectsFinal(hSession: CK_SESSION_HANDLE) {
        initialized!();
        let mut token = token()?;
        let session = token.session_mut(hSession)?;
        if !matches!(session.operation, Some(Operation::Find(_))) {
            return Err(MockError::OperationNotInitialized(hSession));
        }
        session.operation = None;
        Ok(())
    }
);

cryptoki_fn_not_supported!(
    C_EncryptInit,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE
);
cryptoki_fn_not_supported!(
    C_Encrypt,
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pEncryptedData: CK_BYTE_PTR,
    pulEncryptedDataLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_EncryptUpdate,
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
    pEncryptedPart: CK_BYTE_PTR,
    pulEncryptedPartLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_EncryptFinal,
    hSession: CK_SESSION_HANDLE,
    pLastEncryptedPart: CK_BYTE_PTR,
    pulLastEncryptedPartLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_DecryptInit,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE
);
cryptoki_fn_not_supported!(
    C_Decrypt,
    hSession: CK_SESSION_HANDLE,
    pEncryptedData: CK_BYTE_PTR,
    ulEncryptedDataLen: CK_ULONG,
    pData: CK_BYTE_PTR,
    pulDataLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_DecryptUpdate,
    hSession: CK_SESSION_HANDLE,
    pEncryptedPart: CK_BYTE_PTR,
    ulEncryptedPartLen: CK_ULONG,
    pPart: CK_BYTE_PTR,
    pulPartLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_DecryptFinal,
    hSession: CK_SESSION_HANDLE,
    pLastPart: CK_BYTE_PTR,
    pulLastPartLen: CK_ULONG_PTR
);

cryptoki_fn!(
    unsafe fn C_DigestInit(hSession: CK_SESSION_HANDLE, pMechanism: CK_MECHANISM_PTR) {
        initialized!();
        not_null!(pMechanism, "C_DigestInit: pMechanism");
        let mechanism = unsafe { (*pMechanism).mechanism };
        if mechanism != CKM_SHA3_256 {
            return Err(MockError::MechanismInvalid(mechanism));
        }
        let mut token = token()?;
        let session = token.session_mut(hSession)?;
        if session.operation.is_some() {
            return Err(MockError::OperationActive(hSession));
        }
        session.operation = Some(Operation::Digest(Vec::new()));
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_Digest(
        hSession: CK_SESSION_HANDLE,
        pData: CK_BYTE_PTR,
        ulDataLen: CK_ULONG,
        pDigest: CK_BYTE_PTR,
        pulDigestLen: CK_ULONG_PTR,
    ) {
        initialized!();
        let data = unsafe { input(pData, ulDataLen) }?;
        let mut token = token()?;
        let session = token.session_mut(hSession)?;
        let Some(Operation::Digest(parts)) = &session.operation else {
            return Err(MockError::OperationNotInitialized(hSession));
        };
        if !parts.is_empty() {
            // a multi-part digest is in progress
            return Err(MockError::OperationActive(hSession));
        }
        let digest = Sha3_256::digest(&data);
        let result = unsafe { write_list(digest.as_slice(), pDigest, pulDigestLen) };
        if digest_done(pDigest, &result) {
            session.operation = None;
        }
        result
    }
);

cryptoki_fn!(
    unsafe fn C_DigestUpdate(hSession: CK_SESSION_HANDLE, pPart: CK_BYTE_PTR, ulPartLen: CK_ULONG) {
        initialized!();
        let part = unsafe { input(pPart, ulPartLen) }?;
        let mut token = token()?;
        let session = token.session_mut(hSession)?;
        let Some(Operation::Digest(parts)) = &mut session.operation else {
            return Err(MockError::OperationNotInitialized(hSession));
        };
        parts.extend_from_slice(&part);
        Ok(())
    }
);

cryptoki_fn_not_supported!(C_DigestKey, hSession: CK_SESSION_HANDLE, hKey: CK_OBJECT_HANDLE);

cryptoki_fn!(
    unsafe fn C_DigestFinal(
        hSession: CK_SESSION_HANDLE,
        pDigest: CK_BYTE_PTR,
        pulDigestLen: CK_ULONG_PTR,
    ) {
        initialized!();
        let mut token = token()?;
        let session = token.session_mut(hSession)?;
        let Some(Operation::Digest(parts)) = &session.operation else {
            return Err(MockError::OperationNotInitialized(hSession));
        };
        let digest = Sha3_256::digest(parts);
        let result = unsafe { write_list(digest.as_slice(), pDigest, pulDigestLen) };
        if digest_done(pDigest, &result) {
            session.operation = None;
        }
        result
    }
);

cryptoki_fn_not_supported!(
    C_SignInit,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE
);
cryptoki_fn_not_supported!(
    C_Sign,
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pSignature: CK_BYTE_PTR,
    pulSignatureLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_SignUpdate,
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG
);
cryptoki_fn_not_supported!(
    C_SignFinal,
    hSession: CK_SESSION_HANDLE,
    pSignature: CK_BYTE_PTR,
    pulSignatureLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_SignRecoverInit,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE
);
cryptoki_fn_not_supported!(
    C_SignRecover,
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pSignature: CK_BYTE_PTR,
    pulSignatureLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_VerifyInit,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE
);
cryptoki_fn_not_supported!(
    C_Verify,
    hSession: CK_SESSION_HANDLE,
    pData: CK_BYTE_PTR,
    ulDataLen: CK_ULONG,
    pSignature: CK_BYTE_PTR,
    ulSignatureLen: CK_ULONG
);
cryptoki_fn_not_supported!(
    C_VerifyUpdate,
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG
);
cryptoki_fn_not_supported!(
    C_VerifyFinal,
    hSession: CK_SESSION_HANDLE,
    pSignature: CK_BYTE_PTR,
    ulSignatureLen: CK_ULONG
);
cryptoki_fn_not_supported!(
    C_VerifyRecoverInit,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hKey: CK_OBJECT_HANDLE
);
cryptoki_fn_not_supported!(
    C_VerifyRecover,
    hSession: CK_SESSION_HANDLE,
    pSignature: CK_BYTE_PTR,
    ulSignatureLen: CK_ULONG,
    pData: CK_BYTE_PTR,
    pulDataLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_DigestEncryptUpdate,
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
    pEncryptedPart: CK_BYTE_PTR,
    pulEncryptedPartLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_DecryptDigestUpdate,
    hSession: CK_SESSION_HANDLE,
    pEncryptedPart: CK_BYTE_PTR,
    ulEncryptedPartLen: CK_ULONG,
    pPart: CK_BYTE_PTR,
    pulPartLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_SignEncryptUpdate,
    hSession: CK_SESSION_HANDLE,
    pPart: CK_BYTE_PTR,
    ulPartLen: CK_ULONG,
    pEncryptedPart: CK_BYTE_PTR,
    pulEncryptedPartLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_DecryptVerifyUpdate,
    hSession: CK_SESSION_HANDLE,
    pEncryptedPart: CK_BYTE_PTR,
    ulEncryptedPartLen: CK_ULONG,
    pPart: CK_BYTE_PTR,
    pulPartLen: CK_ULONG_PTR
);

cryptoki_fn!(
    unsafe fn C_GenerateKey(
        hSession: CK_SESSION_HANDLE,
        pMechanism: CK_MECHANISM_PTR,
        pTemplate: CK_ATTRIBUTE_PTR,
        ulCount: CK_ULONG,
        phKey: CK_OBJECT_HANDLE_PTR,
    ) {
        initialized!();
        not_null!(pMechanism, "C_GenerateKey: pMechanism");
        not_null!(phKey, "C_GenerateKey: phKey");
        let mechanism = unsafe { (*pMechanism).mechanism };
        let key_type = match mechanism {
            CKM_AES_KEY_GEN => CKK_AES,
            CKM_GENERIC_SECRET_KEY_GEN => CKK_GENERIC_SECRET,
            _ => return Err(MockError::MechanismInvalid(mechanism)),
        };
        let mut object: Object = unsafe { read_template(pTemplate, ulCount) }?
            .into_iter()
            .collect();
        let value_len = object
            .get(&CKA_VALUE_LEN)
            .ok_or(MockError::TemplateIncomplete(CKA_VALUE_LEN))?;
        let value_len = ulong_value(CKA_VALUE_LEN, value_len)?;
        let valid_len = match key_type {
            CKK_AES => matches!(value_len, 16 | 24 | 32),
            _ => (1..=512).contains(&value_len),
        };
        if !valid_len {
            return Err(MockError::AttributeValueInvalid(CKA_VALUE_LEN));
        }

        let mut token = token()?;
        token.session(hSession)?;
        let value = token.random_bytes(usize::try_from(value_len)?);
        object.insert(CKA_CLASS, CKO_SECRET_KEY.to_ne_bytes().to_vec());
        object.insert(CKA_KEY_TYPE, key_type.to_ne_bytes().to_vec());
        object.insert(CKA_VALUE, value);
        object.insert(CKA_LOCAL, vec![CK_TRUE]);
        object.entry(CKA_SENSITIVE).or_insert_with(|| vec![CK_TRUE]);
        let key = token.insert_object(object);
        debug!("C_GenerateKey: key {key} generated");
        unsafe { *phKey = key };
        Ok(())
    }
);

cryptoki_fn_not_supported!(
    C_GenerateKeyPair,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    pPublicKeyTemplate: CK_ATTRIBUTE_PTR,
    ulPublicKeyAttributeCount: CK_ULONG,
    pPrivateKeyTemplate: CK_ATTRIBUTE_PTR,
    ulPrivateKeyAttributeCount: CK_ULONG,
    phPublicKey: CK_OBJECT_HANDLE_PTR,
    phPrivateKey: CK_OBJECT_HANDLE_PTR
);
cryptoki_fn_not_supported!(
    C_WrapKey,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hWrappingKey: CK_OBJECT_HANDLE,
    hKey: CK_OBJECT_HANDLE,
    pWrappedKey: CK_BYTE_PTR,
    pulWrappedKeyLen: CK_ULONG_PTR
);
cryptoki_fn_not_supported!(
    C_UnwrapKey,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hUnwrappingKey: CK_OBJECT_HANDLE,
    pWrappedKey: CK_BYTE_PTR,
    ulWrappedKeyLen: CK_ULONG,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulAttributeCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR
);
cryptoki_fn_not_supported!(
    C_DeriveKey,
    hSession: CK_SESSION_HANDLE,
    pMechanism: CK_MECHANISM_PTR,
    hBaseKey: CK_OBJECT_HANDLE,
    pTemplate: CK_ATTRIBUTE_PTR,
    ulAttributeCount: CK_ULONG,
    phKey: CK_OBJECT_HANDLE_PTR
);

cryptoki_fn!(
    unsafe fn C_SeedRandom(hSession: CK_SESSION_HANDLE, pSeed: CK_BYTE_PTR, ulSeedLen: CK_ULONG) {
        initialized!();
        let seed = unsafe { input(pSeed, ulSeedLen) }?;
        let mut token = token()?;
        token.session(hSession)?;
        token.seed(&seed);
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GenerateRandom(
        hSession: CK_SESSION_HANDLE,
        RandomData: CK_BYTE_PTR,
        ulRandomLen: CK_ULONG,
    ) {
        initialized!();
        let mut token = token()?;
        token.session(hSession)?;
        if ulRandomLen == 0 {
            return Ok(());
        }
        not_null!(RandomData, "C_GenerateRandom: RandomData");
        let bytes = token.random_bytes(usize::try_from(ulRandomLen)?);
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), RandomData, bytes.len()) };
        Ok(())
    }
);

cryptoki_fn!(
    unsafe fn C_GetFunctionStatus(hSession: CK_SESSION_HANDLE) {
        initialized!();
        Err(MockError::FunctionNotParallel)
    }
);

cryptoki_fn!(
    unsafe fn C_CancelFunction(hSession: CK_SESSION_HANDLE) {
        initialized!();
        Err(MockError::FunctionNotParallel)
    }
);

cryptoki_fn!(
    unsafe fn C_WaitForSlotEvent(flags: CK_FLAGS, pSlot: CK_SLOT_ID_PTR, pRserved: CK_VOID_PTR) {
        initialized!();
        // slots never change: a blocking wait would never return
        if flags & CKF_DONT_BLOCK == 0 {
            return Err(MockError::FunctionNotSupported);
        }
        Err(MockError::NoEvent)
    }
);
