//! Building and decoding `CK_ATTRIBUTE` records.
//!
//! Builders allocate: every [`ObjectAttribute`] owns the unmanaged memory its
//! record points to. Readers borrow: the `read_*` functions decode a record
//! owned elsewhere and never take ownership of its memory.
//!
//! A missing value and an empty value share one encoding, a null pointer with
//! a zero length, and both decode to `None`.

use std::{fmt, mem::size_of, ptr, slice};

use chrono::{Datelike, NaiveDate};
use cosmian_logger::trace;
use cosmian_pkcs11_sys::{
    CK_ATTRIBUTE, CK_ATTRIBUTE_TYPE, CK_BBOOL, CK_DATE, CK_FALSE, CK_TRUE, CK_ULONG,
    CK_UNAVAILABLE_INFORMATION, CKF_ARRAY_ATTRIBUTE,
};

use crate::{InteropError, InteropResult, memory::UnmanagedBuffer};

/// Byte length of an encoded `CK_DATE`.
pub const DATE_LENGTH: usize = size_of::<CK_DATE>();

/// An attribute record together with the memory it points to.
pub struct ObjectAttribute {
    type_: CK_ATTRIBUTE_TYPE,
    value: Option<UnmanagedBuffer>,
    /// Copies of the children of an array attribute; the records in `value`
    /// point into these.
    nested: Vec<ObjectAttribute>,
}

impl ObjectAttribute {
    /// An attribute without a value: null pointer, zero length.
    #[must_use]
    pub const fn new(type_: CK_ATTRIBUTE_TYPE) -> Self {
        Self {
            type_,
            value: None,
            nested: Vec::new(),
        }
    }

    fn with_buffer(type_: CK_ATTRIBUTE_TYPE, buffer: UnmanagedBuffer) -> Self {
        let value = (!buffer.is_empty()).then_some(buffer);
        Self {
            type_,
            value,
            nested: Vec::new(),
        }
    }

    /// A zeroed value of `len` bytes, for a module to fill.
    pub fn with_capacity(type_: CK_ATTRIBUTE_TYPE, len: usize) -> InteropResult<Self> {
        Ok(Self::with_buffer(type_, UnmanagedBuffer::allocate(len)?))
    }

    pub fn from_ulong(type_: CK_ATTRIBUTE_TYPE, value: CK_ULONG) -> InteropResult<Self> {
        Ok(Self::with_buffer(type_, UnmanagedBuffer::from_value(&value)?))
    }

    pub fn from_bool(type_: CK_ATTRIBUTE_TYPE, value: bool) -> InteropResult<Self> {
        let value: CK_BBOOL = if value { CK_TRUE } else { CK_FALSE };
        Ok(Self::with_buffer(type_, UnmanagedBuffer::from_value(&value)?))
    }

    /// UTF-8 bytes of `value`, without a terminating NUL.
    pub fn from_string(type_: CK_ATTRIBUTE_TYPE, value: Option<&str>) -> InteropResult<Self> {
        Self::from_bytes(type_, value.map(str::as_bytes))
    }

    pub fn from_bytes(type_: CK_ATTRIBUTE_TYPE, value: Option<&[u8]>) -> InteropResult<Self> {
        match value {
            Some(bytes) => Ok(Self::with_buffer(type_, UnmanagedBuffer::from_bytes(bytes)?)),
            None => Ok(Self::new(type_)),
        }
    }

    /// A `CK_DATE`: eight ASCII digits `YYYYMMDD`.
    pub fn from_date(type_: CK_ATTRIBUTE_TYPE, value: Option<NaiveDate>) -> InteropResult<Self> {
        match value {
            Some(date) => {
                let ck_date = encode_date(date)?;
                Ok(Self::with_buffer(type_, UnmanagedBuffer::from_value(&ck_date)?))
            }
            None => Ok(Self::new(type_)),
        }
    }

    /// An array attribute such as `CKA_WRAP_TEMPLATE`.
    ///
    /// The children are deep-copied: the new attribute owns copies of their
    /// values and its records point to those copies, never to the originals.
    /// An empty or missing list yields no value.
    pub fn from_attributes(
        type_: CK_ATTRIBUTE_TYPE,
        value: Option<&[ObjectAttribute]>,
    ) -> InteropResult<Self> {
        let Some(children) = value.filter(|children| !children.is_empty()) else {
            return Ok(Self::new(type_));
        };
        if type_ & CKF_ARRAY_ATTRIBUTE == 0 {
            trace!("attribute {type_:#x} holds nested attributes without CKF_ARRAY_ATTRIBUTE");
        }
        let nested = children
            .iter()
            .map(ObjectAttribute::try_clone)
            .collect::<InteropResult<Vec<_>>>()?;
        let element_size = size_of::<CK_ATTRIBUTE>();
        let mut buffer = UnmanagedBuffer::allocate(nested.len() * element_size)?;
        for (i, child) in nested.iter().enumerate() {
            buffer.write_value(i * element_size, &child.raw())?;
        }
        let mut attribute = Self::with_buffer(type_, buffer);
        attribute.nested = nested;
        Ok(attribute)
    }

    /// A contiguous array of `CK_ULONG`, e.g. `CKA_ALLOWED_MECHANISMS`.
    pub fn from_ulongs(
        type_: CK_ATTRIBUTE_TYPE,
        value: Option<&[CK_ULONG]>,
    ) -> InteropResult<Self> {
        let Some(values) = value.filter(|values| !values.is_empty()) else {
            return Ok(Self::new(type_));
        };
        let element_size = size_of::<CK_ULONG>();
        let mut buffer = UnmanagedBuffer::allocate(values.len() * element_size)?;
        for (i, v) in values.iter().enumerate() {
            buffer.write_value(i * element_size, v)?;
        }
        Ok(Self::with_buffer(type_, buffer))
    }

    /// Copy a record owned elsewhere, value included.
    ///
    /// # Safety
    ///
    /// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
    pub unsafe fn from_raw(raw: &CK_ATTRIBUTE) -> InteropResult<Self> {
        let type_ = raw.type_;
        let bytes = unsafe { read_bytes(raw) }?;
        Self::from_bytes(type_, bytes.as_deref())
    }

    #[must_use]
    pub const fn type_(&self) -> CK_ATTRIBUTE_TYPE {
        self.type_
    }

    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, UnmanagedBuffer::len)
    }

    /// The value bytes, `None` when the attribute has no value.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_ref().map(UnmanagedBuffer::as_slice)
    }

    /// The record to hand to a module. It stays valid as long as `self` lives
    /// and is not mutated.
    #[must_use]
    pub fn raw(&self) -> CK_ATTRIBUTE {
        match &self.value {
            Some(buffer) => CK_ATTRIBUTE {
                type_: self.type_,
                pValue: buffer.as_mut_ptr(),
                ulValueLen: buffer.ck_len(),
            },
            None => CK_ATTRIBUTE {
                type_: self.type_,
                pValue: ptr::null_mut(),
                ulValueLen: 0,
            },
        }
    }

    pub fn try_clone(&self) -> InteropResult<Self> {
        if self.nested.is_empty() {
            Self::from_bytes(self.type_, self.value())
        } else {
            Self::from_attributes(self.type_, Some(&self.nested))
        }
    }

    /// Release the value, and the copies of nested children, now.
    pub fn free(self) {
        drop(self);
    }

    pub fn get_ulong(&self) -> InteropResult<Option<CK_ULONG>> {
        unsafe { read_ulong(&self.raw()) }
    }

    pub fn get_bool(&self) -> InteropResult<Option<bool>> {
        unsafe { read_bool(&self.raw()) }
    }

    pub fn get_string(&self) -> InteropResult<Option<String>> {
        unsafe { read_string(&self.raw()) }
    }

    pub fn get_bytes(&self) -> InteropResult<Option<Vec<u8>>> {
        unsafe { read_bytes(&self.raw()) }
    }

    pub fn get_date(&self) -> InteropResult<Option<NaiveDate>> {
        unsafe { read_date(&self.raw()) }
    }

    /// The nested records; their pointers remain owned by `self`.
    pub fn get_attributes(&self) -> InteropResult<Option<Vec<CK_ATTRIBUTE>>> {
        unsafe { read_attributes(&self.raw()) }
    }

    /// Deep copies of the nested attributes.
    pub fn get_nested(&self) -> InteropResult<Option<Vec<ObjectAttribute>>> {
        if self.nested.is_empty() {
            return Ok(None);
        }
        self.nested
            .iter()
            .map(ObjectAttribute::try_clone)
            .collect::<InteropResult<Vec<_>>>()
            .map(Some)
    }

    pub fn get_ulongs(&self) -> InteropResult<Option<Vec<CK_ULONG>>> {
        unsafe { read_ulongs(&self.raw()) }
    }
}

impl fmt::Debug for ObjectAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAttribute")
            .field("type_", &format_args!("{:#x}", self.type_))
            .field("value_len", &self.value_len())
            .field("nested", &self.nested)
            .finish()
    }
}

impl PartialEq for ObjectAttribute {
    fn eq(&self, other: &Self) -> bool {
        if self.type_ != other.type_ || self.nested != other.nested {
            return false;
        }
        // the records of an array attribute point into each side's own copies
        !self.nested.is_empty() || self.value() == other.value()
    }
}

fn encode_date(date: NaiveDate) -> InteropResult<CK_DATE> {
    let year = date.year();
    if !(0..=9999).contains(&year) {
        return Err(InteropError::InvalidDate(format!(
            "year {year} does not fit four digits"
        )));
    }
    let digits = format!("{year:04}{:02}{:02}", date.month(), date.day());
    let digits = digits.as_bytes();
    let mut ck_date = CK_DATE::default();
    ck_date.year.copy_from_slice(&digits[0..4]);
    ck_date.month.copy_from_slice(&digits[4..6]);
    ck_date.day.copy_from_slice(&digits[6..8]);
    Ok(ck_date)
}

fn parse_digits(digits: &[u8], field: &str) -> InteropResult<u32> {
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(InteropError::InvalidDate(format!(
            "{field} is not made of ASCII digits: {digits:?}"
        )));
    }
    Ok(digits
        .iter()
        .fold(0, |acc, digit| acc * 10 + u32::from(digit - b'0')))
}

/// The value bytes of a record owned elsewhere, `None` for the no-value encoding.
///
/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes
/// that outlive the returned slice.
unsafe fn value_slice<'a>(raw: &CK_ATTRIBUTE) -> InteropResult<Option<&'a [u8]>> {
    let (type_, p_value, ul_value_len) = (raw.type_, raw.pValue, raw.ulValueLen);
    if ul_value_len == 0 || ul_value_len == CK_UNAVAILABLE_INFORMATION {
        return Ok(None);
    }
    if p_value.is_null() {
        return Err(InteropError::NullArgument(format!(
            "attribute {type_:#x} has a null value of {ul_value_len} bytes"
        )));
    }
    let len = usize::try_from(ul_value_len)?;
    Ok(Some(unsafe {
        slice::from_raw_parts(p_value.cast::<u8>().cast_const(), len)
    }))
}

fn malformed(raw: &CK_ATTRIBUTE, length: usize, element_size: usize) -> InteropError {
    InteropError::MalformedValue {
        type_: raw.type_,
        length,
        element_size,
    }
}

/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_ulong(raw: &CK_ATTRIBUTE) -> InteropResult<Option<CK_ULONG>> {
    let Some(bytes) = (unsafe { value_slice(raw) })? else {
        return Ok(None);
    };
    if bytes.len() != size_of::<CK_ULONG>() {
        return Err(malformed(raw, bytes.len(), size_of::<CK_ULONG>()));
    }
    Ok(Some(unsafe {
        ptr::read_unaligned(bytes.as_ptr().cast::<CK_ULONG>())
    }))
}

/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_bool(raw: &CK_ATTRIBUTE) -> InteropResult<Option<bool>> {
    let Some(bytes) = (unsafe { value_slice(raw) })? else {
        return Ok(None);
    };
    match bytes {
        [value] => Ok(Some(*value != CK_FALSE)),
        _ => Err(malformed(raw, bytes.len(), size_of::<CK_BBOOL>())),
    }
}

/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_string(raw: &CK_ATTRIBUTE) -> InteropResult<Option<String>> {
    let Some(bytes) = (unsafe { value_slice(raw) })? else {
        return Ok(None);
    };
    Ok(Some(String::from_utf8(bytes.to_vec())?))
}

/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_bytes(raw: &CK_ATTRIBUTE) -> InteropResult<Option<Vec<u8>>> {
    Ok((unsafe { value_slice(raw) })?.map(<[u8]>::to_vec))
}

/// Decode a `CK_DATE`. A value that is not exactly eight bytes is malformed;
/// eight spaces, eight `'0'` or eight NULs mean "no date"; a mix of them is invalid.
///
/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_date(raw: &CK_ATTRIBUTE) -> InteropResult<Option<NaiveDate>> {
    let Some(bytes) = (unsafe { value_slice(raw) })? else {
        return Ok(None);
    };
    if bytes.len() != DATE_LENGTH {
        return Err(malformed(raw, bytes.len(), DATE_LENGTH));
    }
    if [b' ', b'0', 0].iter().any(|blank| bytes.iter().all(|b| b == blank)) {
        return Ok(None);
    }
    let year = parse_digits(&bytes[0..4], "year")?;
    let month = parse_digits(&bytes[4..6], "month")?;
    let day = parse_digits(&bytes[6..8], "day")?;
    let year = i32::try_from(year)?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or_else(|| InteropError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
}

/// Decode an array attribute into its records. The records are copied; the
/// memory they point to is not.
///
/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_attributes(raw: &CK_ATTRIBUTE) -> InteropResult<Option<Vec<CK_ATTRIBUTE>>> {
    unsafe { read_array::<CK_ATTRIBUTE>(raw) }
}

/// # Safety
///
/// `raw.pValue` must be null or point to `raw.ulValueLen` readable bytes.
pub unsafe fn read_ulongs(raw: &CK_ATTRIBUTE) -> InteropResult<Option<Vec<CK_ULONG>>> {
    unsafe { read_array::<CK_ULONG>(raw) }
}

/// # Safety
///
/// As for [`read_ulongs`]; additionally every bit pattern must be a valid `T`.
unsafe fn read_array<T: Copy>(raw: &CK_ATTRIBUTE) -> InteropResult<Option<Vec<T>>> {
    let Some(bytes) = (unsafe { value_slice(raw) })? else {
        return Ok(None);
    };
    let element_size = size_of::<T>();
    if bytes.len() % element_size != 0 {
        return Err(malformed(raw, bytes.len(), element_size));
    }
    let values = bytes
        .chunks_exact(element_size)
        .map(|chunk| unsafe { ptr::read_unaligned(chunk.as_ptr().cast::<T>()) })
        .collect();
    Ok(Some(values))
}
