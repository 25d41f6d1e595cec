//! The two-call idiom of PKCS#11 for outputs of unknown length.
//!
//! The entry point is first called with a null buffer and reports the number
//! of elements it needs; a buffer of that size is allocated and the entry
//! point is called again to fill it.

use std::ptr;

use cosmian_logger::{trace, warn};
use cosmian_pkcs11_sys::{CK_RV, CK_ULONG};

use crate::{InteropError, InteropResult, error::check_rv};

/// Run the two-call idiom with `call(buffer, &mut count)`.
///
/// When the first call reports zero elements, the second call is skipped.
/// When the second call reports a count other than the first one, the result
/// is cut to the smaller of the reported count and the allocated capacity.
pub fn call_with_buffer<T, F>(function: &'static str, mut call: F) -> InteropResult<Vec<T>>
where
    T: Copy + Default,
    F: FnMut(*mut T, &mut CK_ULONG) -> CK_RV,
{
    let mut count: CK_ULONG = 0;
    check_rv(function, call(ptr::null_mut(), &mut count))?;
    if count == 0 {
        trace!("{function}: nothing to retrieve");
        return Ok(Vec::new());
    }

    let capacity = usize::try_from(count)?;
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(capacity).map_err(|e| {
        InteropError::Allocation(format!("{function}: {capacity} elements announced: {e}"))
    })?;
    buffer.resize(capacity, T::default());
    let mut filled = count;
    check_rv(function, call(buffer.as_mut_ptr(), &mut filled))?;

    let filled = usize::try_from(filled)?;
    if filled != capacity {
        warn!("{function}: {capacity} elements announced, {filled} returned");
    }
    buffer.truncate(filled.min(capacity));
    Ok(buffer)
}

/// [`call_with_buffer`] for byte outputs: ciphertexts, signatures, states.
pub fn call_for_bytes<F>(function: &'static str, call: F) -> InteropResult<Vec<u8>>
where
    F: FnMut(*mut u8, &mut CK_ULONG) -> CK_RV,
{
    call_with_buffer::<u8, F>(function, call)
}
