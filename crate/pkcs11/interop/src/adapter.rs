//! Binding resolved addresses to typed entry points, and invoking them.

use std::{
    ffi::c_void,
    mem::{size_of, transmute_copy},
};

use crate::{InteropError, InteropResult};

/// Reinterpret a resolved symbol address as the entry-point type `F`.
///
/// Fails on a null address, and when `F` is not pointer sized.
///
/// # Safety
///
/// `F` must be the `unsafe extern "C" fn` type matching the exported symbol.
pub unsafe fn bind<F: Copy>(symbol: &str, address: *mut c_void) -> InteropResult<F> {
    if address.is_null() {
        return Err(InteropError::NullFunctionPointer(symbol.to_owned()));
    }
    if size_of::<F>() != size_of::<*mut c_void>() {
        return Err(InteropError::FunctionPointerSize {
            symbol: symbol.to_owned(),
            size: size_of::<F>(),
        });
    }
    Ok(unsafe { transmute_copy::<*mut c_void, F>(&address) })
}

/// Invoke an entry point of a function table and evaluate to the raw `CK_RV`.
///
/// ```ignore
/// let rv = pkcs11_call!(table, C_GetInfo, &mut info);
/// ```
///
/// The status code is returned as is; interpreting it is up to the caller.
macro_rules! pkcs11_call {
    ($table:expr, $function:ident $(, $arg:expr)* $(,)?) => {{
        let rv = unsafe { ($table.$function)($($arg),*) };
        ::cosmian_logger::trace!(
            "{} -> {} ({:#x})",
            stringify!($function),
            ::cosmian_pkcs11_sys::rv_name(rv),
            rv
        );
        rv
    }};
}

/// Like [`pkcs11_call!`], mapping any status other than `CKR_OK` to
/// [`InteropError::ReturnValue`](crate::InteropError::ReturnValue).
macro_rules! pkcs11_check {
    ($table:expr, $function:ident $(, $arg:expr)* $(,)?) => {
        $crate::error::check_rv(
            stringify!($function),
            $crate::adapter::pkcs11_call!($table, $function $(, $arg)*),
        )
    };
}

pub(crate) use {pkcs11_call, pkcs11_check};
