//! Runtime binding to PKCS#11 modules.
//!
//! A module is opened with [`NativeLibrary`], its entry points are gathered in a
//! [`FunctionTable`] (through `C_GetFunctionList` or symbol by symbol), and
//! calls are made with values marshaled by [`ObjectAttribute`],
//! [`NativeMechanism`] and the two-call helpers of [`protocol`]. [`Pkcs11`]
//! ties these together behind typed methods.

#![allow(non_snake_case)]

pub mod adapter;
pub mod attribute;
pub mod config;
mod error;
pub mod function_table;
pub mod info;
pub mod loader;
pub mod mechanism;
pub mod memory;
mod pkcs11;
pub mod protocol;

pub use attribute::ObjectAttribute;
pub use config::Pkcs11Config;
pub use error::{InteropError, InteropResult, check_rv};
pub use function_table::{FunctionListLayout, FunctionTable, FunctionTableStrategy};
pub use loader::NativeLibrary;
pub use mechanism::NativeMechanism;
pub use memory::{UnmanagedBuffer, ck_size_of, live_allocations};
pub use pkcs11::Pkcs11;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests;
