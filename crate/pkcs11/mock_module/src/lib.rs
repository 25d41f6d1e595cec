//! An in-memory PKCS#11 v2.40 module.
//!
//! The shared library exports all 68 `C_*` entry points and a
//! `C_GetFunctionList` returning them, so it can be bound with either
//! function table strategy. It holds one token in slot [`TOKEN_SLOT_ID`]
//! and reports an empty slot [`EMPTY_SLOT_ID`]. The token stores objects,
//! generates secret keys, computes SHA3-256 digests and produces
//! (non-cryptographic) random bytes; other operations answer
//! `CKR_FUNCTION_NOT_SUPPORTED`.

#![allow(non_snake_case)]
#![allow(unused_variables)]

mod error;
pub mod pkcs11;
mod store;

pub use error::{MockError, MockResult};
pub use store::{EMPTY_SLOT_ID, MECHANISMS, TOKEN_SLOT_ID, USER_PIN};
