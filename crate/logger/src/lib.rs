//! Logging shared by the PKCS#11 crates: `log_init` and the `tracing` macros,
//! so that callers only depend on this crate.

pub mod log_utils;

pub use log_utils::log_init;
pub use tracing::{debug, error, info, instrument, trace, warn};
