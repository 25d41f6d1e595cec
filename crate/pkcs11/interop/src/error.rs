use cosmian_pkcs11_sys::{CK_ATTRIBUTE_TYPE, CK_RV, rv_name};
use thiserror::Error;

pub type InteropResult<T> = Result<T, InteropError>;

#[derive(Error, Debug)]
pub enum InteropError {
    #[error("unable to load the PKCS#11 library {path}: {source}")]
    LibraryLoad {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("unable to unload the PKCS#11 library: {0}")]
    LibraryUnload(#[source] libloading::Error),

    #[error("the PKCS#11 library is not loaded")]
    LibraryNotLoaded,

    #[error("symbol {symbol} not found: {source}")]
    SymbolNotFound {
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("C_GetFunctionList failed: {} ({:#x})", rv_label(.0), .0)]
    FunctionList(CK_RV),

    #[error("C_GetFunctionList returned a null function list")]
    NullFunctionList,

    #[error("the function list has null entry points: {}", .0.join(", "))]
    IncompleteFunctionList(Vec<&'static str>),

    #[error("entry points could not be resolved: {}", .0.join(", "))]
    UnresolvedEntryPoints(Vec<String>),

    #[error("cannot bind {0}: null address")]
    NullFunctionPointer(String),

    #[error("cannot bind {symbol}: a {size} bytes type is not a function pointer")]
    FunctionPointerSize { symbol: String, size: usize },

    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("null argument: {0}")]
    NullArgument(String),

    #[error("{function} returned {returned} handles, {requested} requested")]
    ObjectCount {
        function: &'static str,
        returned: usize,
        requested: usize,
    },

    #[error("out of bounds access: {len} bytes at offset {offset} in a {capacity} bytes buffer")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error(
        "malformed value for attribute {type_:#x}: {length} bytes for elements of {element_size} \
         bytes"
    )]
    MalformedValue {
        type_: CK_ATTRIBUTE_TYPE,
        length: usize,
        element_size: usize,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("{function} failed: {} ({rv:#x})", rv_label(.rv))]
    ReturnValue { function: &'static str, rv: CK_RV },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    #[error(transparent)]
    FromUtf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl InteropError {
    /// The native status code carried by this error, if it wraps one.
    #[must_use]
    pub const fn rv(&self) -> Option<CK_RV> {
        match self {
            Self::FunctionList(rv) | Self::ReturnValue { rv, .. } => Some(*rv),
            _ => None,
        }
    }
}

fn rv_label(rv: &CK_RV) -> &'static str {
    rv_name(*rv)
}

/// Map a native status code to `Ok(())` or [`InteropError::ReturnValue`].
pub fn check_rv(function: &'static str, rv: CK_RV) -> InteropResult<()> {
    if rv == cosmian_pkcs11_sys::CKR_OK {
        Ok(())
    } else {
        Err(InteropError::ReturnValue { function, rv })
    }
}
