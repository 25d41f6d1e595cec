//! The typed table of entry points of a loaded module, and the two ways of
//! building it.
//!
//! The table is generated from `with_pkcs11_functions!`, like both function-list
//! layouts of `cosmian_pkcs11_sys`, so the three cannot drift apart.

use std::{ffi::c_void, fmt, ptr};

use cosmian_logger::debug;
use cosmian_pkcs11_sys::{
    CK_C_GetFunctionList, CK_FUNCTION_LIST, CK_FUNCTION_LIST_PACKED, CK_FUNCTION_LIST_PTR,
    CK_VERSION, CKR_OK, with_pkcs11_functions,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{InteropError, InteropResult, adapter::bind};

/// How the entry points of a module are acquired.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FunctionTableStrategy {
    /// Call `C_GetFunctionList` and copy the function list it returns.
    #[default]
    SelfDescribing,
    /// Look up every `C_*` symbol by name.
    PerSymbol,
}

/// Memory layout of the `CK_FUNCTION_LIST` returned by `C_GetFunctionList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FunctionListLayout {
    /// Natural C alignment: POSIX compilers pad `version` to pointer alignment.
    Natural,
    /// One-byte packing, as built from the Windows headers.
    Packed,
}

impl FunctionListLayout {
    /// The layout used by modules built for the running OS family.
    #[must_use]
    pub fn detect() -> Self {
        Self::for_family(std::env::consts::FAMILY)
    }

    #[must_use]
    pub fn for_family(family: &str) -> Self {
        if family == "windows" {
            Self::Packed
        } else {
            Self::Natural
        }
    }
}

macro_rules! define_function_table {
    ($($name:ident: $signature:ty),* $(,)?) => {
        /// Every entry point of a module, resolved and non-null.
        ///
        /// Only a complete table can be built: a missing entry point fails the
        /// whole resolution.
        #[derive(Clone, Copy)]
        pub struct FunctionTable {
            version: Option<CK_VERSION>,
            $(pub $name: $signature,)*
        }

        impl FunctionTable {
            /// Copy a function list laid out with natural alignment.
            pub fn from_natural(list: CK_FUNCTION_LIST) -> InteropResult<Self> {
                let version = list.version;
                let missing: Vec<&'static str> = [
                    $((stringify!($name), { list.$name }.is_none())),*
                ]
                    .into_iter()
                    .filter_map(|(name, is_none)| is_none.then_some(name))
                    .collect();
                match ($(list.$name,)*) {
                    ($(Some($name),)*) => Ok(Self {
                        version: Some(version),
                        $($name,)*
                    }),
                    _ => Err(InteropError::IncompleteFunctionList(missing)),
                }
            }

            /// Copy a function list packed to one byte, field by field.
            pub fn from_packed(list: CK_FUNCTION_LIST_PACKED) -> InteropResult<Self> {
                let version = list.version;
                let missing: Vec<&'static str> = [
                    $((stringify!($name), { list.$name }.is_none())),*
                ]
                    .into_iter()
                    .filter_map(|(name, is_none)| is_none.then_some(name))
                    .collect();
                match ($(list.$name,)*) {
                    ($(Some($name),)*) => Ok(Self {
                        version: Some(version),
                        $($name,)*
                    }),
                    _ => Err(InteropError::IncompleteFunctionList(missing)),
                }
            }

            /// Resolve every entry point by name with `resolve`.
            ///
            /// All names are attempted; failures are reported together.
            pub fn resolve_each<R>(mut resolve: R) -> InteropResult<Self>
            where
                R: FnMut(&'static str) -> InteropResult<*mut c_void>,
            {
                let mut unresolved = Vec::new();
                $(
                    let $name = resolve(stringify!($name))
                        .and_then(|address| unsafe {
                            bind::<$signature>(stringify!($name), address)
                        })
                        .map_err(|e| unresolved.push(e.to_string()))
                        .ok();
                )*
                match ($($name,)*) {
                    ($(Some($name),)*) => Ok(Self {
                        version: None,
                        $($name,)*
                    }),
                    _ => Err(InteropError::UnresolvedEntryPoints(unresolved)),
                }
            }

            /// `(symbol, address)` of every entry point, in function-list order.
            #[must_use]
            pub fn entries(&self) -> Vec<(&'static str, *const c_void)> {
                vec![$((stringify!($name), self.$name as *const c_void)),*]
            }
        }
    };
}

with_pkcs11_functions!(define_function_table);

impl FunctionTable {
    /// Call `C_GetFunctionList` and copy the list it returns, read with `layout`.
    ///
    /// # Safety
    ///
    /// `get_function_list` must be the module's `C_GetFunctionList`.
    pub unsafe fn from_function_list(
        get_function_list: CK_C_GetFunctionList,
        layout: FunctionListLayout,
    ) -> InteropResult<Self> {
        let mut list: CK_FUNCTION_LIST_PTR = ptr::null_mut();
        let rv = unsafe { get_function_list(&mut list) };
        if rv != CKR_OK {
            return Err(InteropError::FunctionList(rv));
        }
        if list.is_null() {
            return Err(InteropError::NullFunctionList);
        }
        debug!("reading the function list with the {layout} layout");
        // the module owns the list: copy it out, never keep the pointer
        match layout {
            FunctionListLayout::Natural => Self::from_natural(unsafe { ptr::read_unaligned(list) }),
            FunctionListLayout::Packed => Self::from_packed(unsafe {
                ptr::read_unaligned(list.cast::<CK_FUNCTION_LIST_PACKED>())
            }),
        }
    }

    /// The interface version reported by the function list, `None` when the
    /// table was resolved symbol by symbol.
    #[must_use]
    pub const fn version(&self) -> Option<CK_VERSION> {
        self.version
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("version", &self.version)
            .field("entry_points", &self.entries().len())
            .finish_non_exhaustive()
    }
}
