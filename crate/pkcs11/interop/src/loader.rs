use std::{
    ffi::c_void,
    path::{Path, PathBuf},
};

use cosmian_logger::{debug, warn};
use cosmian_pkcs11_sys::CK_C_GetFunctionList;
use libloading::Library;
use once_cell::sync::OnceCell;

use crate::{
    InteropError, InteropResult,
    adapter::bind,
    function_table::{FunctionListLayout, FunctionTable, FunctionTableStrategy},
};

struct ResolvedTable {
    strategy: FunctionTableStrategy,
    layout: FunctionListLayout,
    table: FunctionTable,
}

/// A PKCS#11 module opened with the platform loader.
///
/// The library is closed by [`NativeLibrary::unload`] or when dropped. After
/// `unload`, every operation fails with [`InteropError::LibraryNotLoaded`],
/// including a second `unload`.
pub struct NativeLibrary {
    path: PathBuf,
    library: Option<Library>,
    table: OnceCell<ResolvedTable>,
}

impl NativeLibrary {
    /// Open the library at `path`, or a bare name resolved by the platform
    /// search rules.
    pub fn load<P: AsRef<Path>>(path: P) -> InteropResult<Self> {
        let path = path.as_ref();
        debug!("loading the PKCS#11 library {}", path.display());
        let library = unsafe { Library::new(path) }.map_err(|source| {
            InteropError::LibraryLoad {
                path: path.display().to_string(),
                source,
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            library: Some(library),
            table: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    fn library(&self) -> InteropResult<&Library> {
        self.library.as_ref().ok_or(InteropError::LibraryNotLoaded)
    }

    /// The address of the exported symbol `name`.
    pub fn resolve_symbol(&self, name: &str) -> InteropResult<*mut c_void> {
        let library = self.library()?;
        let symbol = unsafe { library.get::<*mut c_void>(name.as_bytes()) }.map_err(|source| {
            InteropError::SymbolNotFound {
                symbol: name.to_owned(),
                source,
            }
        })?;
        Ok(*symbol)
    }

    /// The function table of the module, resolved on the first call and cached.
    ///
    /// Later calls return the cached table whatever `strategy` and `layout` they
    /// pass. A failed resolution is not cached.
    pub fn function_table(
        &self,
        strategy: FunctionTableStrategy,
        layout: FunctionListLayout,
    ) -> InteropResult<&FunctionTable> {
        self.library()?;
        let resolved = self.table.get_or_try_init(|| {
            debug!(
                "resolving the function table of {} ({strategy}, {layout} layout)",
                self.path.display()
            );
            let table = match strategy {
                FunctionTableStrategy::SelfDescribing => {
                    let address = self.resolve_symbol("C_GetFunctionList")?;
                    let get_function_list =
                        unsafe { bind::<CK_C_GetFunctionList>("C_GetFunctionList", address) }?;
                    unsafe { FunctionTable::from_function_list(get_function_list, layout) }?
                }
                FunctionTableStrategy::PerSymbol => {
                    FunctionTable::resolve_each(|name| self.resolve_symbol(name))?
                }
            };
            Ok::<_, InteropError>(ResolvedTable {
                strategy,
                layout,
                table,
            })
        })?;
        if resolved.strategy != strategy || resolved.layout != layout {
            debug!(
                "using the cached function table ({}, {} layout)",
                resolved.strategy, resolved.layout
            );
        }
        Ok(&resolved.table)
    }

    /// Close the library. The cached function table is discarded with it.
    pub fn unload(&mut self) -> InteropResult<()> {
        let library = self.library.take().ok_or(InteropError::LibraryNotLoaded)?;
        self.table = OnceCell::new();
        debug!("unloading the PKCS#11 library {}", self.path.display());
        library.close().map_err(InteropError::LibraryUnload)
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                warn!("failed to unload {}: {e}", self.path.display());
            }
        }
    }
}
