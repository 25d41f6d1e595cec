use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    InteropError, InteropResult,
    function_table::{FunctionListLayout, FunctionTableStrategy},
};

/// Which module to load and how to resolve its entry points.
///
/// ```toml
/// library_path = "/usr/lib/softhsm/libsofthsm2.so"
/// strategy = "per_symbol"
/// function_list_layout = "natural"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pkcs11Config {
    pub library_path: PathBuf,
    pub strategy: FunctionTableStrategy,
    /// Overrides the layout detected from the OS family.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_list_layout: Option<FunctionListLayout>,
}

impl Pkcs11Config {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(library_path: P) -> Self {
        Self {
            library_path: library_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: FunctionTableStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_function_list_layout(mut self, layout: FunctionListLayout) -> Self {
        self.function_list_layout = Some(layout);
        self
    }

    pub fn from_toml_str(content: &str) -> InteropResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> InteropResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> InteropResult<()> {
        if self.library_path.as_os_str().is_empty() {
            return Err(InteropError::Config(
                "library_path must name a PKCS#11 library".to_owned(),
            ));
        }
        Ok(())
    }

    /// The configured layout, or the one of the running OS family.
    #[must_use]
    pub fn layout(&self) -> FunctionListLayout {
        self.function_list_layout
            .unwrap_or_else(FunctionListLayout::detect)
    }
}
