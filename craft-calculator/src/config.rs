//! Calculator settings
//!
//! Loaded from a TOML file when one is given (or `craft-calculator.toml`
//! exists in the working directory), otherwise defaults. CLI flags override
//! individual fields afterwards.
//!
//! ```toml
//! database = "craft_data.db"
//! lookup_timeout_ms = 2000
//! missing_ingredient = "treat-as-base"
//! max_depth = 32
//! variant = { policy = "by-row-id", recipe = "recipe_knife_sheet" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolver::{MissingIngredientPolicy, ResolverOptions, VariantSelector};

pub const DEFAULT_CONFIG_FILE: &str = "craft-calculator.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Path to the SQLite catalog
    pub database: PathBuf,
    /// Upper bound for a single catalog lookup
    pub lookup_timeout_ms: u64,
    pub variant: VariantSelector,
    pub missing_ingredient: MissingIngredientPolicy,
    pub max_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let resolver = ResolverOptions::default();
        Self {
            database: PathBuf::from("craft_data.db"),
            lookup_timeout_ms: 5_000,
            variant: resolver.variant,
            missing_ingredient: resolver.missing_ingredient,
            max_depth: resolver.max_depth,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default file if present.
    ///
    /// An explicitly given path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            variant: self.variant.clone(),
            missing_ingredient: self.missing_ingredient,
            max_depth: self.max_depth,
        }
    }
}
