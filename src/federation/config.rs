// src/federation/config.rs
//! Federation configuration types

use crate::error::{Error, Result};
use crate::query::{DEFAULT_PAGE_SIZE, MergeOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Federation configuration
///
/// Controls how a federation treats failing repositories and how it talks to
/// them.
///
/// # Example (TOML)
///
/// ```toml
/// [federation]
/// ignore_failures = true
/// resolve_dependencies_vertically = false
/// page_size = 30
/// max_parallelism = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Swallow non-fatal repository failures (default: true)
    #[serde(default = "default_ignore_failures")]
    pub ignore_failures: bool,

    /// Ask each repository to resolve dependencies on its own instead of
    /// resolving over the merged candidate list (default: false)
    #[serde(default)]
    pub resolve_dependencies_vertically: bool,

    /// Items requested per page from each repository (default: 30)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum worker threads for per-repository fan-out (default: 8)
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
}

fn default_ignore_failures() -> bool {
    true
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_parallelism() -> usize {
    8
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            ignore_failures: default_ignore_failures(),
            resolve_dependencies_vertically: false,
            page_size: default_page_size(),
            max_parallelism: default_max_parallelism(),
        }
    }
}

/// On-disk layout: settings live under a `[federation]` table
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    federation: FederationConfig,
}

impl FederationConfig {
    /// Parse a bare federation table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FederationConfig = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid federation config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the `[federation]` table of a config file
    ///
    /// A file without the table yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        file.federation.validate()?;
        Ok(file.federation)
    }

    /// Reject settings the federation cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::ConfigError("page_size must be at least 1".to_string()));
        }
        if self.max_parallelism == 0 {
            return Err(Error::ConfigError(
                "max_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Options handed to the federated queries this configuration creates
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            ignore_failures: self.ignore_failures,
            page_size: self.page_size,
            max_parallelism: self.max_parallelism,
        }
    }
}
