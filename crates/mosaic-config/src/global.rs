//! Global Configuration (~/.mosaic/config.toml)
//!
//! Handles user-level defaults stored in `~/.mosaic/config.toml`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.mosaic/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Build defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<GlobalBuildConfig>,
}

/// Build defaults applied when the project does not set them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalBuildConfig {
    /// Run parallel-safe passes on worker threads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Longest command line handed to a single tool invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_command_size: Option<usize>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(build) = &self.build {
            if build.max_command_size == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "build.max_command_size".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get the global config file path (~/.mosaic/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".mosaic").join("config.toml"))
    }

    /// Default parallelism, if set
    pub fn parallel(&self) -> Option<bool> {
        self.build.as_ref().and_then(|b| b.parallel)
    }

    /// Default command size limit, if set
    pub fn max_command_size(&self) -> Option<usize> {
        self.build.as_ref().and_then(|b| b.max_command_size)
    }
}
