//! Project Configuration (mosaic.toml)
//!
//! Handles project-level configuration stored in `mosaic.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project configuration from mosaic.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectSection>,

    /// Build configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,

    /// Device targets, one variant per entry
    #[serde(default, rename = "target")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,

    /// Feature toggles keyed by feature name
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, FeatureConfig>,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
    /// Project name
    pub name: String,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Build for a device (true) or the host (false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<bool>,

    /// Output directory (default: "out")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Longest command line handed to a single tool invocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_command_size: Option<usize>,

    /// Run parallel-safe passes on worker threads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Suffix of shared library outputs (default: ".so")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shlib_suffix: Option<String>,
}

/// One architecture to build for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Architecture name: arm, arm64, x86 or x86_64
    pub arch: String,

    /// Architecture variant (e.g. "armv8-a")
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Configuration of one propagated build feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Enable the feature build-wide
    #[serde(default)]
    pub enabled: bool,

    /// Shared library every feature-enabled variant links against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_library: Option<String>,

    /// Compiler flags appended to feature-enabled variants
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cflags: Vec<String>,

    /// Linker flags appended to feature-enabled variants
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ldflags: Vec<String>,

    /// File listing library output names, one per line; the line number is the index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_file: Option<PathBuf>,

    /// Linker flag template for the library index, `{}` is replaced by the index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_flag: Option<String>,

    /// Architectures the feature is implemented for (empty: all)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arches: Vec<String>,

    /// Only enable the feature for device builds (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_only: Option<bool>,

    /// The feature needs full link-time optimization (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_lto: Option<bool>,

    /// Dependency tags the requirement propagates across (default: static family)
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub propagate: Vec<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(project) = &self.project {
            if project.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "project.name".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
        }

        if let Some(build) = &self.build {
            if build.max_command_size == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "build.max_command_size".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        for (i, target) in self.targets.iter().enumerate() {
            if !is_known_arch(&target.arch) {
                return Err(ConfigError::InvalidValue {
                    field: format!("target[{}].arch", i),
                    reason: format!("unknown architecture '{}'", target.arch),
                });
            }
        }

        for (name, feature) in &self.features {
            validate_feature(name, feature)?;
        }

        Ok(())
    }

    /// Get the project name, if present
    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    /// Merge another project config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &ProjectConfig) {
        if other.project.is_some() {
            self.project = other.project.clone();
        }
        if other.build.is_some() {
            self.build = other.build.clone();
        }
        if !other.targets.is_empty() {
            self.targets = other.targets.clone();
        }
        if !other.features.is_empty() {
            self.features.extend(other.features.clone());
        }
    }
}

/// Architectures the build graph knows how to split on
pub(crate) fn is_known_arch(arch: &str) -> bool {
    matches!(arch, "arm" | "arm64" | "x86" | "x86_64")
}

/// Validate a feature configuration
fn validate_feature(name: &str, feature: &FeatureConfig) -> ConfigResult<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidValue {
            field: "features".to_string(),
            reason: format!("invalid feature name '{}'", name),
        });
    }

    if let Some(flag) = &feature.index_flag {
        if !flag.contains("{}") {
            return Err(ConfigError::InvalidValue {
                field: format!("features.{}.index_flag", name),
                reason: "template must contain '{}'".to_string(),
            });
        }
    }

    for arch in &feature.arches {
        if !is_known_arch(arch) {
            return Err(ConfigError::InvalidValue {
                field: format!("features.{}.arches", name),
                reason: format!("unknown architecture '{}'", arch),
            });
        }
    }

    Ok(())
}
