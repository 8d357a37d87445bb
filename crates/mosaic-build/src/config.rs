//! Ambient build configuration
//!
//! [`BuildConfig`] is built once from the merged [`mosaic_config::Config`] and
//! handed read-only to every pass. Everything that needs I/O (feature index
//! files) is read here, before graph mutation starts.

use crate::error::{BuildError, BuildResult};
use crate::passes::RESERVED_NAMES;
use crate::tag::DependencyTag;
use mosaic_config::{Config, ConfigError, FeatureConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One architecture the build targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arch {
    pub arch_type: String,
    pub variant: Option<String>,
}

impl Arch {
    pub fn new(arch_type: impl Into<String>, variant: Option<&str>) -> Self {
        Self {
            arch_type: arch_type.into(),
            variant: variant.map(str::to_string),
        }
    }

    /// Variation value of this architecture, e.g. `android_arm64_armv8-a`
    pub fn variation_name(&self, device: bool) -> String {
        let os = if device { "android" } else { "linux_glibc" };
        match &self.variant {
            Some(variant) => format!("{}_{}_{}", os, self.arch_type, variant),
            None => format!("{}_{}", os, self.arch_type),
        }
    }
}

/// Resolved settings of one propagated feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSettings {
    /// Global toggle
    pub enabled: bool,
    pub runtime_library: Option<String>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
    /// Template with a `{}` placeholder for the library index
    pub index_flag: Option<String>,
    /// Library output name to index
    pub indices: BTreeMap<String, u64>,
    /// Supported architectures, empty for all
    pub arches: Vec<String>,
    pub device_only: bool,
    pub requires_lto: bool,
    /// Edge tags the requirement is pushed across
    pub propagate: Vec<DependencyTag>,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            runtime_library: None,
            cflags: Vec::new(),
            ldflags: Vec::new(),
            index_flag: None,
            indices: BTreeMap::new(),
            arches: Vec::new(),
            device_only: true,
            requires_lto: true,
            propagate: DependencyTag::STATIC_FAMILY.to_vec(),
        }
    }
}

impl FeatureSettings {
    /// Resolve a feature section, reading its index file relative to `root`
    pub fn resolve(name: &str, config: &FeatureConfig, root: Option<&Path>) -> BuildResult<Self> {
        let propagate = if config.propagate.is_empty() {
            DependencyTag::STATIC_FAMILY.to_vec()
        } else {
            config
                .propagate
                .iter()
                .map(|t| {
                    t.parse::<DependencyTag>().map_err(|reason| {
                        BuildError::Config(ConfigError::InvalidValue {
                            field: format!("features.{}.propagate", name),
                            reason,
                        })
                    })
                })
                .collect::<BuildResult<Vec<_>>>()?
        };

        let indices = match &config.index_file {
            Some(file) => {
                let path = match root {
                    Some(root) if file.is_relative() => root.join(file),
                    _ => file.clone(),
                };
                read_index_file(&path)?
            }
            None => BTreeMap::new(),
        };

        Ok(Self {
            enabled: config.enabled,
            runtime_library: config.runtime_library.clone(),
            cflags: config.cflags.clone(),
            ldflags: config.ldflags.clone(),
            index_flag: config.index_flag.clone(),
            indices,
            arches: config.arches.clone(),
            device_only: config.device_only.unwrap_or(true),
            requires_lto: config.requires_lto.unwrap_or(true),
            propagate,
        })
    }

    pub fn supports_arch(&self, arch: &str) -> bool {
        self.arches.is_empty() || self.arches.iter().any(|a| a == arch)
    }

    /// Linker flag carrying `index`, if the feature defines one
    pub fn index_flag_for(&self, index: u64) -> Option<String> {
        self.index_flag
            .as_ref()
            .map(|t| t.replace("{}", &index.to_string()))
    }
}

/// Read an index file: one library output name per line, the line number is its index
pub fn read_index_file(path: &Path) -> BuildResult<BTreeMap<String, u64>> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
    let indices: BTreeMap<String, u64> = content
        .lines()
        .enumerate()
        .map(|(i, line)| (line.trim().to_string(), i as u64))
        .filter(|(name, _)| !name.is_empty())
        .collect();
    debug!(path = %path.display(), entries = indices.len(), "read index file");
    Ok(indices)
}

/// Immutable ambient configuration visible to every pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Device build (true) or host build (false)
    pub device: bool,
    pub targets: Vec<Arch>,
    pub features: BTreeMap<String, FeatureSettings>,
    pub out_dir: PathBuf,
    pub max_command_size: usize,
    pub parallel: bool,
    pub shlib_suffix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            device: true,
            targets: vec![Arch::new("arm64", Some("armv8-a"))],
            features: BTreeMap::new(),
            out_dir: PathBuf::from("out"),
            max_command_size: mosaic_config::loader::DEFAULT_MAX_COMMAND_SIZE,
            parallel: true,
            shlib_suffix: ".so".to_string(),
        }
    }
}

impl BuildConfig {
    /// Build the ambient configuration from a merged project configuration
    pub fn from_config(config: &Config) -> BuildResult<Self> {
        let device = config.device();

        let targets = if config.project.targets.is_empty() {
            default_targets(device)
        } else {
            config
                .project
                .targets
                .iter()
                .map(|t| Arch::new(t.arch.clone(), t.variant.as_deref()))
                .collect()
        };

        let mut features = BTreeMap::new();
        for (name, feature) in &config.project.features {
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(BuildError::Config(ConfigError::InvalidValue {
                    field: format!("features.{}", name),
                    reason: "name is reserved by a built-in pass".to_string(),
                }));
            }
            let settings = FeatureSettings::resolve(name, feature, config.project_root())?;
            features.insert(name.clone(), settings);
        }

        Ok(Self {
            device,
            targets,
            features,
            out_dir: config.out_dir(),
            max_command_size: config.max_command_size(),
            parallel: config.parallel(),
            shlib_suffix: config.shlib_suffix().to_string(),
        })
    }

    /// Register a feature programmatically
    pub fn with_feature(mut self, name: impl Into<String>, settings: FeatureSettings) -> Self {
        self.features.insert(name.into(), settings);
        self
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSettings> {
        self.features.get(name)
    }
}

fn default_targets(device: bool) -> Vec<Arch> {
    if device {
        vec![Arch::new("arm64", Some("armv8-a"))]
    } else {
        vec![Arch::new("x86_64", None)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_arch_variation_name() {
        let arch = Arch::new("arm64", Some("armv8-a"));
        assert_eq!(arch.variation_name(true), "android_arm64_armv8-a");
        assert_eq!(
            Arch::new("x86_64", None).variation_name(false),
            "linux_glibc_x86_64"
        );
    }

    #[test]
    fn test_default_config() {
        let config = BuildConfig::default();
        assert!(config.device);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.shlib_suffix, ".so");
    }

    #[test]
    fn test_index_file_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pot_map.txt");
        fs::write(&path, "libc.so\nlibm.so\n\nlibdl.so\n").unwrap();

        let indices = read_index_file(&path).unwrap();
        assert_eq!(indices.get("libc.so"), Some(&0));
        assert_eq!(indices.get("libm.so"), Some(&1));
        assert_eq!(indices.get("libdl.so"), Some(&3));
    }

    #[test]
    fn test_missing_index_file() {
        let result = read_index_file(Path::new("/nonexistent/pot_map.txt"));
        assert!(matches!(result, Err(BuildError::IoError { .. })));
    }

    #[test]
    fn test_resolve_feature() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("index.txt"), "liba.so\nlibb.so\n").unwrap();

        let config = FeatureConfig {
            enabled: true,
            index_file: Some(PathBuf::from("index.txt")),
            index_flag: Some("-Wl,-global-index={}".to_string()),
            propagate: vec!["static_lib".to_string()],
            ..Default::default()
        };

        let settings = FeatureSettings::resolve("f", &config, Some(temp_dir.path())).unwrap();
        assert_eq!(settings.indices.get("libb.so"), Some(&1));
        assert_eq!(settings.propagate, vec![DependencyTag::StaticLib]);
        assert_eq!(
            settings.index_flag_for(1).as_deref(),
            Some("-Wl,-global-index=1")
        );
        assert!(settings.device_only);
    }

    #[test]
    fn test_resolve_rejects_unknown_tag() {
        let config = FeatureConfig {
            propagate: vec!["dynamic".to_string()],
            ..Default::default()
        };
        assert!(FeatureSettings::resolve("f", &config, None).is_err());
    }
}
