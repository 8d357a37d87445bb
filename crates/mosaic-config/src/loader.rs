//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{BuildSection, FeatureConfig, ProjectConfig};
use crate::{parse_bool, ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the project configuration file
pub const PROJECT_FILE: &str = "mosaic.toml";

/// Default limit for a single tool command line
pub const DEFAULT_MAX_COMMAND_SIZE: usize = 131_072;

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.mosaic/config.toml) - lowest priority
/// 2. Project config (./mosaic.toml) - overrides global
/// 3. Environment variables (MOSAIC_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where mosaic.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Read the global configuration from an explicit path instead of the home directory
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find mosaic.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.global_config_or_default();
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.global_config_or_default();
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Global configuration, or defaults when it cannot be loaded
    ///
    /// A missing file is silent; an unreadable or malformed one is logged.
    fn global_config_or_default(&mut self) -> GlobalConfig {
        match self.load_global_config() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "ignoring global configuration");
                GlobalConfig::default()
            }
        }
    }

    /// Load global configuration from ~/.mosaic/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized variables: MOSAIC_DEVICE, MOSAIC_OUT_DIR, MOSAIC_MAX_COMMAND_SIZE,
    /// MOSAIC_PARALLEL and MOSAIC_FEATURES (`name=true,other=false`).
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(device) = env::var("MOSAIC_DEVICE") {
            let device = parse_bool(&device).ok_or_else(|| invalid_env("MOSAIC_DEVICE", &device))?;
            build_section(&mut config).device = Some(device);
        }

        if let Ok(out_dir) = env::var("MOSAIC_OUT_DIR") {
            build_section(&mut config).out_dir = Some(PathBuf::from(out_dir));
        }

        if let Ok(size) = env::var("MOSAIC_MAX_COMMAND_SIZE") {
            let parsed = size
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| invalid_env("MOSAIC_MAX_COMMAND_SIZE", &size))?;
            build_section(&mut config).max_command_size = Some(parsed);
        }

        if let Ok(parallel) = env::var("MOSAIC_PARALLEL") {
            let parallel =
                parse_bool(&parallel).ok_or_else(|| invalid_env("MOSAIC_PARALLEL", &parallel))?;
            build_section(&mut config).parallel = Some(parallel);
        }

        if let Ok(features) = env::var("MOSAIC_FEATURES") {
            for entry in features.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (name, value) = match entry.split_once('=') {
                    Some((name, value)) => (name.trim(), value),
                    None => (entry, "true"),
                };
                let enabled =
                    parse_bool(value).ok_or_else(|| invalid_env("MOSAIC_FEATURES", entry))?;
                config
                    .features
                    .entry(name.to_string())
                    .or_insert_with(FeatureConfig::default)
                    .enabled = enabled;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the global configuration directory (~/.mosaic)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".mosaic"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn build_section(config: &mut ProjectConfig) -> &mut BuildSection {
    config.build.get_or_insert_with(BuildSection::default)
}

fn invalid_env(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: name.to_string(),
        reason: format!("cannot parse '{}'", value),
    }
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Get the project name
    pub fn project_name(&self) -> Option<&str> {
        self.project.project_name()
    }

    /// Check if this is a project (has mosaic.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    fn build(&self) -> Option<&BuildSection> {
        self.project.build.as_ref()
    }

    /// Build for a device (default) or the host
    pub fn device(&self) -> bool {
        self.build().and_then(|b| b.device).unwrap_or(true)
    }

    /// Output directory, relative paths are resolved against the project root
    pub fn out_dir(&self) -> PathBuf {
        let out = self
            .build()
            .and_then(|b| b.out_dir.clone())
            .unwrap_or_else(|| PathBuf::from("out"));
        match (&self.project_root, out.is_relative()) {
            (Some(root), true) => root.join(out),
            _ => out,
        }
    }

    /// Effective command size limit (project > global > default)
    pub fn max_command_size(&self) -> usize {
        self.build()
            .and_then(|b| b.max_command_size)
            .or_else(|| self.global.max_command_size())
            .unwrap_or(DEFAULT_MAX_COMMAND_SIZE)
    }

    /// Effective parallelism (project > global > default)
    pub fn parallel(&self) -> bool {
        self.build()
            .and_then(|b| b.parallel)
            .or_else(|| self.global.parallel())
            .unwrap_or(true)
    }

    /// Shared library suffix
    pub fn shlib_suffix(&self) -> &str {
        self.build()
            .and_then(|b| b.shlib_suffix.as_deref())
            .unwrap_or(".so")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn loader_without_home(dir: &Path) -> ConfigLoader {
        ConfigLoader::new().with_global_config_path(dir.join("no-such-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[project]
name = "platform"
"#,
        );

        let mut loader = loader_without_home(temp_dir.path());
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.project_name(), Some("platform"));
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[project]
name = "parent"
"#,
        );

        let sub_dir = temp_dir.path().join("external").join("zlib");
        fs::create_dir_all(&sub_dir).unwrap();

        let mut loader = loader_without_home(temp_dir.path());
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.project_name(), Some("parent"));
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    fn test_defaults_without_project() {
        let config = Config::default();

        assert!(config.device());
        assert!(config.parallel());
        assert_eq!(config.max_command_size(), DEFAULT_MAX_COMMAND_SIZE);
        assert_eq!(config.shlib_suffix(), ".so");
        assert_eq!(config.out_dir(), PathBuf::from("out"));
    }

    #[test]
    fn test_out_dir_relative_to_root() {
        let config = Config {
            project_root: Some(PathBuf::from("/src/platform")),
            ..Default::default()
        };
        assert_eq!(config.out_dir(), PathBuf::from("/src/platform/out"));
    }

    #[test]
    #[serial]
    fn test_global_defaults_apply() {
        let temp_dir = TempDir::new().unwrap();
        let global_path = temp_dir.path().join("global.toml");
        fs::write(&global_path, "[build]\nparallel = false\nmax_command_size = 512\n").unwrap();
        create_config_file(temp_dir.path(), "[project]\nname = \"p\"\n");

        let mut loader = ConfigLoader::new().with_global_config_path(&global_path);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert!(!config.parallel());
        assert_eq!(config.max_command_size(), 512);
    }

    #[test]
    #[serial]
    fn test_env_override_device_and_features() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[build]
device = true

[features.pagerando]
enabled = false
"#,
        );

        env::set_var("MOSAIC_DEVICE", "false");
        env::set_var("MOSAIC_FEATURES", "pagerando=true,cfi");

        let mut loader = loader_without_home(temp_dir.path());
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var("MOSAIC_DEVICE");
        env::remove_var("MOSAIC_FEATURES");

        let config = result.unwrap();
        assert!(!config.device());
        assert!(config.project.features["pagerando"].enabled);
        assert!(config.project.features["cfi"].enabled);
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[project]\nname = \"p\"\n");

        env::set_var("MOSAIC_MAX_COMMAND_SIZE", "lots");

        let mut loader = loader_without_home(temp_dir.path());
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var("MOSAIC_MAX_COMMAND_SIZE");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
