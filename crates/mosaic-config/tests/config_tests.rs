//! Configuration loading and precedence tests

use mosaic_config::{ConfigError, ConfigLoader, ProjectConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join("mosaic.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn loader(dir: &Path) -> ConfigLoader {
    ConfigLoader::new().with_global_config_path(dir.join("global.toml"))
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_project_config_basic() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[project]
name = "platform"
"#,
    );

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.project_name(), Some("platform"));
    assert!(config.is_project());
}

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.project_name(), None);
}

#[test]
#[serial]
fn test_load_with_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    // Every section is optional
    assert!(config.is_project());
    assert!(config.device());
    assert_eq!(config.out_dir(), temp_dir.path().join("out"));
}

#[test]
#[serial]
fn test_load_from_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = create_config_file(
        temp_dir.path(),
        r#"
[project]
name = "specific"

[build]
out_dir = "/tmp/mosaic-out"
shlib_suffix = ".dylib"
"#,
    );

    let config = loader(temp_dir.path())
        .load_from_file(&config_path)
        .unwrap();

    assert_eq!(config.project_name(), Some("specific"));
    assert_eq!(config.out_dir(), PathBuf::from("/tmp/mosaic-out"));
    assert_eq!(config.shlib_suffix(), ".dylib");
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

#[test]
#[serial]
fn test_invalid_toml_syntax() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[project
name = "broken
"#,
    );

    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());
    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[test]
fn test_unknown_field_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        r#"
[features.pagerando]
enabled = true
index_flags = "-Wl,{}"
"#,
    );

    assert!(ProjectConfig::load_from_file(&path).is_err());
}

#[test]
fn test_missing_file_reports_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let result = ProjectConfig::load_from_file(&temp_dir.path().join("mosaic.toml"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("global.toml"),
        "[build]\nparallel = false\nmax_command_size = 1024\n",
    )
    .unwrap();
    create_config_file(temp_dir.path(), "[build]\nmax_command_size = 4096\n");

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.max_command_size(), 4096);
    // Not set by the project, so the global default applies
    assert!(!config.parallel());
}

#[test]
#[serial]
fn test_malformed_global_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("global.toml"), "[build\nparallel = ").unwrap();
    create_config_file(temp_dir.path(), "[project]\nname = \"platform\"\n");

    let config = loader(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.project_name(), Some("platform"));
    assert!(config.global.build.is_none());

    let config = loader(temp_dir.path())
        .load_from_file(&temp_dir.path().join("mosaic.toml"))
        .unwrap();
    assert!(config.global.build.is_none());
}

#[test]
#[serial]
fn test_env_overrides_project() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[build]
out_dir = "out"
max_command_size = 4096
parallel = true
"#,
    );

    env::set_var("MOSAIC_OUT_DIR", "/tmp/elsewhere");
    env::set_var("MOSAIC_MAX_COMMAND_SIZE", "64");
    env::set_var("MOSAIC_PARALLEL", "off");

    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());

    env::remove_var("MOSAIC_OUT_DIR");
    env::remove_var("MOSAIC_MAX_COMMAND_SIZE");
    env::remove_var("MOSAIC_PARALLEL");

    let config = result.unwrap();
    assert_eq!(config.out_dir(), PathBuf::from("/tmp/elsewhere"));
    assert_eq!(config.max_command_size(), 64);
    assert!(!config.parallel());
}

#[test]
#[serial]
fn test_env_feature_toggle_keeps_project_settings() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[features.pagerando]
enabled = false
runtime_library = "ld-android"
"#,
    );

    env::set_var("MOSAIC_FEATURES", "pagerando=yes");
    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("MOSAIC_FEATURES");

    let config = result.unwrap();
    let feature = &config.project.features["pagerando"];
    assert!(feature.enabled);
    assert_eq!(feature.runtime_library.as_deref(), Some("ld-android"));
}

#[test]
#[serial]
fn test_env_feature_with_bad_value() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("MOSAIC_FEATURES", "pagerando=maybe");
    let result = loader(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("MOSAIC_FEATURES");

    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}
