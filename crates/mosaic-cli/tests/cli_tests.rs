//! End-to-end tests for the mosaic binary
//!
//! Each test builds a throwaway project with mosaic.toml and modules.toml and
//! runs the binary against it with an isolated home directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

const MODULES: &str = r#"
[[module]]
name = "bin"
kind = "binary"
srcs = ["main.c"]
static_libs = ["liba", "libb"]

[[module]]
name = "liba"
kind = "library"
srcs = ["a.c"]
static_libs = ["libb"]

[[module]]
name = "libb"
kind = "static_library"
srcs = ["b.c"]
"#;

fn create_project(config: &str, modules: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("mosaic.toml"), config).unwrap();
    fs::write(temp_dir.path().join("modules.toml"), modules).unwrap();
    temp_dir
}

fn mosaic(dir: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("mosaic");
    cmd.env("HOME", dir)
        .env_remove("MOSAIC_LOG")
        .env_remove("MOSAIC_JSON")
        .env_remove("MOSAIC_DEVICE")
        .env_remove("MOSAIC_FEATURES")
        .env_remove("MOSAIC_PARALLEL")
        .arg("--dir")
        .arg(dir);
    cmd
}

// ============================================================================
// mosaic build
// ============================================================================

#[test]
fn test_build_summary() {
    let project = create_project("[project]\nname = \"demo\"\n", MODULES);

    mosaic(project.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Build succeeded"))
        .stdout(predicate::str::contains("Modules:     3"))
        .stdout(predicate::str::contains("Variants:    4"))
        .stdout(predicate::str::contains("Fingerprint:"));
}

#[test]
fn test_build_json_is_stable() {
    let project = create_project("", MODULES);

    let run = |serial: bool| -> serde_json::Value {
        let mut cmd = mosaic(project.path());
        if serial {
            cmd.arg("--serial");
        }
        let output = cmd.arg("build").arg("--json").output().unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    };

    let parallel = run(false);
    let serial = run(true);
    assert_eq!(parallel["success"], true);
    assert_eq!(parallel["variants"], 4);
    assert_eq!(parallel["fingerprint"], serial["fingerprint"]);
    assert_eq!(parallel["passes"][0], "defaults");
}

#[test]
fn test_build_actions() {
    let project = create_project("", MODULES);

    let output = mosaic(project.path())
        .args(["build", "--actions"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let actions: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rules: Vec<&str> = actions
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["module"] == "bin")
        .map(|a| a["rule"].as_str().unwrap())
        .collect();
    assert_eq!(rules, vec!["cc", "ld"]);
}

#[test]
fn test_build_reports_missing_dependency() {
    let project = create_project(
        "",
        "[[module]]\nname = \"bin\"\nkind = \"binary\"\nstatic_libs = [\"libmissing\"]\n",
    );

    mosaic(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Build failed"))
        .stderr(predicate::str::contains("libmissing"));
}

#[test]
fn test_build_reports_module_errors() {
    let project = create_project(
        "",
        "[[module]]\nname = \"liba\"\nkind = \"library\"\ncflags = [\"--coverage\"]\n",
    );

    mosaic(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 module error(s)"))
        .stderr(predicate::str::contains("liba [defaults] cflags:"));
}

#[test]
fn test_invalid_project_config() {
    let project = create_project("[build]\nmax_command_size = \"huge\"\n", MODULES);

    mosaic(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load project"));
}

// ============================================================================
// mosaic variants / link-order / metadata
// ============================================================================

#[test]
fn test_variants_of_one_module() {
    let project = create_project("", MODULES);

    mosaic(project.path())
        .args(["variants", "liba"])
        .assert()
        .success()
        .stdout("liba\n  android_arm64_armv8-a_core_static\n  android_arm64_armv8-a_core_shared\n");
}

#[test]
fn test_variants_unknown_module() {
    let project = create_project("", MODULES);

    mosaic(project.path())
        .args(["variants", "libmissing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Module not found: libmissing"));
}

#[test]
fn test_link_order() {
    let project = create_project("", MODULES);

    mosaic(project.path())
        .args(["link-order", "bin", "android_arm64_armv8-a_core"])
        .assert()
        .success()
        .stdout(
            "liba(android_arm64_armv8-a_core_static)\nlibb(android_arm64_armv8-a_core_static)\n",
        );
}

#[test]
fn test_link_order_unknown_variant_lists_available() {
    let project = create_project("", MODULES);

    mosaic(project.path())
        .args(["link-order", "liba", "android_arm64_armv8-a_core"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("available: [android_arm64_armv8-a_core_static"));
}

#[test]
fn test_metadata_for_configured_feature() {
    let project = create_project(
        r#"
[features.pagerando]
enabled = true
"#,
        MODULES,
    );

    mosaic(project.path())
        .args(["metadata", "liba"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "liba(android_arm64_armv8-a_core_shared)\n  LOCAL_PAGERANDO := true",
        ))
        .stdout(predicate::str::contains("bin").not());
}

#[test]
fn test_verbose_logs_passes() {
    let project = create_project("", MODULES);

    mosaic(project.path())
        .args(["--verbose", "build"])
        .assert()
        .success()
        .stderr(predicate::str::contains("run pass"));
}
