//! Module Declarations (modules.toml)
//!
//! A `modules.toml` file declares one or more build modules:
//!
//! ```toml
//! [[module]]
//! name = "libz"
//! kind = "library"
//! srcs = ["adler32.c", "inflate.c"]
//! static_libs = ["libbase"]
//! lto = "thin"
//!
//! [module.features]
//! pagerando = true
//! ```

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// The contents of one modules.toml file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    /// Declared modules, in file order
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleSpec>,
}

/// What a module builds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Both a static and a shared library
    Library,
    /// Static archive only
    StaticLibrary,
    /// Shared object only
    SharedLibrary,
    /// Linked executable
    Binary,
    /// Relocatable object
    Object,
    /// Property template merged into other modules, never built
    Defaults,
}

impl ModuleKind {
    /// Whether the module produces a library
    pub fn is_library(self) -> bool {
        matches!(
            self,
            ModuleKind::Library | ModuleKind::StaticLibrary | ModuleKind::SharedLibrary
        )
    }

    /// Whether the module produces build outputs at all
    pub fn is_buildable(self) -> bool {
        self != ModuleKind::Defaults
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleKind::Library => "library",
            ModuleKind::StaticLibrary => "static_library",
            ModuleKind::SharedLibrary => "shared_library",
            ModuleKind::Binary => "binary",
            ModuleKind::Object => "object",
            ModuleKind::Defaults => "defaults",
        };
        write!(f, "{}", s)
    }
}

/// Link-time optimization mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LtoMode {
    /// Not set by the module, the build decides
    #[default]
    Unset,
    Thin,
    Full,
    /// Explicitly disabled
    Never,
}

impl fmt::Display for LtoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LtoMode::Unset => "unset",
            LtoMode::Thin => "thin",
            LtoMode::Full => "full",
            LtoMode::Never => "never",
        };
        write!(f, "{}", s)
    }
}

/// One declared module
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    /// Module name, unique across the build
    pub name: String,

    pub kind: ModuleKind,

    #[serde(default)]
    pub srcs: Vec<String>,

    /// Extra sources compiled only into the vendor image variant
    #[serde(default)]
    pub vendor_srcs: Vec<String>,

    #[serde(default)]
    pub cflags: Vec<String>,

    #[serde(default)]
    pub ldflags: Vec<String>,

    #[serde(default)]
    pub shared_libs: Vec<String>,

    #[serde(default)]
    pub static_libs: Vec<String>,

    /// Static libraries whose symbols are re-exported
    #[serde(default)]
    pub export_static_libs: Vec<String>,

    /// Static libraries placed after everything else on the link line
    #[serde(default)]
    pub late_static_libs: Vec<String>,

    #[serde(default)]
    pub whole_static_libs: Vec<String>,

    #[serde(default)]
    pub objs: Vec<String>,

    /// Link-time optimization (omit to leave unset)
    #[serde(default)]
    pub lto: Option<LtoMode>,

    #[serde(default)]
    pub vendor_available: bool,

    /// Built against a published SDK rather than the platform
    #[serde(default)]
    pub sdk_version: Option<String>,

    /// Defaults modules merged into this one, in order
    #[serde(default)]
    pub defaults: Vec<String>,

    /// Install the module's output (default: true)
    #[serde(default)]
    pub installable: Option<bool>,

    /// Per-module feature requests
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl ModuleSpec {
    /// A module with the given name and kind and nothing else
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            srcs: Vec::new(),
            vendor_srcs: Vec::new(),
            cflags: Vec::new(),
            ldflags: Vec::new(),
            shared_libs: Vec::new(),
            static_libs: Vec::new(),
            export_static_libs: Vec::new(),
            late_static_libs: Vec::new(),
            whole_static_libs: Vec::new(),
            objs: Vec::new(),
            lto: None,
            vendor_available: false,
            sdk_version: None,
            defaults: Vec::new(),
            installable: None,
            features: BTreeMap::new(),
        }
    }

    /// Every module name this declaration refers to
    pub fn referenced_modules(&self) -> impl Iterator<Item = &str> {
        self.shared_libs
            .iter()
            .chain(&self.static_libs)
            .chain(&self.export_static_libs)
            .chain(&self.late_static_libs)
            .chain(&self.whole_static_libs)
            .chain(&self.objs)
            .chain(&self.defaults)
            .map(String::as_str)
    }
}

impl ModuleManifest {
    /// Load a module manifest from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let manifest = Self::parse(&content).map_err(|e| match e {
            ManifestParse::Toml(error) => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            ManifestParse::Invalid(e) => e,
        })?;
        Ok(manifest)
    }

    /// Parse and validate manifest text
    pub fn parse_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content).map_err(|e| match e {
            ManifestParse::Toml(error) => ConfigError::ValidationError(error.to_string()),
            ManifestParse::Invalid(e) => e,
        })
    }

    fn parse(content: &str) -> Result<Self, ManifestParse> {
        let manifest: Self = toml::from_str(content).map_err(ManifestParse::Toml)?;
        manifest.validate().map_err(ManifestParse::Invalid)?;
        Ok(manifest)
    }

    /// Validate declarations within this file
    ///
    /// Cross-file checks (unknown dependency modules, duplicates across files)
    /// belong to the graph.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();

        for (i, module) in self.modules.iter().enumerate() {
            if module.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("module[{}].name", i),
                    reason: "name cannot be empty".to_string(),
                });
            }

            if module.name.contains(['(', ')', ' ', '/']) {
                return Err(ConfigError::InvalidValue {
                    field: format!("module[{}].name", i),
                    reason: format!("invalid module name '{}'", module.name),
                });
            }

            if !module.vendor_srcs.is_empty() && !module.vendor_available {
                return Err(ConfigError::InvalidValue {
                    field: format!("module[{}].vendor_srcs", i),
                    reason: "requires vendor_available = true".to_string(),
                });
            }

            if !seen.insert(module.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "module '{}' declared twice",
                    module.name
                )));
            }

            if module.kind == ModuleKind::Defaults
                && !(module.srcs.is_empty() && module.vendor_srcs.is_empty())
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("module[{}].srcs", i),
                    reason: "defaults modules cannot have sources".to_string(),
                });
            }
        }

        Ok(())
    }
}

enum ManifestParse {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = ModuleManifest::parse_str(
            r#"
[[module]]
name = "libz"
kind = "library"
srcs = ["adler32.c"]
static_libs = ["libbase"]
lto = "thin"

[module.features]
pagerando = true

[[module]]
name = "toybox"
kind = "binary"
shared_libs = ["libz"]
"#,
        )
        .unwrap();

        assert_eq!(manifest.modules.len(), 2);
        let libz = &manifest.modules[0];
        assert_eq!(libz.kind, ModuleKind::Library);
        assert_eq!(libz.lto, Some(LtoMode::Thin));
        assert_eq!(libz.features.get("pagerando"), Some(&true));
        assert_eq!(manifest.modules[1].shared_libs, vec!["libz"]);
    }

    #[test]
    fn test_reject_duplicate_names() {
        let result = ModuleManifest::parse_str(
            r#"
[[module]]
name = "liba"
kind = "static_library"

[[module]]
name = "liba"
kind = "shared_library"
"#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_reject_unknown_kind() {
        let result = ModuleManifest::parse_str(
            r#"
[[module]]
name = "liba"
kind = "archive"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_referenced_modules() {
        let mut spec = ModuleSpec::new("bin", ModuleKind::Binary);
        spec.static_libs = vec!["liba".to_string()];
        spec.shared_libs = vec!["libc".to_string()];
        spec.defaults = vec!["cc_defaults".to_string()];

        let refs: Vec<&str> = spec.referenced_modules().collect();
        assert_eq!(refs, vec!["libc", "liba", "cc_defaults"]);
    }

    #[test]
    fn test_kind_helpers() {
        assert!(ModuleKind::Library.is_library());
        assert!(!ModuleKind::Binary.is_library());
        assert!(!ModuleKind::Defaults.is_buildable());
        assert_eq!(ModuleKind::StaticLibrary.to_string(), "static_library");
    }
}
