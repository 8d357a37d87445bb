//! Module property bags
//!
//! Every variant owns its own [`ModuleProperties`]. Splitting a variant deep
//! copies the bag, so clones can be mutated independently.

pub use mosaic_config::LtoMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An optional capability of a module
///
/// Modules that cannot support a capability at all (an object module is never
/// linked, so it has no LTO) carry `NotApplicable` instead of a null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability<T> {
    NotApplicable,
    Present(T),
}

impl<T> Capability<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Capability::Present(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Capability::Present(value) => Some(value),
            Capability::NotApplicable => None,
        }
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        match self {
            Capability::Present(value) => Some(value),
            Capability::NotApplicable => None,
        }
    }

    /// Query the capability, answering `default` when it does not apply
    pub fn query<R>(&self, default: R, f: impl FnOnce(&T) -> R) -> R {
        match self {
            Capability::Present(value) => f(value),
            Capability::NotApplicable => default,
        }
    }
}

impl<T: Default> Default for Capability<T> {
    fn default() -> Self {
        Capability::Present(T::default())
    }
}

/// Per-module state of one propagated feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureState {
    /// Explicit request from the module or the global toggle; `None` is undecided
    pub requested: Option<bool>,
    /// Set when a dependent that builds with the feature links this module statically
    pub required_by_dependent: bool,
    /// Index of the library's output in the feature's index file
    pub index: Option<u64>,
}

impl FeatureState {
    pub fn enabled(&self) -> bool {
        self.requested == Some(true)
    }
}

/// Compiler and linker flags accumulated by passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

/// Architecture a variant was split onto
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// "android" for device builds, "linux_glibc" for host builds
    pub os: String,
    pub arch: String,
    pub arch_variant: Option<String>,
}

/// Property bag of a module variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProperties {
    pub srcs: Vec<String>,
    /// Sources added only to the vendor image variant
    pub vendor_srcs: Vec<String>,
    pub flags: Flags,
    pub lto: Capability<LtoMode>,
    pub features: BTreeMap<String, Capability<FeatureState>>,
    pub installable: bool,
    pub sdk_version: Option<String>,
    pub vendor_available: bool,
    pub defaults: Vec<String>,
    /// Set by the arch pass
    pub target: Option<TargetInfo>,
}

impl Default for ModuleProperties {
    fn default() -> Self {
        Self {
            srcs: Vec::new(),
            vendor_srcs: Vec::new(),
            flags: Flags::default(),
            lto: Capability::default(),
            features: BTreeMap::new(),
            installable: true,
            sdk_version: None,
            vendor_available: false,
            defaults: Vec::new(),
            target: None,
        }
    }
}

impl ModuleProperties {
    /// Whether feature `name` ends up enabled; false when it does not apply
    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features
            .get(name)
            .map(|f| f.query(false, FeatureState::enabled))
            .unwrap_or(false)
    }

    /// Mutable state of feature `name`, created as undecided on first use
    ///
    /// Returns `None` when the feature is not applicable to the module.
    pub fn feature_mut(&mut self, name: &str) -> Option<&mut FeatureState> {
        self.features
            .entry(name.to_string())
            .or_default()
            .as_mut()
    }

    pub fn feature(&self, name: &str) -> Option<&Capability<FeatureState>> {
        self.features.get(name)
    }

    pub fn uses_sdk(&self) -> bool {
        self.sdk_version.is_some()
    }

    /// Effective LTO mode, `Unset` when LTO does not apply
    pub fn lto_mode(&self) -> LtoMode {
        self.lto.query(LtoMode::Unset, |m| *m)
    }
}

/// Validate user-supplied compiler flags
///
/// Returns one message per rejected flag. Flags must start with `-`, may not
/// add include paths or coverage, and may only contain spaces for
/// `-include <relative path>` or a `-D` definition with a value.
pub fn check_bad_compiler_flags(flags: &[String]) -> Vec<String> {
    let mut errors = Vec::new();

    for flag in flags {
        let flag = flag.as_str();
        if !flag.starts_with('-') {
            errors.push(format!("Flag `{}` must start with `-`", flag));
        } else if flag.starts_with("-I") || flag.starts_with("-isystem") {
            errors.push(format!(
                "Bad flag `{}`, use local_include_dirs or include_dirs instead",
                flag
            ));
        } else if flag == "--coverage" {
            errors.push(format!("Bad flag: `{}`, use native_coverage instead", flag));
        } else if flag.contains(' ') {
            let args: Vec<&str> = flag.split(' ').collect();
            if args[0] == "-include" {
                if args.len() > 2 {
                    errors.push(format!(
                        "`-include` only takes one argument: `{}`",
                        flag
                    ));
                } else if args[1].starts_with('/') {
                    errors.push(format!("Path must not be an absolute path: {}", flag));
                }
            } else if flag.starts_with("-D") && flag.contains('=') {
                // spaces are allowed inside a definition
            } else {
                errors.push(format!("Bad flag: `{}` is not allowed", flag));
            }
        }
    }

    errors
}
