/// Build graph error types
use mosaic_config::ConfigError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

/// A configuration error reported against one module variant
///
/// Module errors do not stop sibling modules; the pipeline collects them and
/// fails at the end of the epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    pub module: String,
    /// Variation subdirectory of the failing variant ("" before any split)
    pub variant: String,
    /// Pass that reported the error
    pub pass: String,
    /// Offending property, when the error is about one
    pub property: Option<String>,
    pub message: String,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module)?;
        if !self.variant.is_empty() {
            write!(f, "({})", self.variant)?;
        }
        write!(f, " [{}]", self.pass)?;
        if let Some(property) = &self.property {
            write!(f, " {}:", property)?;
        }
        write!(f, " {}", self.message)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Module '{module}' declared more than once")]
    DuplicateModule { module: String },

    #[error("Module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("Variant '{variant}' of module '{module}' not found, available: [{}]", .available.join(", "))]
    VariantNotFound {
        module: String,
        variant: String,
        available: Vec<String>,
    },

    #[error("Duplicate variation '{variant}' of module '{module}'")]
    DuplicateVariation { module: String, variant: String },

    #[error("Dependency resolution failed: {0}")]
    DependencyResolutionError(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Invalid variation in pass '{pass}': {reason}")]
    InvalidVariation { pass: String, reason: String },

    #[error("Item '{item}' of size {size} exceeds the command size limit of {max}")]
    ItemTooLarge {
        item: String,
        size: usize,
        max: usize,
    },

    #[error("{}", format_module_errors(.0))]
    ModuleErrors(Vec<ModuleError>),

    #[error("No action matches {0}")]
    ActionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },
}

fn format_module_errors(errors: &[ModuleError]) -> String {
    let mut out = format!("{} module error(s):", errors.len());
    for error in errors {
        out.push_str("\n  ");
        out.push_str(&error.to_string());
    }
    out
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a module not found error
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module: module.into(),
        }
    }

    /// Create an invalid variation error
    pub fn invalid_variation(pass: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidVariation {
            pass: pass.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a dependency resolution error
    pub fn resolution(reason: impl ToString) -> Self {
        Self::DependencyResolutionError(reason.to_string())
    }

    /// Structural invariant violations abort the build immediately; everything
    /// else is reported against a module or an input.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            BuildError::DuplicateModule { .. }
                | BuildError::ModuleNotFound { .. }
                | BuildError::DuplicateVariation { .. }
                | BuildError::DependencyResolutionError(_)
                | BuildError::CircularDependency(_)
                | BuildError::InvalidVariation { .. }
        )
    }

    /// Module errors carried by this error, if any
    pub fn module_errors(&self) -> &[ModuleError] {
        match self {
            BuildError::ModuleErrors(errors) => errors,
            _ => &[],
        }
    }
}
