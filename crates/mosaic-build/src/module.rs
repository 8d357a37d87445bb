//! Module declarations as they enter the graph

use crate::properties::{Capability, FeatureState, Flags, LtoMode, ModuleProperties};
use crate::tag::DependencyTag;
use crate::variation::Variations;
pub use mosaic_config::ModuleKind;
use mosaic_config::ModuleSpec;
use serde::{Deserialize, Serialize};

/// An outgoing edge of a variant
///
/// Edges name the target module, not a variant; they are resolved against the
/// target's live variants whenever the graph is queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub tag: DependencyTag,
    pub module: String,
    /// Variations forced on the target, overriding the source's own state
    #[serde(skip_serializing_if = "Variations::is_empty", default)]
    pub pinned: Variations,
}

impl Dependency {
    pub fn new(tag: DependencyTag, module: impl Into<String>) -> Self {
        Self {
            tag,
            module: module.into(),
            pinned: Variations::new(),
        }
    }

    /// Pin `axis` of the target to `value`
    pub fn pinned(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.pinned.set(axis, value);
        self
    }
}

/// A user-declared module before any splitting
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: String,
    pub kind: ModuleKind,
    pub props: ModuleProperties,
    /// Declared dependencies, order-preserving within each tag
    pub deps: Vec<Dependency>,
}

impl ModuleDecl {
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        let mut props = ModuleProperties::default();
        if kind == ModuleKind::Object {
            props.lto = Capability::NotApplicable;
        }
        Self {
            name: name.into(),
            kind,
            props,
            deps: Vec::new(),
        }
    }

    pub fn library(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::Library)
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::Binary)
    }

    pub fn with_dep(mut self, tag: DependencyTag, module: impl Into<String>) -> Self {
        self.deps.push(Dependency::new(tag, module));
        self
    }

    pub fn with_deps<I, S>(mut self, tag: DependencyTag, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps
            .extend(modules.into_iter().map(|m| Dependency::new(tag, m)));
        self
    }

    pub fn static_libs<I, S>(self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_deps(DependencyTag::StaticLib, modules)
    }

    pub fn shared_libs<I, S>(self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_deps(DependencyTag::SharedLib, modules)
    }

    pub fn srcs<I, S>(mut self, srcs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.props.srcs.extend(srcs.into_iter().map(Into::into));
        self
    }

    pub fn lto(mut self, mode: LtoMode) -> Self {
        if let Some(lto) = self.props.lto.as_mut() {
            *lto = mode;
        }
        self
    }

    /// Explicitly request (or refuse) a feature
    pub fn feature(mut self, name: &str, requested: bool) -> Self {
        if let Some(state) = self.props.feature_mut(name) {
            state.requested = Some(requested);
        }
        self
    }

    /// Names of every module this declaration depends on, in declaration order
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().map(|d| d.module.as_str())
    }
}

impl From<ModuleSpec> for ModuleDecl {
    fn from(spec: ModuleSpec) -> Self {
        let mut decl = ModuleDecl::new(spec.name, spec.kind);

        decl.props.srcs = spec.srcs;
        decl.props.vendor_srcs = spec.vendor_srcs;
        decl.props.flags = Flags {
            cflags: spec.cflags,
            ldflags: spec.ldflags,
        };
        if let (Some(mode), Some(lto)) = (spec.lto, decl.props.lto.as_mut()) {
            *lto = mode;
        }
        decl.props.vendor_available = spec.vendor_available;
        decl.props.sdk_version = spec.sdk_version;
        decl.props.defaults = spec.defaults;
        decl.props.installable = spec.installable.unwrap_or(true);

        for (name, requested) in spec.features {
            decl.props.features.insert(
                name,
                Capability::Present(FeatureState {
                    requested: Some(requested),
                    ..Default::default()
                }),
            );
        }

        let lists = [
            (DependencyTag::SharedLib, spec.shared_libs),
            (DependencyTag::StaticLib, spec.static_libs),
            (DependencyTag::StaticExport, spec.export_static_libs),
            (DependencyTag::LateStatic, spec.late_static_libs),
            (DependencyTag::WholeStatic, spec.whole_static_libs),
            (DependencyTag::Object, spec.objs),
        ];
        for (tag, modules) in lists {
            decl = decl.with_deps(tag, modules);
        }

        decl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_spec_keeps_declared_order() {
        let mut spec = ModuleSpec::new("bin", ModuleKind::Binary);
        spec.static_libs = vec!["lib2".into(), "lib1".into()];
        spec.shared_libs = vec!["libc".into()];
        spec.lto = Some(LtoMode::Thin);
        spec.features.insert("pagerando".into(), false);

        let decl = ModuleDecl::from(spec);

        let static_deps: Vec<&str> = decl
            .deps
            .iter()
            .filter(|d| d.tag == DependencyTag::StaticLib)
            .map(|d| d.module.as_str())
            .collect();
        assert_eq!(static_deps, vec!["lib2", "lib1"]);
        assert_eq!(decl.props.lto_mode(), LtoMode::Thin);
        assert_eq!(
            decl.props.feature("pagerando").and_then(|f| f.as_ref()).map(|f| f.requested),
            Some(Some(false))
        );
    }

    #[test]
    fn test_objects_have_no_lto() {
        let decl = ModuleDecl::new("crtbegin", ModuleKind::Object).lto(LtoMode::Full);
        assert!(!decl.props.lto.is_present());
    }

    #[test]
    fn test_builder_helpers() {
        let decl = ModuleDecl::library("a")
            .static_libs(["b", "c"])
            .shared_libs(["libc"])
            .srcs(["a.c"]);
        let names: Vec<&str> = decl.dependency_names().collect();
        assert_eq!(names, vec!["b", "c", "libc"]);
        assert_eq!(decl.props.srcs, vec!["a.c"]);
    }
}
