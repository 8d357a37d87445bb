//! Variant graph store
//!
//! Holds every live variant of every module together with its outgoing
//! edges. Edges name a target *module*; which variant of that module an edge
//! reaches is decided at query time by matching variation selectors, so
//! splitting a target into several clones automatically makes every inbound
//! edge see all of them.
//!
//! # Edge resolution
//!
//! For each axis the candidate target variant was split on, the wanted value is
//! taken from (first match wins):
//!
//! 1. the edge's own pin
//! 2. the link type implied by the edge's tag, on the `link` axis
//! 3. the source's dependency variations (set with `set_dependency_variation`)
//! 4. the source's own variations
//! 5. the axis default (the first value the axis was created with)
//!
//! The first candidate whose every axis matches wins.

use crate::error::{BuildError, BuildResult};
use crate::link_order::{order_deps, transitive_orders, OrderedDeps};
use crate::module::{Dependency, ModuleDecl, ModuleKind};
use crate::properties::ModuleProperties;
use crate::tag::DependencyTag;
use crate::variation::Variations;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// Axis created by the link pass
pub const LINK_AXIS: &str = "link";

/// Stable handle of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantId(usize);

impl VariantId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One concrete realization of a module
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub(crate) id: VariantId,
    pub module: String,
    pub kind: ModuleKind,
    /// Selectors identifying this variant among its module's variants
    pub variations: Variations,
    /// Selectors forced on every outgoing edge
    pub dependency_variations: Variations,
    pub props: ModuleProperties,
    pub deps: Vec<Dependency>,
}

impl Variant {
    pub fn id(&self) -> VariantId {
        self.id
    }

    /// Selector string, e.g. `android_arm64_armv8-a_core_static`
    pub fn subdir(&self) -> String {
        self.variations.subdir()
    }

    /// `module(subdir)` for messages and metadata
    pub fn display_name(&self) -> String {
        let subdir = self.subdir();
        if subdir.is_empty() {
            self.module.clone()
        } else {
            format!("{}({})", self.module, subdir)
        }
    }
}

/// Static link order of one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOrder {
    /// Every reachable static dependency in link order
    pub all: Vec<VariantId>,
    /// Declared direct static dependencies in link order
    pub declared: Vec<VariantId>,
}

/// The variant graph
#[derive(Debug, Clone, Default)]
pub struct VariantGraph {
    /// Arena indexed by `VariantId`; retired (split) variants are `None`
    variants: Vec<Option<Variant>>,
    /// Live variants of each module, in creation order
    modules: IndexMap<String, Vec<VariantId>>,
    /// First value created on each axis
    axis_defaults: BTreeMap<String, String>,
}

impl VariantGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph with one variant per declared module
    pub fn from_modules(decls: impl IntoIterator<Item = ModuleDecl>) -> BuildResult<Self> {
        let mut graph = Self::new();
        for decl in decls {
            graph.add_module(decl)?;
        }
        Ok(graph)
    }

    /// Add a declared module as a single, unsplit variant
    pub fn add_module(&mut self, decl: ModuleDecl) -> BuildResult<VariantId> {
        if self.modules.contains_key(&decl.name) {
            return Err(BuildError::DuplicateModule { module: decl.name });
        }

        let id = VariantId(self.variants.len());
        self.modules.insert(decl.name.clone(), vec![id]);
        self.variants.push(Some(Variant {
            id,
            module: decl.name,
            kind: decl.kind,
            variations: Variations::new(),
            dependency_variations: Variations::new(),
            props: decl.props,
            deps: decl.deps,
        }));
        Ok(id)
    }

    /// Get a live variant
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn variant_mut(&mut self, id: VariantId) -> Option<&mut Variant> {
        self.variants.get_mut(id.0).and_then(Option::as_mut)
    }

    fn expect_variant(&self, id: VariantId) -> BuildResult<&Variant> {
        self.variant(id)
            .ok_or_else(|| BuildError::resolution(format!("variant {} is not live", id)))
    }

    /// Whether a module with this name exists
    pub fn contains_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Module names in declaration order
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Live variants of one module, in creation order
    pub fn variants_of<'a>(&'a self, module: &str) -> impl Iterator<Item = &'a Variant> + 'a {
        self.modules
            .get(module)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.variant(*id))
    }

    /// Every live variant, grouped by module in declaration order
    pub fn live_variants(&self) -> impl Iterator<Item = &Variant> {
        self.modules
            .values()
            .flatten()
            .filter_map(move |id| self.variant(*id))
    }

    /// Ids of every live variant, same order as [`VariantGraph::live_variants`]
    pub fn live_ids(&self) -> Vec<VariantId> {
        self.modules.values().flatten().copied().collect()
    }

    /// Number of live variants
    pub fn len(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Default value of an axis, if the axis exists
    pub fn axis_default(&self, axis: &str) -> Option<&str> {
        self.axis_defaults.get(axis).map(String::as_str)
    }

    /// Find the variant of `module` whose selector string is `subdir`
    pub fn find_variant(&self, module: &str, subdir: &str) -> BuildResult<&Variant> {
        if !self.contains_module(module) {
            return Err(BuildError::module_not_found(module));
        }
        self.variants_of(module)
            .find(|v| v.subdir() == subdir)
            .ok_or_else(|| BuildError::VariantNotFound {
                module: module.to_string(),
                variant: subdir.to_string(),
                available: self.variants_of(module).map(Variant::subdir).collect(),
            })
    }

    /// Resolve one edge of `source`, or `None` when nothing matches
    pub fn try_resolve(&self, source: &Variant, dep: &Dependency) -> Option<VariantId> {
        let candidates = self.modules.get(&dep.module)?;

        let wanted = |axis: &str| -> String {
            if let Some(value) = dep.pinned.get(axis) {
                return value.to_string();
            }
            if axis == LINK_AXIS {
                if let Some(link) = dep.tag.link_variation() {
                    return link.to_string();
                }
            }
            source
                .dependency_variations
                .get(axis)
                .or_else(|| source.variations.get(axis))
                .or_else(|| self.axis_default(axis))
                .unwrap_or_default()
                .to_string()
        };

        let found = candidates.iter().copied().find(|id| {
            self.variant(*id).is_some_and(|candidate| {
                candidate
                    .variations
                    .iter()
                    .all(|v| v.value == wanted(&v.axis))
            })
        });

        trace!(
            source = %source.display_name(),
            target = %dep.module,
            tag = %dep.tag,
            resolved = ?found,
            "resolve edge"
        );
        found
    }

    /// Resolve one edge of `source`
    pub fn resolve(&self, source: &Variant, dep: &Dependency) -> BuildResult<VariantId> {
        if !self.contains_module(&dep.module) {
            return Err(BuildError::ModuleNotFound {
                module: format!("{} (required by {})", dep.module, source.display_name()),
            });
        }
        self.try_resolve(source, dep).ok_or_else(|| {
            let available: Vec<String> = self.variants_of(&dep.module).map(Variant::subdir).collect();
            BuildError::resolution(format!(
                "{} depends on {} ({}) but no variant matches, available: [{}]",
                source.display_name(),
                dep.module,
                dep.tag,
                available.join(", ")
            ))
        })
    }

    /// Resolved direct dependencies of `id` with a tag in `tags`, in edge order
    pub fn direct_deps(
        &self,
        id: VariantId,
        tags: &[DependencyTag],
    ) -> BuildResult<Vec<(DependencyTag, VariantId)>> {
        let source = self.expect_variant(id)?;
        source
            .deps
            .iter()
            .filter(|d| tags.contains(&d.tag))
            .map(|d| self.resolve(source, d).map(|target| (d.tag, target)))
            .collect()
    }

    /// Walk the dependencies of `start` across `tags`, dependents first
    ///
    /// `visit` is called once per reached variant (never for `start`); the walk
    /// only descends into a variant when `visit` returns true. Edges that do
    /// not resolve are skipped.
    pub fn walk_deps<F>(&self, start: VariantId, tags: &[DependencyTag], mut visit: F)
    where
        F: FnMut(&Variant) -> bool,
    {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            let Some(source) = self.variant(id) else {
                continue;
            };
            let mut next = Vec::new();
            for dep in source.deps.iter().filter(|d| tags.contains(&d.tag)) {
                let Some(target) = self.try_resolve(source, dep) else {
                    continue;
                };
                if !visited.insert(target) {
                    continue;
                }
                if let Some(variant) = self.variant(target) {
                    if visit(variant) {
                        next.push(target);
                    }
                }
            }
            // Preserve edge order on the stack
            stack.extend(next.into_iter().rev());
        }
    }

    /// Static link order of `id` over the static and static-export edges
    pub fn static_link_order(&self, id: VariantId) -> BuildResult<LinkOrder> {
        const TAGS: [DependencyTag; 2] = [DependencyTag::StaticLib, DependencyTag::StaticExport];

        let direct: Vec<VariantId> = self
            .direct_deps(id, &TAGS)?
            .into_iter()
            .map(|(_, target)| target)
            .collect();

        let mut deps_by_node: HashMap<VariantId, Vec<VariantId>> = HashMap::new();
        let mut pending = direct.clone();
        while let Some(node) = pending.pop() {
            if deps_by_node.contains_key(&node) {
                continue;
            }
            let deps: Vec<VariantId> = self
                .direct_deps(node, &TAGS)?
                .into_iter()
                .map(|(_, target)| target)
                .collect();
            pending.extend(deps.iter().copied());
            deps_by_node.insert(node, deps);
        }

        let transitive = transitive_orders(&direct, &deps_by_node);
        let OrderedDeps { all, declared } = order_deps(&direct, &transitive);
        Ok(LinkOrder { all, declared })
    }

    /// Replace a live variant with an updated copy of itself
    pub(crate) fn replace(&mut self, variant: Variant) -> BuildResult<()> {
        let id = variant.id;
        let slot = self
            .variant_mut(id)
            .ok_or_else(|| BuildError::resolution(format!("variant {} is not live", id)))?;
        *slot = variant;
        Ok(())
    }

    /// Replace variant `id` by `clones`, all split on `axis`
    ///
    /// Clones take the original's position in the module's variant list, in
    /// order. The first clone's value becomes the axis default if the axis is
    /// new.
    pub(crate) fn split(
        &mut self,
        id: VariantId,
        axis: &str,
        clones: Vec<Variant>,
    ) -> BuildResult<Vec<VariantId>> {
        let original = self.expect_variant(id)?;
        let module = original.module.clone();

        let mut seen: Vec<&Variations> = self
            .variants_of(&module)
            .filter(|v| v.id != id)
            .map(|v| &v.variations)
            .collect();
        for clone in &clones {
            if clone.module != module {
                return Err(BuildError::invalid_variation(
                    axis,
                    format!("clone of {} renamed to {}", module, clone.module),
                ));
            }
            if seen.contains(&&clone.variations) {
                return Err(BuildError::DuplicateVariation {
                    module: module.clone(),
                    variant: clone.subdir(),
                });
            }
            seen.push(&clone.variations);
        }

        if let Some(first) = clones.first().and_then(|c| c.variations.get(axis)) {
            self.axis_defaults
                .entry(axis.to_string())
                .or_insert_with(|| first.to_string());
        }

        let mut ids = Vec::with_capacity(clones.len());
        for mut clone in clones {
            let new_id = VariantId(self.variants.len());
            clone.id = new_id;
            trace!(variant = %clone.display_name(), "create variant");
            self.variants.push(Some(clone));
            ids.push(new_id);
        }

        self.variants[id.0] = None;
        if let Some(list) = self.modules.get_mut(&module) {
            if let Some(pos) = list.iter().position(|v| *v == id) {
                list.remove(pos);
                for (offset, new_id) in ids.iter().enumerate() {
                    list.insert(pos + offset, *new_id);
                }
            }
        }

        Ok(ids)
    }

    /// Check every edge names a known module and resolves to a variant
    pub fn validate(&self) -> BuildResult<()> {
        for variant in self.live_variants() {
            for dep in &variant.deps {
                self.resolve(variant, dep)?;
            }
        }
        Ok(())
    }

    /// Serializable view of the whole graph with resolved edges
    pub fn snapshot(&self) -> GraphSnapshot {
        let modules = self
            .modules
            .keys()
            .map(|name| ModuleSnapshot {
                name: name.clone(),
                variants: self
                    .variants_of(name)
                    .map(|v| VariantSnapshot {
                        subdir: v.subdir(),
                        kind: v.kind,
                        variations: v.variations.clone(),
                        dependency_variations: v.dependency_variations.clone(),
                        props: v.props.clone(),
                        deps: v
                            .deps
                            .iter()
                            .map(|d| EdgeSnapshot {
                                tag: d.tag,
                                module: d.module.clone(),
                                target: self
                                    .try_resolve(v, d)
                                    .and_then(|t| self.variant(t))
                                    .map(Variant::subdir),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        GraphSnapshot { modules }
    }

    /// SHA-256 over the serialized snapshot
    pub fn fingerprint(&self) -> BuildResult<String> {
        let bytes = serde_json::to_vec(&self.snapshot())
            .map_err(|e| BuildError::resolution(format!("cannot serialize graph: {}", e)))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Serializable view of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub modules: Vec<ModuleSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSnapshot {
    pub name: String,
    pub variants: Vec<VariantSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub subdir: String,
    pub kind: ModuleKind,
    pub variations: Variations,
    pub dependency_variations: Variations,
    pub props: ModuleProperties,
    pub deps: Vec<EdgeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub tag: DependencyTag,
    pub module: String,
    /// Selector string of the resolved target, `None` if unresolved
    pub target: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clone_with(graph: &VariantGraph, id: VariantId, axis: &str, value: &str) -> Variant {
        let mut v = graph.variant(id).unwrap().clone();
        v.variations.set(axis, value);
        v
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let result = VariantGraph::from_modules([ModuleDecl::library("a"), ModuleDecl::library("a")]);
        assert!(matches!(result, Err(BuildError::DuplicateModule { .. })));
    }

    #[test]
    fn test_split_keeps_inbound_edges() {
        let mut graph = VariantGraph::from_modules([
            ModuleDecl::binary("bin").static_libs(["liba"]),
            ModuleDecl::library("liba"),
        ])
        .unwrap();
        let liba = graph.find_variant("liba", "").unwrap().id();
        let clones = vec![
            clone_with(&graph, liba, "feature", "off"),
            clone_with(&graph, liba, "feature", "on"),
        ];
        let ids = graph.split(liba, "feature", clones).unwrap();

        assert_eq!(graph.variants_of("liba").count(), 2);
        assert_eq!(graph.axis_default("feature"), Some("off"));

        // Unsplit source falls back to the axis default
        let bin = graph.find_variant("bin", "").unwrap().id();
        assert_eq!(
            graph.direct_deps(bin, &[DependencyTag::StaticLib]).unwrap(),
            vec![(DependencyTag::StaticLib, ids[0])]
        );

        // A pinned source reaches the other clone through the same edge
        let mut pinned = graph.variant(bin).unwrap().clone();
        pinned.dependency_variations.set("feature", "on");
        graph.replace(pinned).unwrap();
        assert_eq!(
            graph.direct_deps(bin, &[DependencyTag::StaticLib]).unwrap(),
            vec![(DependencyTag::StaticLib, ids[1])]
        );
    }

    #[test]
    fn test_split_rejects_duplicate_selectors() {
        let mut graph = VariantGraph::from_modules([ModuleDecl::library("a")]).unwrap();
        let id = graph.find_variant("a", "").unwrap().id();
        let clones = vec![
            clone_with(&graph, id, "x", "same"),
            clone_with(&graph, id, "x", "same"),
        ];
        assert!(matches!(
            graph.split(id, "x", clones),
            Err(BuildError::DuplicateVariation { .. })
        ));
    }

    #[test]
    fn test_validate_unknown_module() {
        let graph =
            VariantGraph::from_modules([ModuleDecl::binary("bin").shared_libs(["libmissing"])])
                .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, BuildError::ModuleNotFound { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn test_link_axis_follows_tag() {
        let mut graph = VariantGraph::from_modules([
            ModuleDecl::binary("bin")
                .static_libs(["liba"])
                .shared_libs(["liba"]),
            ModuleDecl::library("liba"),
        ])
        .unwrap();
        let liba = graph.find_variant("liba", "").unwrap().id();
        let clones = vec![
            clone_with(&graph, liba, LINK_AXIS, "static"),
            clone_with(&graph, liba, LINK_AXIS, "shared"),
        ];
        let ids = graph.split(liba, LINK_AXIS, clones).unwrap();

        let bin = graph.find_variant("bin", "").unwrap().id();
        let deps = graph
            .direct_deps(bin, &[DependencyTag::StaticLib, DependencyTag::SharedLib])
            .unwrap();
        assert_eq!(
            deps,
            vec![
                (DependencyTag::StaticLib, ids[0]),
                (DependencyTag::SharedLib, ids[1]),
            ]
        );
    }

    #[test]
    fn test_walk_visits_once_and_respects_tags() {
        let graph = VariantGraph::from_modules([
            ModuleDecl::binary("bin")
                .static_libs(["a", "b"])
                .shared_libs(["libc"]),
            ModuleDecl::library("a").static_libs(["c"]),
            ModuleDecl::library("b").static_libs(["c"]),
            ModuleDecl::library("c").static_libs(["a"]),
            ModuleDecl::library("libc"),
        ])
        .unwrap();
        let bin = graph.find_variant("bin", "").unwrap().id();

        let mut seen = Vec::new();
        graph.walk_deps(bin, &DependencyTag::STATIC_FAMILY, |v| {
            seen.push(v.module.clone());
            true
        });
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_find_variant_lists_available() {
        let graph = VariantGraph::from_modules([ModuleDecl::library("a")]).unwrap();
        match graph.find_variant("a", "static") {
            Err(BuildError::VariantNotFound { available, .. }) => {
                assert_eq!(available, vec![String::new()])
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            graph.find_variant("zz", ""),
            Err(BuildError::ModuleNotFound { .. })
        ));
    }

    #[test]
    fn test_fingerprint_stable() {
        let build = || {
            VariantGraph::from_modules([
                ModuleDecl::binary("bin").static_libs(["a"]),
                ModuleDecl::library("a"),
            ])
            .unwrap()
        };
        assert_eq!(build().fingerprint().unwrap(), build().fingerprint().unwrap());
    }
}
