//! Mutator pipeline
//!
//! Passes are registered per epoch and run in registration order. A
//! bottom-up pass visits a variant only after every variant it depends on; a
//! top-down pass visits dependents first. Variants are planned into levels
//! (like build groups: nothing in a level depends on anything in the same or a
//! later level), and each level is a barrier.
//!
//! Callbacks never touch the graph directly. Each one works on a private copy
//! of its variant and hands back an outcome: the updated variant, an optional
//! split, deferred updates to other variants, module errors and registry
//! records. Outcomes of a level are committed serially, in level order, once
//! every callback of the level has returned, so a parallel level produces the
//! same graph as a serial one.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult, ModuleError};
use crate::graph::{Variant, VariantGraph, VariantId};
use crate::module::{Dependency, ModuleKind};
use crate::properties::ModuleProperties;
use crate::tag::DependencyTag;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, trace};

/// Pipeline epochs, run in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Epoch {
    /// Before architecture variants exist
    PreArch,
    /// Variants are being created; edges may not resolve yet
    PreDeps,
    /// The graph has been validated; every edge resolves
    PostDeps,
}

impl Epoch {
    pub const ALL: [Epoch; 3] = [Epoch::PreArch, Epoch::PreDeps, Epoch::PostDeps];
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Epoch::PreArch => "pre-arch",
            Epoch::PreDeps => "pre-deps",
            Epoch::PostDeps => "post-deps",
        };
        f.write_str(s)
    }
}

/// Order in which a pass visits variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents
    BottomUp,
    /// Dependents before dependencies
    TopDown,
}

type BottomUpFn = Box<dyn Fn(&mut BottomUpContext<'_>) + Send + Sync>;
type TopDownFn = Box<dyn Fn(&mut TopDownContext<'_>) + Send + Sync>;
type PropertyUpdate = Box<dyn FnOnce(&mut ModuleProperties) + Send>;

enum Callback {
    BottomUp(BottomUpFn),
    TopDown(TopDownFn),
}

/// A registered pass
pub struct Pass {
    name: String,
    epoch: Epoch,
    callback: Callback,
    parallel: bool,
}

impl Pass {
    /// Allow the pass to run the variants of one level on worker threads
    pub fn parallel(&mut self) -> &mut Self {
        self.parallel = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn direction(&self) -> Direction {
        match self.callback {
            Callback::BottomUp(_) => Direction::BottomUp,
            Callback::TopDown(_) => Direction::TopDown,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.name)
            .field("epoch", &self.epoch)
            .field("direction", &self.direction())
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// Emits legacy key/value metadata for a variant after all mutation
pub trait MetadataHook: Send + Sync {
    fn metadata(&self, variant: &Variant) -> Vec<(String, String)>;
}

impl<F> MetadataHook for F
where
    F: Fn(&Variant) -> Vec<(String, String)> + Send + Sync,
{
    fn metadata(&self, variant: &Variant) -> Vec<(String, String)> {
        self(variant)
    }
}

/// Cross-module accumulator, one set of records per pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Registry {
    /// Records of one pass, sorted
    pub fn entries(&self, pass: &str) -> Vec<&str> {
        self.entries
            .get(pass)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, pass: &str, record: &str) -> bool {
        self.entries
            .get(pass)
            .is_some_and(|set| set.contains(record))
    }

    pub fn passes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn extend(&mut self, pass: &str, records: Vec<String>) {
        if records.is_empty() {
            return;
        }
        self.entries
            .entry(pass.to_string())
            .or_default()
            .extend(records);
    }
}

/// Result of a successful pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub registry: Registry,
    /// Names of the passes that ran, in order
    pub passes_run: Vec<String>,
}

/// What a callback hands back for commit
struct Outcome {
    id: VariantId,
    variant: Variant,
    clones: Option<Vec<Variant>>,
    updates: Vec<(VariantId, PropertyUpdate)>,
    errors: Vec<ModuleError>,
    records: Vec<String>,
    fatal: Option<BuildError>,
}

/// State shared by both context kinds
struct Scratch<'a> {
    pass: &'a str,
    config: &'a BuildConfig,
    graph: &'a VariantGraph,
    variant: Variant,
    errors: Vec<ModuleError>,
    records: Vec<String>,
    fatal: Option<BuildError>,
}

impl<'a> Scratch<'a> {
    fn new(pass: &'a str, config: &'a BuildConfig, graph: &'a VariantGraph, variant: Variant) -> Self {
        Self {
            pass,
            config,
            graph,
            variant,
            errors: Vec::new(),
            records: Vec::new(),
            fatal: None,
        }
    }

    fn error(&mut self, property: Option<&str>, message: String) {
        self.errors.push(ModuleError {
            module: self.variant.module.clone(),
            variant: self.variant.subdir(),
            pass: self.pass.to_string(),
            property: property.map(str::to_string),
            message,
        });
    }

    fn fail(&mut self, error: BuildError) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    fn into_outcome(
        self,
        clones: Option<Vec<Variant>>,
        updates: Vec<(VariantId, PropertyUpdate)>,
    ) -> Outcome {
        Outcome {
            id: self.variant.id(),
            variant: self.variant,
            clones,
            updates,
            errors: self.errors,
            records: self.records,
            fatal: self.fatal,
        }
    }
}

/// Context of a bottom-up callback
pub struct BottomUpContext<'a> {
    scratch: Scratch<'a>,
    clones: Option<Vec<Variant>>,
}

impl<'a> BottomUpContext<'a> {
    pub fn config(&self) -> &'a BuildConfig {
        self.scratch.config
    }

    /// Read-only view of the graph as of the start of this level
    pub fn graph(&self) -> &'a VariantGraph {
        self.scratch.graph
    }

    pub fn pass_name(&self) -> &str {
        self.scratch.pass
    }

    pub fn module_name(&self) -> &str {
        &self.scratch.variant.module
    }

    pub fn kind(&self) -> ModuleKind {
        self.scratch.variant.kind
    }

    pub fn variant(&self) -> &Variant {
        &self.scratch.variant
    }

    pub fn props(&self) -> &ModuleProperties {
        &self.scratch.variant.props
    }

    /// Properties of the variant; after a split, mutate the clones instead
    pub fn props_mut(&mut self) -> &mut ModuleProperties {
        &mut self.scratch.variant.props
    }

    /// Resolved direct dependencies with a tag in `tags`; unresolvable edges are skipped
    pub fn direct_deps(&self, tags: &[DependencyTag]) -> Vec<(DependencyTag, &'a Variant)> {
        let graph = self.scratch.graph;
        self.scratch
            .variant
            .deps
            .iter()
            .filter(|d| tags.contains(&d.tag))
            .filter_map(|d| {
                graph
                    .try_resolve(&self.scratch.variant, d)
                    .and_then(|id| graph.variant(id))
                    .map(|v| (d.tag, v))
            })
            .collect()
    }

    /// Replace this variant by one deep copy per name, split on the pass' axis
    ///
    /// Clones are returned in `names` order. Inbound edges reach every clone.
    /// A pass may split a variant at most once.
    pub fn create_variations(&mut self, names: &[&str]) -> &mut [Variant] {
        let axis = self.scratch.pass.to_string();

        if self.clones.is_some() {
            self.scratch.fail(BuildError::invalid_variation(
                &axis,
                format!("{} split twice", self.scratch.variant.display_name()),
            ));
            return &mut [];
        }
        if names.is_empty() {
            self.scratch.fail(BuildError::invalid_variation(
                &axis,
                format!("{} split into no variants", self.scratch.variant.display_name()),
            ));
            return &mut [];
        }
        if self.scratch.variant.variations.contains_axis(&axis) {
            self.scratch.fail(BuildError::invalid_variation(
                &axis,
                format!(
                    "{} already carries the '{}' axis",
                    self.scratch.variant.display_name(),
                    axis
                ),
            ));
            return &mut [];
        }
        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(**n)) {
            self.scratch.fail(BuildError::DuplicateVariation {
                module: self.scratch.variant.module.clone(),
                variant: dup.to_string(),
            });
            return &mut [];
        }

        let clones: Vec<Variant> = names
            .iter()
            .map(|name| {
                let mut clone = self.scratch.variant.clone();
                clone.variations.set(axis.clone(), *name);
                clone
            })
            .collect();
        trace!(
            variant = %self.scratch.variant.display_name(),
            axis = %axis,
            count = clones.len(),
            "split variant"
        );
        self.clones.insert(clones).as_mut_slice()
    }

    /// Clones created by [`BottomUpContext::create_variations`], if any
    pub fn clones_mut(&mut self) -> Option<&mut [Variant]> {
        self.clones.as_deref_mut()
    }

    /// Force `axis` to `value` on every outgoing edge of this variant
    pub fn set_dependency_variation(&mut self, axis: &str, value: &str) {
        for variant in self.targets_mut() {
            variant.dependency_variations.set(axis, value);
        }
    }

    /// Add an outgoing edge
    pub fn add_dependency(&mut self, tag: DependencyTag, module: &str) {
        self.add_dependency_edge(Dependency::new(tag, module));
    }

    /// Add an outgoing edge with pinned variations
    pub fn add_dependency_edge(&mut self, dep: Dependency) {
        for variant in self.targets_mut() {
            variant.deps.push(dep.clone());
        }
    }

    fn targets_mut(&mut self) -> Vec<&mut Variant> {
        match self.clones.as_mut() {
            Some(clones) => clones.iter_mut().collect(),
            None => vec![&mut self.scratch.variant],
        }
    }

    /// Report a configuration error against this module
    pub fn module_error(&mut self, message: impl Into<String>) {
        self.scratch.error(None, message.into());
    }

    /// Report a configuration error against one property of this module
    pub fn property_error(&mut self, property: &str, message: impl Into<String>) {
        self.scratch.error(Some(property), message.into());
    }

    /// Add a record to this pass' registry
    pub fn record(&mut self, record: impl Into<String>) {
        self.scratch.records.push(record.into());
    }

    fn into_outcome(self) -> Outcome {
        self.scratch.into_outcome(self.clones, Vec::new())
    }
}

/// Context of a top-down callback
pub struct TopDownContext<'a> {
    scratch: Scratch<'a>,
    updates: Vec<(VariantId, PropertyUpdate)>,
}

impl<'a> TopDownContext<'a> {
    pub fn config(&self) -> &'a BuildConfig {
        self.scratch.config
    }

    pub fn graph(&self) -> &'a VariantGraph {
        self.scratch.graph
    }

    pub fn pass_name(&self) -> &str {
        self.scratch.pass
    }

    pub fn module_name(&self) -> &str {
        &self.scratch.variant.module
    }

    pub fn kind(&self) -> ModuleKind {
        self.scratch.variant.kind
    }

    pub fn variant(&self) -> &Variant {
        &self.scratch.variant
    }

    pub fn props(&self) -> &ModuleProperties {
        &self.scratch.variant.props
    }

    pub fn props_mut(&mut self) -> &mut ModuleProperties {
        &mut self.scratch.variant.props
    }

    /// Walk this variant's dependencies across `tags`, each at most once
    ///
    /// The walk descends into a dependency only when `visit` returns true.
    pub fn walk_deps<F>(&self, tags: &[DependencyTag], visit: F)
    where
        F: FnMut(&Variant) -> bool,
    {
        self.scratch
            .graph
            .walk_deps(self.scratch.variant.id(), tags, visit);
    }

    /// Queue a property update on another variant, applied at the level barrier
    pub fn update<F>(&mut self, target: VariantId, f: F)
    where
        F: FnOnce(&mut ModuleProperties) + Send + 'static,
    {
        self.updates.push((target, Box::new(f)));
    }

    pub fn module_error(&mut self, message: impl Into<String>) {
        self.scratch.error(None, message.into());
    }

    pub fn property_error(&mut self, property: &str, message: impl Into<String>) {
        self.scratch.error(Some(property), message.into());
    }

    pub fn record(&mut self, record: impl Into<String>) {
        self.scratch.records.push(record.into());
    }

    fn into_outcome(self) -> Outcome {
        self.scratch.into_outcome(None, self.updates)
    }
}

/// Ordered set of passes plus metadata hooks
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Pass>,
    hooks: Vec<Box<dyn MetadataHook>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bottom-up pass; its name doubles as the axis it splits on
    pub fn register_bottom_up<F>(&mut self, epoch: Epoch, name: &str, f: F) -> &mut Pass
    where
        F: Fn(&mut BottomUpContext<'_>) + Send + Sync + 'static,
    {
        self.push(epoch, name, Callback::BottomUp(Box::new(f)))
    }

    /// Register a top-down pass
    pub fn register_top_down<F>(&mut self, epoch: Epoch, name: &str, f: F) -> &mut Pass
    where
        F: Fn(&mut TopDownContext<'_>) + Send + Sync + 'static,
    {
        self.push(epoch, name, Callback::TopDown(Box::new(f)))
    }

    fn push(&mut self, epoch: Epoch, name: &str, callback: Callback) -> &mut Pass {
        let index = self.passes.len();
        self.passes.push(Pass {
            name: name.to_string(),
            epoch,
            callback,
            parallel: false,
        });
        &mut self.passes[index]
    }

    /// Register a hook called once per live variant by [`Pipeline::legacy_metadata`]
    pub fn register_metadata_hook(&mut self, hook: impl MetadataHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Registered passes in run order
    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        Epoch::ALL
            .into_iter()
            .flat_map(move |epoch| self.passes.iter().filter(move |p| p.epoch == epoch))
    }

    /// Run every pass over `graph`
    ///
    /// Module errors of an epoch are returned together at the end of the
    /// epoch; structural errors abort after the current level drains.
    pub fn run(&self, graph: &mut VariantGraph, config: &BuildConfig) -> BuildResult<PipelineReport> {
        let mut report = PipelineReport::default();

        for epoch in Epoch::ALL {
            let mut errors = Vec::new();
            let mut failed = HashSet::new();

            for pass in self.passes.iter().filter(|p| p.epoch == epoch) {
                self.run_pass(pass, graph, config, &mut errors, &mut failed, &mut report.registry)?;
                report.passes_run.push(pass.name.clone());
            }

            if !errors.is_empty() {
                debug!(%epoch, errors = errors.len(), "epoch failed");
                return Err(BuildError::ModuleErrors(errors));
            }

            if epoch == Epoch::PreDeps {
                graph.validate()?;
            }
            debug!(%epoch, variants = graph.len(), "epoch complete");
        }

        Ok(report)
    }

    fn run_pass(
        &self,
        pass: &Pass,
        graph: &mut VariantGraph,
        config: &BuildConfig,
        errors: &mut Vec<ModuleError>,
        failed: &mut HashSet<String>,
        registry: &mut Registry,
    ) -> BuildResult<()> {
        let levels = plan_levels(graph, pass.direction())?;
        let parallel = pass.parallel && config.parallel;
        debug!(
            pass = %pass.name,
            epoch = %pass.epoch,
            levels = levels.len(),
            variants = graph.len(),
            parallel,
            "run pass"
        );

        for level in levels {
            let ids: Vec<VariantId> = level
                .into_iter()
                .filter(|id| {
                    graph
                        .variant(*id)
                        .is_some_and(|v| !failed.contains(&v.module))
                })
                .collect();

            let view: &VariantGraph = graph;
            let outcomes: Vec<Outcome> = if parallel {
                ids.par_iter()
                    .filter_map(|id| run_callback(pass, view, config, *id))
                    .collect()
            } else {
                ids.iter()
                    .filter_map(|id| run_callback(pass, view, config, *id))
                    .collect()
            };

            let mut outcomes = outcomes;
            if let Some(fatal) = outcomes.iter_mut().find_map(|o| o.fatal.take()) {
                return Err(fatal);
            }

            for outcome in outcomes {
                if !outcome.errors.is_empty() {
                    failed.insert(outcome.variant.module.clone());
                    errors.extend(outcome.errors);
                }
                registry.extend(&pass.name, outcome.records);

                match outcome.clones {
                    Some(clones) => {
                        graph.split(outcome.id, &pass.name, clones)?;
                    }
                    None => graph.replace(outcome.variant)?,
                }

                for (target, update) in outcome.updates {
                    match graph.variant_mut(target) {
                        Some(variant) => update(&mut variant.props),
                        None => trace!(%target, "dropping update for retired variant"),
                    }
                }
            }
        }

        Ok(())
    }

    /// Collect legacy metadata from every hook, keyed by `module(variant)`
    pub fn legacy_metadata(&self, graph: &VariantGraph) -> IndexMap<String, Vec<(String, String)>> {
        let mut out = IndexMap::new();
        for variant in graph.live_variants() {
            let lines: Vec<(String, String)> = self
                .hooks
                .iter()
                .flat_map(|hook| hook.metadata(variant))
                .collect();
            out.insert(variant.display_name(), lines);
        }
        out
    }
}

fn run_callback(
    pass: &Pass,
    graph: &VariantGraph,
    config: &BuildConfig,
    id: VariantId,
) -> Option<Outcome> {
    let variant = graph.variant(id)?.clone();
    let scratch = Scratch::new(&pass.name, config, graph, variant);

    let outcome = match &pass.callback {
        Callback::BottomUp(f) => {
            let mut ctx = BottomUpContext {
                scratch,
                clones: None,
            };
            f(&mut ctx);
            ctx.into_outcome()
        }
        Callback::TopDown(f) => {
            let mut ctx = TopDownContext {
                scratch,
                updates: Vec::new(),
            };
            f(&mut ctx);
            ctx.into_outcome()
        }
    };
    Some(outcome)
}

/// Group live variants into levels
///
/// Bottom-up levels put dependencies first, top-down levels dependents first.
/// Within a level variants keep graph order. Edges that do not resolve yet are
/// ignored.
fn plan_levels(graph: &VariantGraph, direction: Direction) -> BuildResult<Vec<Vec<VariantId>>> {
    let ids = graph.live_ids();
    let position: HashMap<VariantId, usize> =
        ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    // deps[i]: positions variant i depends on
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(ids.len());
    for id in &ids {
        let mut targets = Vec::new();
        if let Some(source) = graph.variant(*id) {
            for dep in &source.deps {
                if let Some(target) = graph.try_resolve(source, dep) {
                    if let Some(pos) = position.get(&target) {
                        targets.push(*pos);
                    }
                }
            }
        }
        targets.sort_unstable();
        targets.dedup();
        deps.push(targets);
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    for (i, targets) in deps.iter().enumerate() {
        for t in targets {
            dependents[*t].push(i);
        }
    }

    let mut levels = Vec::new();
    let mut current: Vec<usize> = (0..ids.len()).filter(|i| remaining[*i] == 0).collect();
    let mut placed = 0;

    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for i in &current {
            for d in &dependents[*i] {
                remaining[*d] -= 1;
                if remaining[*d] == 0 {
                    next.push(*d);
                }
            }
        }
        next.sort_unstable();
        levels.push(current.iter().map(|i| ids[*i]).collect::<Vec<_>>());
        current = next;
    }

    if placed != ids.len() {
        let stuck: Vec<usize> = (0..ids.len()).filter(|i| remaining[*i] > 0).collect();
        return Err(BuildError::CircularDependency(describe_cycle(graph, &ids, &deps, &stuck)));
    }

    if direction == Direction::TopDown {
        levels.reverse();
    }
    Ok(levels)
}

/// Name one cycle among `stuck` positions
fn describe_cycle(graph: &VariantGraph, ids: &[VariantId], deps: &[Vec<usize>], stuck: &[usize]) -> String {
    let stuck_set: HashSet<usize> = stuck.iter().copied().collect();
    let name = |i: usize| {
        graph
            .variant(ids[i])
            .map(Variant::display_name)
            .unwrap_or_else(|| ids[i].to_string())
    };

    // Every stuck node has a stuck dependency, so following them must revisit a node
    let Some(&start) = stuck.first() else {
        return "unknown cycle".to_string();
    };
    let mut path = vec![start];
    let mut seen = HashMap::new();
    seen.insert(start, 0);
    let mut node = start;
    loop {
        let Some(&next) = deps[node].iter().find(|d| stuck_set.contains(d)) else {
            return "unknown cycle".to_string();
        };
        if let Some(&at) = seen.get(&next) {
            let mut cycle: Vec<String> = path[at..].iter().map(|i| name(*i)).collect();
            cycle.push(name(next));
            return cycle.join(" -> ");
        }
        seen.insert(next, path.len());
        path.push(next);
        node = next;
    }
}
