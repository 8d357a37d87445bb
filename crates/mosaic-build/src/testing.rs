//! Lookups for tests over a finished build
//!
//! Every lookup here panics with a listing of what does exist when nothing
//! matches; use the `BuildResult` counterparts on [`VariantGraph`] and
//! [`ActionSet`] outside of tests.

use crate::actions::{ActionSet, BuildAction};
use crate::builder::{build_from_modules, BuildContext};
use crate::config::BuildConfig;
use crate::error::BuildResult;
use crate::graph::{Variant, VariantGraph};
use crate::module::ModuleDecl;
use std::path::Path;

/// A build over in-memory declarations with every built-in pass registered
#[derive(Debug)]
pub struct TestContext {
    pub config: BuildConfig,
    pub build: BuildContext,
}

impl TestContext {
    /// Build `decls` with the default configuration, panicking on failure
    pub fn new(decls: impl IntoIterator<Item = ModuleDecl>) -> Self {
        Self::with_config(decls, BuildConfig::default())
    }

    /// Build `decls` with `config`, panicking on failure
    pub fn with_config(decls: impl IntoIterator<Item = ModuleDecl>, config: BuildConfig) -> Self {
        match Self::try_build(decls, config) {
            Ok(ctx) => ctx,
            Err(e) => panic!("build failed: {}", e),
        }
    }

    pub fn try_build(
        decls: impl IntoIterator<Item = ModuleDecl>,
        config: BuildConfig,
    ) -> BuildResult<Self> {
        let build = build_from_modules(decls, &config)?;
        Ok(Self { config, build })
    }

    pub fn graph(&self) -> &VariantGraph {
        &self.build.graph
    }

    /// The variant of `name` whose selector string is `variant`
    pub fn module_for_tests(&self, name: &str, variant: &str) -> TestingModule<'_> {
        match self.build.graph.find_variant(name, variant) {
            Ok(found) => TestingModule {
                graph: &self.build.graph,
                variant: found,
                actions: self.build.actions.for_variant(name, variant),
            },
            Err(_) => {
                let all: Vec<String> = self
                    .build
                    .graph
                    .live_variants()
                    .map(|v| format!("{}({})", v.module, v.subdir()))
                    .collect();
                panic!(
                    "no module {}({}), modules are:\n  {}",
                    name,
                    variant,
                    all.join("\n  ")
                );
            }
        }
    }

    /// Legacy metadata lines of one variant
    pub fn metadata(&self, name: &str, variant: &str) -> &[(String, String)] {
        let key = self.module_for_tests(name, variant).variant.display_name();
        self.build
            .metadata
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// One variant and the actions generated for it
#[derive(Debug)]
pub struct TestingModule<'a> {
    graph: &'a VariantGraph,
    pub variant: &'a Variant,
    pub actions: ActionSet,
}

impl TestingModule<'_> {
    /// The action whose rule name contains `rule`
    pub fn rule(&self, rule: &str) -> &BuildAction {
        self.actions.find_by_rule(rule).unwrap_or_else(|e| self.fail(e))
    }

    /// The action with exactly this description
    pub fn description(&self, description: &str) -> &BuildAction {
        self.actions
            .find_by_description(description)
            .unwrap_or_else(|e| self.fail(e))
    }

    /// The action producing `output`
    pub fn output(&self, output: impl AsRef<Path>) -> &BuildAction {
        self.actions
            .find_by_output(output)
            .unwrap_or_else(|e| self.fail(e))
    }

    /// Module names of the declared static dependencies, in link order
    pub fn declared_link_order(&self) -> Vec<String> {
        self.link_order(false)
    }

    /// Module names of every transitive static dependency, in link order
    pub fn full_link_order(&self) -> Vec<String> {
        self.link_order(true)
    }

    fn link_order(&self, all: bool) -> Vec<String> {
        let order = self
            .graph
            .static_link_order(self.variant.id())
            .unwrap_or_else(|e| self.fail(e));
        let ids = if all { order.all } else { order.declared };
        ids.into_iter()
            .filter_map(|id| self.graph.variant(id))
            .map(|v| v.module.clone())
            .collect()
    }

    fn fail(&self, error: impl std::fmt::Display) -> ! {
        panic!("{}: {}", self.variant.display_name(), error)
    }
}
