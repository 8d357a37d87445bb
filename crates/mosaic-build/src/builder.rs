//! Build orchestration
//!
//! Loads configuration, discovers module declarations, runs the pass pipeline
//! over the variant graph and derives actions and legacy metadata from the
//! result.

use crate::actions::{generate_actions, ActionSet};
use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::graph::VariantGraph;
use crate::module::ModuleDecl;
use crate::passes::register_builtin;
use crate::pipeline::{Pipeline, PipelineReport};
use indexmap::IndexMap;
use mosaic_config::{Config, ConfigLoader, ModuleManifest};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the module declaration files searched under the project root
pub const MODULES_FILE: &str = "modules.toml";

/// Legacy metadata lines keyed by `module(variant)`
pub type Metadata = IndexMap<String, Vec<(String, String)>>;

/// Result of a successful build
#[derive(Debug)]
pub struct BuildContext {
    pub graph: VariantGraph,
    pub actions: ActionSet,
    pub report: PipelineReport,
    pub metadata: Metadata,
    pub stats: BuildStats,
    /// SHA-256 of the final graph snapshot
    pub fingerprint: String,
}

/// Build statistics
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Number of declared modules
    pub total_modules: usize,
    /// Number of live variants after the pipeline
    pub total_variants: usize,
    pub passes_run: usize,
    pub actions: usize,
    pub total_time: Duration,
    pub pipeline_time: Duration,
    pub action_time: Duration,
}

/// Main builder for a project directory
pub struct Builder {
    /// Project root directory
    root_dir: PathBuf,
    config: BuildConfig,
}

impl Builder {
    /// Create a builder for the project containing `project_path`
    pub fn new(project_path: impl AsRef<Path>) -> BuildResult<Self> {
        let config = ConfigLoader::new().load_from_directory(project_path.as_ref())?;
        Self::from_config(project_path, &config)
    }

    /// Create a builder from an already loaded configuration
    pub fn from_config(project_path: impl AsRef<Path>, config: &Config) -> BuildResult<Self> {
        let root_dir = config
            .project_root()
            .unwrap_or_else(|| project_path.as_ref())
            .to_path_buf();
        Ok(Self {
            root_dir,
            config: BuildConfig::from_config(config)?,
        })
    }

    /// Enable/disable parallel passes
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Execute the build
    pub fn build(&self) -> BuildResult<BuildContext> {
        let files = self.discover_module_files()?;
        debug!(root = %self.root_dir.display(), files = files.len(), "discovered module files");

        let mut decls = Vec::new();
        for file in &files {
            let manifest = ModuleManifest::load_from_file(file)?;
            decls.extend(manifest.modules.into_iter().map(ModuleDecl::from));
        }

        build_from_modules(decls, &self.config)
    }

    /// Find every module declaration file under the project root, sorted by path
    ///
    /// Hidden directories and the output directory are skipped. A directory
    /// that cannot be read fails discovery.
    fn discover_module_files(&self) -> BuildResult<Vec<PathBuf>> {
        let out_dir = &self.config.out_dir;
        let walker = WalkDir::new(&self.root_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let hidden = e.depth() > 0 && e.file_name().to_string_lossy().starts_with('.');
                !hidden && e.path() != out_dir.as_path()
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(self.root_dir.as_path()).to_path_buf();
                let message = err.to_string();
                let error = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(message));
                BuildError::io(path, error)
            })?;
            if entry.file_type().is_file() && entry.file_name() == MODULES_FILE {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Run the whole build over already parsed declarations
pub fn build_from_modules(
    decls: impl IntoIterator<Item = ModuleDecl>,
    config: &BuildConfig,
) -> BuildResult<BuildContext> {
    let build_start = Instant::now();

    let mut graph = VariantGraph::new();
    for decl in decls {
        for feature in decl.props.features.keys() {
            if config.feature(feature).is_none() {
                warn!(module = %decl.name, feature = %feature, "feature is not configured for this build, ignoring");
            }
        }
        graph.add_module(decl)?;
    }
    let total_modules = graph.module_names().count();
    if total_modules == 0 {
        return Err(BuildError::resolution("no modules declared"));
    }

    let mut pipeline = Pipeline::new();
    register_builtin(&mut pipeline, config);

    let pipeline_start = Instant::now();
    let report = pipeline.run(&mut graph, config)?;
    let pipeline_time = pipeline_start.elapsed();

    let action_start = Instant::now();
    let actions = generate_actions(&graph, config)?;
    let action_time = action_start.elapsed();

    let metadata = pipeline.legacy_metadata(&graph);
    let fingerprint = graph.fingerprint()?;

    let stats = BuildStats {
        total_modules,
        total_variants: graph.len(),
        passes_run: report.passes_run.len(),
        actions: actions.len(),
        total_time: build_start.elapsed(),
        pipeline_time,
        action_time,
    };
    info!(
        modules = stats.total_modules,
        variants = stats.total_variants,
        actions = stats.actions,
        elapsed_ms = stats.total_time.as_millis() as u64,
        "build graph complete"
    );

    Ok(BuildContext {
        graph,
        actions,
        report,
        metadata,
        stats,
        fingerprint,
    })
}
