//! Mosaic build graph engine
//!
//! Turns declared modules into a resolved graph of configuration variants and
//! the build actions derived from it:
//! - Variant graph store with selector-based edge resolution
//! - Mutator pipeline (three epochs, bottom-up and top-down passes, parallel levels)
//! - Built-in passes: defaults, arch, image, link and propagated features
//! - Static link ordering and size-bounded command batching
//! - Action generation, legacy metadata and test lookups
//!
//! # Example
//!
//! ```no_run
//! use mosaic_build::Builder;
//!
//! let builder = Builder::new(".").unwrap();
//! let build = builder.build().unwrap();
//! println!("{} variants", build.stats.total_variants);
//! ```

pub mod actions;
pub mod batch;
pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod link_order;
pub mod module;
pub mod passes;
pub mod pipeline;
pub mod properties;
pub mod tag;
pub mod testing;
pub mod variation;

// Re-export main types
pub use actions::{generate_actions, ActionSet, BuildAction};
pub use batch::{split_for_size, SizedItem};
pub use builder::{build_from_modules, BuildContext, BuildStats, Builder, Metadata};
pub use config::{Arch, BuildConfig, FeatureSettings};
pub use error::{BuildError, BuildResult, ModuleError};
pub use graph::{GraphSnapshot, LinkOrder, Variant, VariantGraph, VariantId};
pub use link_order::{order_deps, transitive_orders, OrderedDeps};
pub use module::{Dependency, ModuleDecl, ModuleKind};
pub use pipeline::{
    BottomUpContext, Direction, Epoch, MetadataHook, Pass, Pipeline, PipelineReport, Registry,
    TopDownContext,
};
pub use properties::{Capability, FeatureState, LtoMode, ModuleProperties};
pub use tag::DependencyTag;
pub use variation::{Variation, Variations};
