use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// Mosaic configuration-variant build graph.
///
/// Reads mosaic.toml and every modules.toml under the project root, splits
/// modules into configuration variants and derives the build actions.
///
/// EXAMPLES:
///     mosaic build                        Resolve the graph and print a summary
///     mosaic build --json                 Summary as JSON
///     mosaic variants libz                List the variants of one module
///     mosaic link-order bin android_arm64_armv8-a_core
///     mosaic metadata                     Print legacy metadata lines
///
/// ENVIRONMENT VARIABLES:
///     MOSAIC_LOG        Log filter (default: warn)
///     MOSAIC_JSON       Set to 'true' for JSON output by default
#[derive(Parser)]
#[command(name = "mosaic")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(long, short = 'C', global = true, default_value = ".")]
    dir: PathBuf,

    /// Run every pass serially
    #[arg(long, global = true)]
    serial: bool,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the variant graph and generate actions
    ///
    /// EXAMPLES:
    ///     mosaic build                Print a summary
    ///     mosaic build --json         Summary as JSON
    ///     mosaic build --actions      Every generated action as JSON
    #[command(visible_alias = "b")]
    Build {
        /// JSON output
        #[arg(long, env = "MOSAIC_JSON")]
        json: bool,
        /// Print the generated actions as JSON instead of a summary
        #[arg(long)]
        actions: bool,
    },

    /// List modules and their variants
    Variants {
        /// Only this module
        module: Option<String>,
    },

    /// Print the static link order of one variant
    ///
    /// EXAMPLES:
    ///     mosaic link-order bin android_arm64_armv8-a_core
    ///     mosaic link-order bin android_arm64_armv8-a_core --all
    LinkOrder {
        module: String,
        /// Variation subdirectory, e.g. android_arm64_armv8-a_core_shared
        variant: String,
        /// Include transitive dependencies
        #[arg(long)]
        all: bool,
    },

    /// Print legacy metadata lines of every variant
    Metadata {
        /// Only this module
        module: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("MOSAIC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project = commands::Project {
        dir: cli.dir,
        serial: cli.serial,
    };

    match cli.command {
        Commands::Build { json, actions } => commands::build::run(&project, json, actions),
        Commands::Variants { module } => commands::variants::run(&project, module.as_deref()),
        Commands::LinkOrder {
            module,
            variant,
            all,
        } => commands::link_order::run(&project, &module, &variant, all),
        Commands::Metadata { module } => commands::metadata::run(&project, module.as_deref()),
    }
}
