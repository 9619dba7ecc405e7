//! knee-cli: Command-line interface for knee geometry feature extraction.
//!
//! This tool runs the knee-features pipeline over a cohort of patient
//! directories, or a single feature over one mesh file, from the command
//! line.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=knee_features=info` - Cohort loading and batch summaries
//! - `RUST_LOG=knee_features=debug` - Per-patient and per-stage detail
//! - `RUST_LOG=knee_features::timing=info` - Performance timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Add feature columns to a table for data/raw/set_2
//! knee features --set set_2 --table data/processed/set_2/clinical.csv
//!
//! # Check one cartilage mesh and keep the projection
//! knee health TIB_CART_MED.inp --save-projection med.png
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{curvature, features, gap, health, inspect};

/// knee - Geometric features from knee bone and cartilage meshes.
///
/// Extract cartilage health, curvature and femur gap features for a cohort
/// and join them onto a patient table.
#[derive(Parser)]
#[command(name = "knee")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Feature configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract features for a cohort and join them onto a table
    Features {
        /// Table with a `Code` column to add features to
        #[arg(long)]
        table: PathBuf,

        /// Root of the data directory tree
        #[arg(long, default_value = "data")]
        data_root: PathBuf,

        /// Data set name, reads `<data-root>/raw/<set>`
        #[arg(long, default_value = "set_1")]
        set: String,

        /// Cohort directory, overrides `--data-root`/`--set`
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Output CSV [default: <data-root>/processed/<set>/out.csv]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also add per-region point counts
        #[arg(long)]
        point_counts: bool,

        /// Render projections at preview resolution
        #[arg(long)]
        preview: bool,
    },

    /// Show the regions of a patient directory or the statistics of a mesh
    Inspect {
        /// Patient directory or mesh file
        input: PathBuf,
    },

    /// Classify the health of a cartilage mesh from its projection
    Health {
        /// Input mesh file
        input: PathBuf,

        /// Save the rendered projection as an image
        #[arg(long)]
        save_projection: Option<PathBuf>,

        /// Foreground intensity threshold
        #[arg(long)]
        threshold: Option<u8>,

        /// Convexity ratio at which a contour counts as rough
        #[arg(long)]
        cutoff: Option<f64>,
    },

    /// Measure the intercondylar gap of a femur mesh
    Gap {
        /// Input mesh file
        input: PathBuf,

        /// Match every window point instead of the first
        #[arg(long)]
        each_point: bool,
    },

    /// Discrete curvature statistics of a mesh surface
    Curvature {
        /// Input mesh file
        input: PathBuf,

        /// Curvature kind
        #[arg(long, default_value = "mean")]
        kind: CurvatureChoice,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CurvatureChoice {
    /// Mean curvature
    Mean,
    /// Gaussian curvature
    Gaussian,
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "knee_features=info,knee_cli=info",
            2 => "knee_features=debug,knee_cli=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Features {
            table,
            data_root,
            set,
            data_dir,
            output,
            point_counts,
            preview,
        } => {
            let paths = features::DataPaths::resolve(
                data_root,
                set,
                data_dir.as_deref(),
                output.as_deref(),
            );
            features::run(table, &paths, *point_counts, *preview, &cli)
        }
        Commands::Inspect { input } => inspect::run(input, &cli),
        Commands::Health {
            input,
            save_projection,
            threshold,
            cutoff,
        } => health::run(input, save_projection.as_deref(), *threshold, *cutoff, &cli),
        Commands::Gap { input, each_point } => gap::run(input, *each_point, &cli),
        Commands::Curvature { input, kind } => curvature::run(input, *kind, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(err) = e.downcast_ref::<knee_features::FeatureError>() {
                eprintln!("{}: {}", "Error".red().bold(), err);
                eprintln!("  {}: {}", "Code".cyan(), err.code());
                eprintln!("  {}: {}", "Suggestion".green(), err.recovery_suggestion());
                if let Some(location) = err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
