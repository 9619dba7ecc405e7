//! knee features command - extract features for a cohort and join them onto a table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use knee_features::{
    BatchReport, FeatureExtractor, FeatureTable, PointCountFeatures, ProjectionParams,
    add_feature_columns, load_cohort,
};
use serde::Serialize;

use crate::commands::load_config;
use crate::{Cli, OutputFormat, output};

/// Input and output locations of one run.
#[derive(Debug, PartialEq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub output: PathBuf,
}

impl DataPaths {
    /// `<root>/raw/<set>` and `<root>/processed/<set>/out.csv` unless given
    /// explicitly.
    pub fn resolve(
        data_root: &Path,
        set: &str,
        data_dir: Option<&Path>,
        output: Option<&Path>,
    ) -> Self {
        Self {
            data_dir: data_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| data_root.join("raw").join(set)),
            output: output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| data_root.join("processed").join(set).join("out.csv")),
        }
    }
}

#[derive(Serialize)]
struct FeaturesResult {
    data_dir: String,
    table: String,
    output: String,
    patients: usize,
    rows: usize,
    columns: Vec<String>,
    report: BatchReport,
}

pub fn run(
    table_path: &Path,
    paths: &DataPaths,
    point_counts: bool,
    preview: bool,
    cli: &Cli,
) -> Result<()> {
    let mut config = load_config(cli)?;
    if preview {
        config.projection = ProjectionParams {
            viewport_width: ProjectionParams::preview().viewport_width,
            viewport_height: ProjectionParams::preview().viewport_height,
            ..config.projection
        };
    }

    output::info(
        &format!("Loading cohort from {}...", paths.data_dir.display()),
        cli.format,
        cli.quiet,
    );
    let cohort = load_cohort(&paths.data_dir)
        .with_context(|| format!("Failed to load cohort from {:?}", paths.data_dir))?;
    if cohort.is_empty() {
        output::warning(
            &format!("No patient directories in {}", paths.data_dir.display()),
            cli.format,
            cli.quiet,
        );
    }

    let table = FeatureTable::read_csv(table_path)
        .with_context(|| format!("Failed to read table {:?}", table_path))?;

    let mut extractors = config.extractors()?;
    if point_counts {
        extractors.push(Box::new(PointCountFeatures) as Box<dyn FeatureExtractor>);
    }

    output::info(
        &format!("Extracting features for {} patients...", cohort.len()),
        cli.format,
        cli.quiet,
    );
    let (joined, report) = add_feature_columns(&cohort, &table, &mut extractors)?;

    joined
        .write_csv(&paths.output)
        .with_context(|| format!("Failed to write features to {:?}", paths.output))?;

    let result = FeaturesResult {
        data_dir: paths.data_dir.display().to_string(),
        table: table_path.display().to_string(),
        output: paths.output.display().to_string(),
        patients: cohort.len(),
        rows: joined.row_count(),
        columns: joined.columns().to_vec(),
        report,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Features saved to {}", paths.output.display()),
                    cli.format,
                    cli.quiet,
                );
                println!("  {}: {}", "Patients".cyan(), result.patients);
                println!(
                    "  {}: {} x {}",
                    "Table".cyan(),
                    result.rows,
                    result.columns.len()
                );

                if result.report.is_clean() {
                    println!("  {}: {}", "Failures".cyan(), "none".green());
                } else {
                    println!(
                        "  {}: {} in {} patients",
                        "Failures".cyan(),
                        result.report.failure_count().to_string().yellow(),
                        result.report.patients_with_failures()
                    );
                    for (column, count) in result.report.by_column() {
                        println!("    {} {}: {}", "⚠".yellow(), column, count);
                    }
                }
            }
        }
    }

    Ok(())
}
