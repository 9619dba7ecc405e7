//! knee curvature command - discrete curvature statistics of a mesh.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use knee_features::{CurvatureKind, CurvatureSummary, curvature_summary, load_mesh};
use serde::Serialize;

use crate::commands::load_config;
use crate::{Cli, CurvatureChoice, OutputFormat, output};

#[derive(Serialize)]
struct CurvatureResult {
    input: String,
    kind: CurvatureKind,
    #[serde(flatten)]
    summary: CurvatureSummary,
}

pub fn run(input: &Path, kind: CurvatureChoice, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    config.curvature.kind = match kind {
        CurvatureChoice::Mean => CurvatureKind::Mean,
        CurvatureChoice::Gaussian => CurvatureKind::Gaussian,
    };

    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let summary = curvature_summary(&mesh, &config.curvature)?;

    let result = CurvatureResult {
        input: input.display().to_string(),
        kind: config.curvature.kind,
        summary,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                let s = &result.summary;
                println!("{} ({:?})", "Curvature".bold(), result.kind);
                println!("  {}: {}", "Vertices".cyan(), s.vertices);
                println!("  {}: {:.6}", "Mean |k|".cyan(), s.mean_abs);
                println!("  {}: {:.6}", "Min".cyan(), s.min);
                println!("  {}: {:.6}", "Max".cyan(), s.max);
            }
        }
    }

    Ok(())
}
