//! knee health command - classify a cartilage mesh from its projection.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use knee_features::{
    HealthVerdict, assess_health, load_mesh, project_and_rasterize, save_projection,
};
use serde::Serialize;

use crate::commands::load_config;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct HealthResult {
    input: String,
    healthy: bool,
    #[serde(flatten)]
    verdict: HealthVerdict,
    contours: usize,
    contour_area: f64,
    hull_area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    convexity_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    projection: Option<String>,
}

pub fn run(
    input: &Path,
    save_to: Option<&Path>,
    threshold: Option<u8>,
    cutoff: Option<f64>,
    cli: &Cli,
) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(threshold) = threshold {
        config.health.intensity_threshold = threshold;
    }
    if let Some(cutoff) = cutoff {
        config.health.convexity_cutoff = cutoff;
    }
    config.validate()?;

    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let surface = mesh.extract_surface();

    output::info("Rendering projection...", cli.format, cli.quiet);
    let projection = &config.projection;
    let image = project_and_rasterize(&surface, None, projection.normal(), projection)?;

    if let Some(path) = save_to {
        save_projection(&image, path)?;
    }

    let assessment = assess_health(&image, &config.health);
    let result = HealthResult {
        input: input.display().to_string(),
        healthy: assessment.is_healthy(),
        verdict: assessment.verdict,
        contours: assessment.contour_count,
        contour_area: assessment.contour_area,
        hull_area: assessment.hull_area,
        convexity_ratio: assessment.convexity_ratio,
        projection: save_to.map(|p| p.display().to_string()),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                let status = if result.healthy {
                    "healthy".green().bold()
                } else {
                    "unhealthy".red().bold()
                };
                println!("{}: {}", input.display(), status);

                match result.verdict {
                    HealthVerdict::Healthy => {}
                    HealthVerdict::Hole { contours } => {
                        println!("  {}: {} contours", "Reason".yellow(), contours)
                    }
                    HealthVerdict::Rough { ratio } => println!(
                        "  {}: convexity ratio {:.3} >= {}",
                        "Reason".yellow(),
                        ratio,
                        config.health.convexity_cutoff
                    ),
                    HealthVerdict::Degenerate => {
                        println!("  {}: contour encloses no area", "Reason".yellow())
                    }
                }

                println!("  {}: {:.0} px", "Contour area".cyan(), result.contour_area);
                println!("  {}: {:.0} px", "Hull area".cyan(), result.hull_area);
                if let Some(ratio) = result.convexity_ratio {
                    println!("  {}: {:.3}", "Convexity ratio".cyan(), ratio);
                }
                if let Some(path) = &result.projection {
                    output::success(
                        &format!("Projection saved to {}", path),
                        cli.format,
                        cli.quiet,
                    );
                }
            }
        }
    }

    Ok(())
}
