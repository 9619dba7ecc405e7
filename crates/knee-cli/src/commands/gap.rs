//! knee gap command - intercondylar gap of a femur mesh.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use knee_features::{WindowQuery, find_gap, load_mesh};
use serde::Serialize;

use crate::commands::{coords, load_config};
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct GapResult {
    input: String,
    distance: f64,
    left_point: [f64; 3],
    right_point: [f64; 3],
    origin: [f64; 3],
    frame: f64,
    query: WindowQuery,
}

pub fn run(input: &Path, each_point: bool, cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    if each_point {
        config.gap.query = WindowQuery::EachPoint;
    }
    config.gap.validate()?;

    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let gap = find_gap(&mesh.extract_surface(), &config.gap)?;

    let result = GapResult {
        input: input.display().to_string(),
        distance: gap.distance,
        left_point: coords(&gap.left_point),
        right_point: coords(&gap.right_point),
        origin: coords(&gap.origin),
        frame: gap.frame,
        query: config.gap.query,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}: {:.3}", "Femur gap".bold(), result.distance);
                let [lx, ly, lz] = result.left_point;
                let [rx, ry, rz] = result.right_point;
                println!("  {}: ({:.3}, {:.3}, {:.3})", "Left".cyan(), lx, ly, lz);
                println!("  {}: ({:.3}, {:.3}, {:.3})", "Right".cyan(), rx, ry, rz);
                let [ox, oy, oz] = result.origin;
                println!("  {}: ({:.3}, {:.3}, {:.3})", "Origin".cyan(), ox, oy, oz);
                println!("  {}: ±{:.3}", "Window".cyan(), result.frame);
            }
        }
    }

    Ok(())
}
