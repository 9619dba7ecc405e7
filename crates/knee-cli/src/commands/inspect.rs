//! knee inspect command - show patient regions or mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use knee_features::{PatientKnee, Region, VolumeMesh, classify_file_name, load_mesh};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    points: usize,
    cells: usize,
    surface_faces: usize,
    surface_area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<[f64; 3]>,
}

impl MeshStats {
    fn of(mesh: &VolumeMesh, region: Option<Region>) -> Self {
        let surface = mesh.extract_surface();
        Self {
            region: region.map(|r| r.to_string()),
            points: mesh.n_points(),
            cells: mesh.n_cells(),
            surface_faces: surface.face_count(),
            surface_area: surface.surface_area(),
            dimensions: mesh.bounds().map(|(min, max)| {
                let d = max - min;
                [d.x, d.y, d.z]
            }),
        }
    }
}

#[derive(Serialize)]
struct PatientInfo {
    code: String,
    regions: Vec<MeshStats>,
    missing: Vec<String>,
}

pub fn run(input: &Path, cli: &Cli) -> Result<()> {
    if input.is_dir() {
        run_patient(input, cli)
    } else {
        run_mesh(input, cli)
    }
}

fn run_patient(dir: &Path, cli: &Cli) -> Result<()> {
    let knee =
        PatientKnee::load(dir).with_context(|| format!("Failed to load patient from {:?}", dir))?;

    let info = PatientInfo {
        code: knee.code.clone(),
        regions: knee
            .regions()
            .map(|(region, mesh)| MeshStats::of(mesh, Some(region)))
            .collect(),
        missing: Region::ALL
            .iter()
            .filter(|r| knee.get(**r).is_none())
            .map(|r| r.to_string())
            .collect(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{} {}", "Patient".bold().underline(), info.code.bold());
                for stats in &info.regions {
                    println!(
                        "  {:<24} {:>8} points {:>8} cells",
                        stats.region.as_deref().unwrap_or_default().cyan(),
                        stats.points,
                        stats.cells
                    );
                }
                for region in &info.missing {
                    println!("  {:<24} {}", region.yellow(), "missing".yellow());
                }
            }
        }
    }
    Ok(())
}

fn run_mesh(path: &Path, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(path).with_context(|| format!("Failed to load mesh from {:?}", path))?;
    let region = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(classify_file_name);
    let stats = MeshStats::of(&mesh, region);

    match cli.format {
        OutputFormat::Json => output::print(&stats, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), path.display());
                if let Some(region) = &stats.region {
                    println!("  {}: {}", "Region".cyan(), region);
                }
                println!("  {}: {}", "Points".cyan(), stats.points);
                println!("  {}: {}", "Cells".cyan(), stats.cells);
                println!("  {}: {}", "Surface faces".cyan(), stats.surface_faces);
                println!("  {}: {:.2}", "Surface area".cyan(), stats.surface_area);
                if let Some([x, y, z]) = stats.dimensions {
                    println!("  {}: {:.2} x {:.2} x {:.2}", "Dimensions".cyan(), x, y, z);
                }
            }
        }
    }
    Ok(())
}
