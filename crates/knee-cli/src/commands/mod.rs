//! Subcommand implementations.

pub mod curvature;
pub mod features;
pub mod gap;
pub mod health;
pub mod inspect;

use anyhow::{Context, Result};
use knee_features::FeatureConfig;

use crate::Cli;

/// The `--config` file if given, otherwise the defaults.
pub fn load_config(cli: &Cli) -> Result<FeatureConfig> {
    match &cli.config {
        Some(path) => FeatureConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => Ok(FeatureConfig::default()),
    }
}

/// `[x, y, z]` as a plain array for JSON output.
pub fn coords(p: &nalgebra::Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}
