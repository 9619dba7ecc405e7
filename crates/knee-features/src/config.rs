//! Feature extraction configuration.
//!
//! All calibration constants live in one [`FeatureConfig`] that can be kept
//! next to a data set as TOML or JSON. Missing sections and fields take
//! their defaults, so a file only needs the values it changes:
//!
//! ```toml
//! [health]
//! convexity_cutoff = 1.25
//!
//! [gap]
//! query = "each_point"
//! ```

use std::path::Path;

use crate::contour::HealthParams;
use crate::curvature::CurvatureParams;
use crate::error::{FeatureError, FeatureResult};
use crate::features::{FeatureExtractor, default_extractors};
use crate::gap::GapParams;
use crate::projection::ProjectionParams;

/// Settings for every feature extractor.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub projection: ProjectionParams,
    pub health: HealthParams,
    pub gap: GapParams,
    pub curvature: CurvatureParams,
}

impl FeatureConfig {
    /// Defaults with a smaller render viewport.
    pub fn preset_preview() -> Self {
        Self {
            projection: ProjectionParams::preview(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> FeatureResult<()> {
        self.projection.validate()?;
        self.gap.validate()?;
        if !(self.health.convexity_cutoff.is_finite() && self.health.convexity_cutoff > 0.0) {
            return Err(FeatureError::config(format!(
                "convexity_cutoff must be positive, got {}",
                self.health.convexity_cutoff
            )));
        }
        Ok(())
    }

    /// The curvature, health and femur gap extractors for this configuration.
    pub fn extractors(&self) -> FeatureResult<Vec<Box<dyn FeatureExtractor>>> {
        self.validate()?;
        default_extractors(
            self.projection.clone(),
            self.health.clone(),
            self.gap.clone(),
            self.curvature.clone(),
        )
    }

    pub fn from_toml(toml_str: &str) -> FeatureResult<Self> {
        toml::from_str(toml_str).map_err(|e| FeatureError::config(e.to_string()))
    }

    pub fn to_toml(&self) -> FeatureResult<String> {
        toml::to_string_pretty(self).map_err(|e| FeatureError::config(e.to_string()))
    }

    pub fn from_json(json_str: &str) -> FeatureResult<Self> {
        serde_json::from_str(json_str).map_err(|e| FeatureError::config(e.to_string()))
    }

    pub fn to_json(&self) -> FeatureResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FeatureError::config(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn load(path: &Path) -> FeatureResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| FeatureError::io_read(path, e))?;
        let config = match extension(path).as_deref() {
            Some("json") => Self::from_json(&contents),
            Some("toml") | None => Self::from_toml(&contents),
            Some(other) => Err(FeatureError::config(format!(
                "unsupported configuration format `.{other}`, use .toml or .json"
            ))),
        }?;
        config.validate()?;
        Ok(config)
    }

    /// Save as `.toml` or `.json`, chosen by extension.
    pub fn save(&self, path: &Path) -> FeatureResult<()> {
        let text = match extension(path).as_deref() {
            Some("json") => self.to_json()?,
            _ => self.to_toml()?,
        };
        std::fs::write(path, text).map_err(|e| FeatureError::io_write(path, e))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::WindowQuery;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = FeatureConfig::from_toml(
            r#"
            [health]
            convexity_cutoff = 1.25

            [gap]
            query = "each_point"
            "#,
        )
        .unwrap();

        assert_eq!(config.health.convexity_cutoff, 1.25);
        assert_eq!(config.health.intensity_threshold, 100);
        assert_eq!(config.gap.query, WindowQuery::EachPoint);
        assert_eq!(config.gap.vertical_divisor, 3.0);
        assert_eq!(config.projection, ProjectionParams::default());
    }

    #[test]
    fn test_toml_and_json_agree() {
        let config = FeatureConfig::preset_preview();
        let from_toml = FeatureConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        let from_json = FeatureConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(from_toml, config);
        assert_eq!(from_json, config);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["knee.toml", "knee.json"] {
            let path = dir.path().join(name);
            let mut config = FeatureConfig::default();
            config.gap.window_fraction = 0.4;
            config.save(&path).unwrap();
            assert_eq!(FeatureConfig::load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = FeatureConfig::from_toml("[gap]\nvertical_divisor = 0.0\n")
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, FeatureError::Config { .. }));

        assert!(FeatureConfig::from_toml("[gap]\nquery = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knee.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(FeatureConfig::load(&path).is_err());
    }
}
