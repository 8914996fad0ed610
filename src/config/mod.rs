//! Job configuration.
//!
//! A [`ColorChangeConfig`] describes one post-processing run: printer layer
//! height, which part of the file to work on, how to pick color-change points,
//! the color sequence, and how to handle the pressure transient at each
//! change.
//!
//! ## Example
//!
//! ```json
//! {
//!   "line_height": 0.2,
//!   "start_layer_height": 0.6,
//!   "strategies": [{ "type": "layer_count", "layers": 10 }],
//!   "color_order": [[1.0, 0.0, 0.0], [0.0, 0.5, 0.5]],
//!   "retraction_length": [0.8, 1.0, 1.2],
//!   "retraction_speed": 1800
//! }
//! ```

mod sectioned;

pub use sectioned::SectionedParam;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::color::ChangeStrategy;
use crate::{Error, Result};

/// Mixing ratios for the three input channels of the hotend.
pub type ColorWeights = [f64; 3];

/// Configuration of a color-change job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorChangeConfig {
    /// Printer layer height in mm.
    pub line_height: f64,

    /// Moves below this Z stay untouched in the prolog (0 disables).
    pub start_layer_height: f64,

    /// Records after the start sentinel to keep in the prolog.
    pub remove_first_line_count: usize,

    /// Truncate the body to this many records.
    pub limit_lines: Option<usize>,

    /// Selection strategies, applied in order.
    pub strategies: Vec<ChangeStrategy>,

    /// Colors cycled through at each change.
    pub color_order: Vec<ColorWeights>,

    /// Filament distance (mm) over which extrusion is ramped around a change.
    /// When set, retraction is not used.
    pub reduce_pressure_filament_distance: Option<f64>,

    /// Accepted for compatibility; not used by the compensation ramp.
    pub negative_pressure_reduction_factor: f64,

    /// Retraction before a change (mm of filament).
    pub retraction_length: Option<SectionedParam>,

    /// Refill after a change. Defaults to the retraction length.
    pub refill_retraction_length: Option<SectionedParam>,

    /// Feedrate of the retraction and refill moves (mm/min).
    pub retraction_speed: Option<SectionedParam>,
}

impl Default for ColorChangeConfig {
    fn default() -> Self {
        Self {
            line_height: 0.2,
            start_layer_height: 0.0,
            remove_first_line_count: 0,
            limit_lines: None,
            strategies: Vec::new(),
            color_order: Vec::new(),
            reduce_pressure_filament_distance: None,
            negative_pressure_reduction_factor: 1.0,
            retraction_length: None,
            refill_retraction_length: None,
            retraction_speed: None,
        }
    }
}

impl ColorChangeConfig {
    /// Create a configuration with the given layer height and colors.
    pub fn new(line_height: f64, color_order: Vec<ColorWeights>) -> Self {
        Self {
            line_height,
            color_order,
            ..Default::default()
        }
    }

    /// Add a selection strategy.
    pub fn with_strategy(mut self, strategy: ChangeStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Enable pressure compensation over the given filament distance.
    pub fn with_pressure_compensation(mut self, filament_distance: f64) -> Self {
        self.reduce_pressure_filament_distance = Some(filament_distance);
        self
    }

    /// Set retraction length and speed.
    pub fn with_retraction(
        mut self,
        length: impl Into<SectionedParam>,
        speed: impl Into<SectionedParam>,
    ) -> Self {
        self.retraction_length = Some(length.into());
        self.retraction_speed = Some(speed.into());
        self
    }

    /// Set a refill length different from the retraction length.
    pub fn with_refill(mut self, length: impl Into<SectionedParam>) -> Self {
        self.refill_retraction_length = Some(length.into());
        self
    }

    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.line_height > 0.0) {
            return Err(Error::Config(format!(
                "line_height must be positive, got {}",
                self.line_height
            )));
        }
        if self.color_order.is_empty() {
            return Err(Error::Config("color_order must not be empty".to_string()));
        }
        for strategy in &self.strategies {
            strategy.validate()?;
        }
        if let Some(distance) = self.reduce_pressure_filament_distance {
            if !(distance > 0.0) {
                return Err(Error::Config(format!(
                    "reduce_pressure_filament_distance must be positive, got {}",
                    distance
                )));
            }
        }

        let sectioned = [
            ("retraction_length", &self.retraction_length),
            ("refill_retraction_length", &self.refill_retraction_length),
            ("retraction_speed", &self.retraction_speed),
        ];
        for (name, param) in sectioned {
            if param.as_ref().is_some_and(|p| p.sections() == 0) {
                return Err(Error::Config(format!("{} has no sections", name)));
            }
        }

        Ok(())
    }

    /// Labels of the configured strategies, in order.
    pub fn strategy_labels(&self) -> Vec<String> {
        self.strategies
            .iter()
            .map(|s| s.label().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ColorChangeConfig {
        ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .with_strategy(ChangeStrategy::LayerCount { layers: 10 })
    }

    #[test]
    fn test_config_default() {
        let config = ColorChangeConfig::default();
        assert_eq!(config.line_height, 0.2);
        assert_eq!(config.negative_pressure_reduction_factor, 1.0);
        assert!(config.strategies.is_empty());
        assert!(config.reduce_pressure_filament_distance.is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "line_height": 0.1,
            "start_layer_height": 0.6,
            "limit_lines": 5000,
            "strategies": [
                { "type": "layer_count", "layers": 10 },
                { "type": "distance_xy", "distance_mm": 250.0 },
                { "type": "polar_splits", "splits": 4 }
            ],
            "color_order": [[1, 0, 0], [0, 0.5, 0.5]],
            "retraction_length": [0.8, 1.0],
            "retraction_speed": 1800
        }"#;
        let config = ColorChangeConfig::from_json(json).unwrap();

        assert_eq!(config.line_height, 0.1);
        assert_eq!(config.limit_lines, Some(5000));
        assert_eq!(config.strategies.len(), 3);
        assert_eq!(
            config.strategies[1],
            ChangeStrategy::DistanceXy { distance_mm: 250.0 }
        );
        assert_eq!(config.color_order[1], [0.0, 0.5, 0.5]);
        assert_eq!(
            config.retraction_length,
            Some(SectionedParam::Sectioned(vec![0.8, 1.0]))
        );
        assert_eq!(config.retraction_speed, Some(SectionedParam::Scalar(1800.0)));
        assert_eq!(config.strategy_labels(), vec!["layer", "distance", "phi"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = valid()
            .with_retraction(vec![0.5, 1.0], 1500.0)
            .with_refill(0.7);
        let json = config.to_json().unwrap();
        assert_eq!(ColorChangeConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(&path, valid().to_json().unwrap()).unwrap();

        assert_eq!(ColorChangeConfig::from_file(&path).unwrap(), valid());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ColorChangeConfig::from_json("{ not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = valid();
        config.line_height = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = valid();
        config.color_order.clear();
        assert!(config.validate().is_err());

        let config = valid().with_strategy(ChangeStrategy::DistanceXy { distance_mm: -1.0 });
        assert!(config.validate().is_err());

        let config = valid().with_pressure_compensation(0.0);
        assert!(config.validate().is_err());

        let config = valid().with_retraction(Vec::<f64>::new(), 1500.0);
        assert!(config.validate().is_err());
    }
}
