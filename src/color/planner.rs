//! Color-change planning.
//!
//! Every strategy maps each analytic row to a monotonic "change metric"
//! (layer bucket, distance bucket, angular sector). A color change fires at
//! every row where the metric moves by exactly one from the previous row.
//! Jumps of more than one bucket in a single row are not flagged, and neither
//! are rows whose metric is undefined (the first row has no distance).

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gcode::AnalyticRow;
use crate::{Error, Result};

/// How color-change points are selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeStrategy {
    /// Change every `layers` layers.
    LayerCount { layers: u32 },
    /// Change every `distance_mm` of cumulative XY travel.
    DistanceXy { distance_mm: f64 },
    /// Change at each of `splits` equal angular sectors around the center.
    PolarSplits { splits: u32 },
}

impl ChangeStrategy {
    /// Short label used in output file names.
    pub fn label(&self) -> &'static str {
        match self {
            ChangeStrategy::LayerCount { .. } => "layer",
            ChangeStrategy::DistanceXy { .. } => "distance",
            ChangeStrategy::PolarSplits { .. } => "phi",
        }
    }

    /// Bucket of a row under this strategy.
    pub fn metric(&self, row: &AnalyticRow) -> f64 {
        match *self {
            ChangeStrategy::LayerCount { layers } => {
                (row.layer_index as f64 / layers as f64).floor()
            }
            ChangeStrategy::DistanceXy { distance_mm } => {
                (row.distance_xy_cumsum / distance_mm).floor()
            }
            ChangeStrategy::PolarSplits { splits } => {
                let sector_degrees = 360.0 / splits as f64;
                (row.phi / sector_degrees).floor()
            }
        }
    }

    /// Reject zero or negative thresholds.
    pub fn validate(&self) -> Result<()> {
        let valid = match *self {
            ChangeStrategy::LayerCount { layers } => layers > 0,
            ChangeStrategy::DistanceXy { distance_mm } => distance_mm > 0.0,
            ChangeStrategy::PolarSplits { splits } => splits > 0,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "{} strategy needs a positive threshold: {:?}",
                self.label(),
                self
            )))
        }
    }
}

/// A planned color change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorChangeEvent {
    /// Position in the working sequence where the change is inserted.
    pub sequence_index: usize,
    /// Row whose bucket boundary triggered the change.
    pub source_row: AnalyticRow,
    /// Position of this event in planning order.
    pub order: usize,
}

/// Collects color-change events over an analytic table.
///
/// Events accumulate across strategies; coincident indices from different
/// strategies produce separate events.
#[derive(Debug)]
pub struct ColorChangePlanner<'a> {
    rows: &'a [AnalyticRow],
    events: Vec<ColorChangeEvent>,
    labels: Vec<String>,
}

impl<'a> ColorChangePlanner<'a> {
    pub fn new(rows: &'a [AnalyticRow]) -> Self {
        Self {
            rows,
            events: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Run one strategy and append its events. Returns the number added.
    pub fn plan(&mut self, strategy: ChangeStrategy) -> Result<usize> {
        strategy.validate()?;
        self.labels.push(strategy.label().to_string());

        let metrics: Vec<f64> = self.rows.iter().map(|row| strategy.metric(row)).collect();

        let before = self.events.len();
        for (i, pair) in metrics.windows(2).enumerate() {
            if (pair[1] - pair[0]).abs() == 1.0 {
                let row = self.rows[i + 1];
                let order = self.events.len();
                debug!(
                    sequence_index = row.sequence_index,
                    layer = row.layer_index,
                    order,
                    "Color change"
                );
                self.events.push(ColorChangeEvent {
                    sequence_index: row.sequence_index,
                    source_row: row,
                    order,
                });
            }
        }

        let added = self.events.len() - before;
        info!(strategy = strategy.label(), added, "Planned color changes");
        Ok(added)
    }

    /// Change every `layers` layers.
    pub fn by_layer_count(&mut self, layers: u32) -> Result<usize> {
        self.plan(ChangeStrategy::LayerCount { layers })
    }

    /// Change every `distance_mm` of cumulative XY travel.
    pub fn by_distance_xy(&mut self, distance_mm: f64) -> Result<usize> {
        self.plan(ChangeStrategy::DistanceXy { distance_mm })
    }

    /// Change at each of `splits` angular sectors.
    pub fn by_polar_splits(&mut self, splits: u32) -> Result<usize> {
        self.plan(ChangeStrategy::PolarSplits { splits })
    }

    pub fn events(&self) -> &[ColorChangeEvent] {
        &self.events
    }

    /// Labels of the strategies run so far.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn into_parts(self) -> (Vec<ColorChangeEvent>, Vec<String>) {
        (self.events, self.labels)
    }
}
