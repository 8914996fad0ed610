//! End-to-end color-change job.
//!
//! Runs the stages in order on one G-code text:
//! parse and annotate → partition → analytic table → plan → edit → serialize.

use std::path::Path;

use chrono::NaiveDateTime;
use tracing::info;

use crate::color::{ColorChangeEditor, ColorChangeEvent, ColorChangePlanner};
use crate::config::ColorChangeConfig;
use crate::gcode::{output_file_name, GCode, GCodeContainer, ModelMetrics};
use crate::Result;

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The rewritten G-code.
    pub gcode: GCode,
    /// Events that were inserted, in planning order.
    pub events: Vec<ColorChangeEvent>,
    /// Labels of the strategies that were run.
    pub labels: Vec<String>,
    pub metrics: ModelMetrics,
    /// Number of colors in the color order.
    pub color_count: usize,
}

impl PipelineOutput {
    /// Output file name for this result (see [`output_file_name`]).
    pub fn file_name(&self, timestamp: &NaiveDateTime, input: &Path) -> String {
        output_file_name(timestamp, self.color_count, &self.labels, input)
    }
}

/// Runs a [`ColorChangeConfig`] against G-code text.
#[derive(Debug, Clone)]
pub struct ColorChangePipeline {
    config: ColorChangeConfig,
}

impl ColorChangePipeline {
    pub fn new(config: ColorChangeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ColorChangeConfig {
        &self.config
    }

    /// Process one G-code text.
    pub fn run(&self, raw: &str) -> Result<PipelineOutput> {
        let config = &self.config;
        config.validate()?;

        let mut container =
            GCodeContainer::build(raw, config.line_height, config.start_layer_height)?;
        container.partition(config.remove_first_line_count, config.limit_lines)?;
        container.build_analytic_table()?;
        let metrics = container.metrics().unwrap_or_default();

        let (events, labels) = {
            let mut planner = ColorChangePlanner::new(container.rows());
            for strategy in &config.strategies {
                planner.plan(*strategy)?;
            }
            planner.into_parts()
        };

        let editor = ColorChangeEditor::from_config(config, metrics.layer_count)?;
        let mut lines = container.into_lines();
        editor.apply(&events, &mut lines)?;

        info!(
            events = events.len(),
            lines = lines.len(),
            labels = %labels.join("-"),
            "Color change job finished"
        );

        Ok(PipelineOutput {
            gcode: GCode::from_lines(&lines),
            events,
            labels,
            metrics,
            color_count: config.color_order.len(),
        })
    }
}
