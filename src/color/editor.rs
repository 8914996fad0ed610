//! Color-change insertion.
//!
//! The editor takes the planned events and rewrites the working sequence:
//!
//! 1. Events are applied in descending sequence index, so inserting a block
//!    at one index never shifts the positions of events still to be applied.
//! 2. Each event gets the mixing block for its color
//!    (`M163 S0/S1/S2` + `M164 S0`), cycling through the color order in
//!    planning order.
//! 3. With pressure compensation the extrusion around the change is ramped
//!    (see [`PressureCompensation`]); otherwise the block is bracketed by a
//!    retraction and a refill move.

use tracing::{debug, info};

use super::planner::ColorChangeEvent;
use super::pressure::PressureCompensation;
use crate::config::{ColorChangeConfig, ColorWeights, SectionedParam};
use crate::gcode::{reindex, Command, GCodeLine};
use crate::{Error, Result};

/// Retraction settings used when pressure compensation is off.
#[derive(Debug, Clone, PartialEq)]
pub struct Retraction {
    pub length: SectionedParam,
    /// Defaults to `length`.
    pub refill_length: Option<SectionedParam>,
    /// Feedrate of both moves. Omitted from the moves when unset.
    pub speed: Option<SectionedParam>,
}

impl Retraction {
    pub fn new(length: impl Into<SectionedParam>) -> Self {
        Self {
            length: length.into(),
            refill_length: None,
            speed: None,
        }
    }

    pub fn with_refill(mut self, refill_length: impl Into<SectionedParam>) -> Self {
        self.refill_length = Some(refill_length.into());
        self
    }

    pub fn with_speed(mut self, speed: impl Into<SectionedParam>) -> Self {
        self.speed = Some(speed.into());
        self
    }

    /// Wrap `block` in a retract/refill pair resolved for `layer_index`.
    ///
    /// A zero retraction length leaves the block unchanged.
    pub fn bracket(
        &self,
        block: Vec<GCodeLine>,
        layer_index: i32,
        layer_count: usize,
    ) -> Vec<GCodeLine> {
        let length = self.length.resolve(layer_index, layer_count);
        if length == 0.0 {
            return block;
        }

        let refill = self
            .refill_length
            .as_ref()
            .map_or(length, |p| p.resolve(layer_index, layer_count));
        let speed = self
            .speed
            .as_ref()
            .map(|p| p.resolve(layer_index, layer_count));

        debug!(layer_index, length, refill, ?speed, "Retraction");

        let mut bracketed = Vec::with_capacity(block.len() + 2);
        bracketed.push(extrude(-length, speed));
        bracketed.extend(block);
        bracketed.push(extrude(refill, speed));
        bracketed
    }
}

fn extrude(e: f64, speed: Option<f64>) -> GCodeLine {
    let line = GCodeLine::new(Command::G1).with_param('E', e);
    match speed {
        Some(f) => line.with_param('F', f),
        None => line,
    }
}

/// The four commands that select a mixing ratio.
pub fn color_change_commands(weights: &ColorWeights) -> Vec<GCodeLine> {
    let mut commands: Vec<GCodeLine> = weights
        .iter()
        .enumerate()
        .map(|(channel, &weight)| {
            GCodeLine::new(Command::M163)
                .with_param('S', channel as f64)
                .with_param('P', weight)
        })
        .collect();
    commands.push(GCodeLine::new(Command::M164).with_param('S', 0.0));
    commands
}

/// How the pressure transient at a change is handled.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionMode {
    /// Only the mixing block is inserted.
    None,
    PressureCompensation(PressureCompensation),
    Retraction(Retraction),
}

/// Inserts color changes into a working sequence.
#[derive(Debug, Clone)]
pub struct ColorChangeEditor {
    color_order: Vec<ColorWeights>,
    mode: TransitionMode,
    /// Model layer count, for sectioned retraction parameters.
    layer_count: usize,
}

impl ColorChangeEditor {
    /// Create an editor that only inserts mixing blocks.
    pub fn new(color_order: Vec<ColorWeights>, layer_count: usize) -> Result<Self> {
        if color_order.is_empty() {
            return Err(Error::Config("color_order must not be empty".to_string()));
        }
        Ok(Self {
            color_order,
            mode: TransitionMode::None,
            layer_count,
        })
    }

    /// Build an editor from a job configuration.
    ///
    /// Pressure compensation takes precedence over retraction.
    pub fn from_config(config: &ColorChangeConfig, layer_count: usize) -> Result<Self> {
        let editor = Self::new(config.color_order.clone(), layer_count)?;

        if let Some(distance) = config.reduce_pressure_filament_distance {
            let compensation = PressureCompensation::new(distance)
                .with_negative_reduction_factor(config.negative_pressure_reduction_factor);
            return Ok(editor.with_pressure_compensation(compensation));
        }

        match &config.retraction_length {
            Some(length) => {
                let retraction = Retraction {
                    length: length.clone(),
                    refill_length: config.refill_retraction_length.clone(),
                    speed: config.retraction_speed.clone(),
                };
                Ok(editor.with_retraction(retraction))
            }
            None => Ok(editor),
        }
    }

    pub fn with_pressure_compensation(mut self, compensation: PressureCompensation) -> Self {
        self.mode = TransitionMode::PressureCompensation(compensation);
        self
    }

    pub fn with_retraction(mut self, retraction: Retraction) -> Self {
        self.mode = TransitionMode::Retraction(retraction);
        self
    }

    pub fn mode(&self) -> &TransitionMode {
        &self.mode
    }

    /// Colors for the event with the given planning order.
    pub fn color_for(&self, order: usize) -> &ColorWeights {
        &self.color_order[order % self.color_order.len()]
    }

    /// Insert every event into `lines`.
    ///
    /// Sequence indices of `lines` are recomputed afterwards.
    pub fn apply(&self, events: &[ColorChangeEvent], lines: &mut Vec<GCodeLine>) -> Result<()> {
        let mut ordered: Vec<&ColorChangeEvent> = events.iter().collect();
        // later-planned first, so at a shared index its block ends up next to the move
        ordered.sort_by(|a, b| {
            b.sequence_index
                .cmp(&a.sequence_index)
                .then(b.order.cmp(&a.order))
        });

        for event in ordered {
            let index = event.sequence_index;
            if index > lines.len() {
                return Err(Error::Structure(format!(
                    "color change at {} is past the end of the sequence ({} records)",
                    index,
                    lines.len()
                )));
            }

            let mut block = color_change_commands(self.color_for(event.order));

            match &self.mode {
                TransitionMode::None => {}
                TransitionMode::PressureCompensation(compensation) => {
                    let adjusted = compensation.adjust(lines, index);
                    debug!(
                        index,
                        backward = adjusted.backward,
                        forward = adjusted.forward,
                        "Pressure compensation"
                    );
                }
                TransitionMode::Retraction(retraction) => {
                    block = retraction.bracket(
                        block,
                        event.source_row.layer_index,
                        self.layer_count,
                    );
                }
            }

            lines.splice(index..index, block);
        }

        reindex(lines);
        info!(events = events.len(), "Inserted color changes");
        Ok(())
    }
}
