//! Pressure compensation around color changes.
//!
//! Switching the mixing ratio of a shared nozzle leaves the melt chamber
//! pressurized with the old color. To keep the visible transition sharp, the
//! extrusion amounts on both sides of a change are rescaled along a linear
//! ramp measured in filament length:
//!
//! - Before the change, scanning backward from the change point, each move is
//!   scaled by `(acc + e/2) / distance`: almost nothing right at the change,
//!   rising to full flow `distance` mm of filament earlier.
//! - After the change, scanning forward, each move is scaled by
//!   `2 - (acc + e/2) / distance`: double flow right after the change, settling
//!   back to full flow `distance` mm of filament later.
//!
//! `acc` is the filament already accumulated by the scan and `e` the move's
//! own extrusion length. Each side scans at most [`PRESSURE_SCAN_WINDOW`]
//! records.

use tracing::{trace, warn};

use crate::gcode::GCodeLine;

/// Maximum number of records scanned on each side of a change.
pub const PRESSURE_SCAN_WINDOW: usize = 200;

/// Pressure compensation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureCompensation {
    /// Filament length (mm) over which each ramp runs.
    pub filament_distance: f64,

    /// Kept from the job configuration. Not used by the ramp.
    pub negative_reduction_factor: f64,
}

/// What a single compensation pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressureAdjustment {
    /// Moves rescaled before the change.
    pub backward: usize,
    /// Moves rescaled after the change.
    pub forward: usize,
}

#[derive(Debug, Clone, Copy)]
enum Ramp {
    Backward,
    Forward,
}

impl PressureCompensation {
    pub fn new(filament_distance: f64) -> Self {
        Self {
            filament_distance,
            negative_reduction_factor: 1.0,
        }
    }

    pub fn with_negative_reduction_factor(mut self, factor: f64) -> Self {
        self.negative_reduction_factor = factor;
        self
    }

    /// Rescale the extrusion of the moves around `index`.
    ///
    /// The backward ramp covers the records before `index`, the forward ramp
    /// starts at `index` itself.
    pub fn adjust(&self, lines: &mut [GCodeLine], index: usize) -> PressureAdjustment {
        let index = index.min(lines.len());
        let (before, after) = lines.split_at_mut(index);

        PressureAdjustment {
            backward: self.ramp(before.iter_mut().rev(), Ramp::Backward),
            forward: self.ramp(after.iter_mut(), Ramp::Forward),
        }
    }

    fn ramp<'a>(&self, lines: impl Iterator<Item = &'a mut GCodeLine>, ramp: Ramp) -> usize {
        let mut accumulated = 0.0;
        let mut adjusted = 0;

        for line in lines.take(PRESSURE_SCAN_WINDOW) {
            if !line.is_extrusion_move() {
                warn!(line = %line, "Pressure window expected G1");
                continue;
            }
            let Some(e_len) = line.number('E') else {
                warn!(line = %line, "No extrusion length in pressure window");
                continue;
            };

            let center = (accumulated + 0.5 * e_len) / self.filament_distance;
            let factor = match ramp {
                Ramp::Backward => center,
                Ramp::Forward => 2.0 - center,
            };

            trace!(e_len, factor, "Pressure control");
            line.set_param('E', e_len * factor);
            line.set_comment(&format!("PressureControlFactor: {}", factor));

            accumulated += e_len;
            adjusted += 1;

            if accumulated >= self.filament_distance {
                break;
            }
        }

        adjusted
    }
}
