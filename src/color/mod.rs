//! Color-change planning and insertion.
//!
//! - [`ColorChangePlanner`] picks insertion points from the analytic table
//! - [`ColorChangeEditor`] inserts mixing commands at those points and handles
//!   the pressure transient, either by [`PressureCompensation`] or by
//!   [`Retraction`]

mod editor;
mod planner;
mod pressure;

pub use editor::{color_change_commands, ColorChangeEditor, Retraction, TransitionMode};
pub use planner::{ChangeStrategy, ColorChangeEvent, ColorChangePlanner};
pub use pressure::{PressureAdjustment, PressureCompensation, PRESSURE_SCAN_WINDOW};
