//! # colormix
//!
//! Post-processor for sliced G-code that turns a single-color print into a
//! multi-color one on a three-channel mixing hotend.
//!
//! The crate reads an already-generated instruction stream, works out where
//! color changes should happen (every N layers, every D millimetres of XY
//! travel, or at angular sector boundaries around the model center) and
//! rewrites the stream around each change:
//!
//! - `M163`/`M164` mixing commands select the next color
//! - either the extrusion amounts near the change are ramped to compensate
//!   for the pressure transient in the shared nozzle, or the change is
//!   bracketed with a retraction and a refill move
//!
//! ## Example
//!
//! ```rust,ignore
//! use colormix::config::ColorChangeConfig;
//! use colormix::pipeline::ColorChangePipeline;
//!
//! let config = ColorChangeConfig::from_file("job.json")?;
//! let raw = std::fs::read_to_string("model.gcode")?;
//!
//! let output = ColorChangePipeline::new(config).run(&raw)?;
//! output.gcode.write_to_file("model_colored.gcode")?;
//! ```

pub mod color;
pub mod config;
pub mod gcode;
pub mod pipeline;

pub use color::{ChangeStrategy, ColorChangeEditor, ColorChangeEvent, ColorChangePlanner};
pub use config::{ColorChangeConfig, ColorWeights, SectionedParam};
pub use gcode::{AnalyticRow, GCode, GCodeContainer, GCodeLine, ModelMetrics};
pub use pipeline::{ColorChangePipeline, PipelineOutput};

/// Errors raised while processing a G-code job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A line of the instruction stream could not be parsed.
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The stream does not have the expected prolog/body/epilog structure.
    #[error("Invalid G-code structure: {0}")]
    Structure(String),

    /// The job configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
