//! G-code records, stream analysis and output.
//!
//! - [`GCodeLine`] - a parsed instruction with its derived annotations
//! - [`GCodeContainer`] - the working sequence, its partition and the
//!   per-move analytic table
//! - [`GCode`] - serialized output and output file naming

mod container;
mod generator;
mod line;

pub use container::{
    reindex, AnalyticRow, GCodeContainer, ModelMetrics, Partition, CURA_SIGNATURE,
    EPILOG_START_MARKER, PROLOG_END_MARKER,
};
pub use generator::{output_file_name, GCode};
pub use line::{format_number, parse_gcode, Command, GCodeLine, ParamValue};
