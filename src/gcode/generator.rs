//! G-code output.
//!
//! This module provides the [`GCode`] type holding the serialized result of a
//! job, and the naming scheme for output files.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;

use super::line::GCodeLine;
use crate::Result;

/// Serialized G-code ready to be written to disk.
#[derive(Clone, Default, PartialEq)]
pub struct GCode {
    /// The G-code content as a string.
    content: String,
}

impl GCode {
    /// Create a new empty GCode.
    pub fn new() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Create a GCode from a string.
    pub fn from_string(content: String) -> Self {
        Self { content }
    }

    /// Serialize a sequence of records, one per line.
    pub fn from_lines(lines: &[GCodeLine]) -> Self {
        let mut gcode = Self::new();
        for line in lines {
            gcode.append_line(&line.to_gcode_string());
        }
        gcode
    }

    /// Get the G-code content as a string.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Get the length of the G-code content in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Check if the G-code is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Append a line to the G-code.
    pub fn append_line(&mut self, line: &str) {
        self.content.push_str(line);
        self.content.push('\n');
    }

    /// Write the G-code to a file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(self.content.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Read G-code from a file.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_string(content))
    }

    /// Get the number of lines in the G-code.
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    /// Iterate over the lines of the G-code.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.lines()
    }
}

impl fmt::Debug for GCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GCode({} bytes, {} lines)",
            self.len(),
            self.line_count()
        )
    }
}

/// Name of the output file for a processed job.
///
/// Format: `<MMDD-HHMM>_colored<color_count>_<label-label>_<stem>.gcode`,
/// where `stem` is the input file name without extension.
pub fn output_file_name(
    timestamp: &NaiveDateTime,
    color_count: usize,
    labels: &[String],
    input: &Path,
) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    format!(
        "{}_colored{}_{}_{}.gcode",
        timestamp.format("%m%d-%H%M"),
        color_count,
        labels.join("-"),
        stem
    )
}
