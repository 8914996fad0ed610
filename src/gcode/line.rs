//! G-code instruction records.
//!
//! A [`GCodeLine`] is one parsed line of the instruction stream: a command
//! word (`G1`, `M163`, ...) or a comment marker, its letter-coded parameters in
//! source order, the trailing comment, and the annotations the container
//! derives later (sequence index, layer index, section label).
//!
//! Lines that have not been modified serialize back to their original text,
//! so untouched parts of a file survive a parse/emit cycle byte for byte.
//!
//! # Example
//!
//! ```rust,ignore
//! use colormix::gcode::{parse_gcode, GCodeLine};
//!
//! let lines = parse_gcode("G1 X10.5 Y20 E0.5 ; perimeter\n;LAYER:1\n")?;
//! assert!(lines[0].is_extrusion_move());
//! assert_eq!(lines[0].number('E'), Some(0.5));
//! ```

use std::fmt;

use crate::{Error, Result};

/// Command tag of an instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Comment-only line (`;...`).
    Comment,
    /// Command word such as `G1`, `M163` or `G29.1`.
    Code {
        letter: char,
        number: u32,
        subcode: Option<u32>,
    },
}

impl Command {
    /// Coordinated move, the stream's extrusion command.
    pub const G1: Command = Command::code('G', 1);

    /// Set mix factor for one channel.
    pub const M163: Command = Command::code('M', 163);

    /// Commit the mix factors to a virtual tool.
    pub const M164: Command = Command::code('M', 164);

    /// Create a command tag without a sub-code.
    pub const fn code(letter: char, number: u32) -> Self {
        Command::Code {
            letter,
            number,
            subcode: None,
        }
    }

    /// Whether this is a comment marker.
    pub fn is_comment(&self) -> bool {
        matches!(self, Command::Comment)
    }

    /// Commands whose arguments are free text rather than parameters.
    fn takes_message(&self) -> bool {
        matches!(
            self,
            Command::Code {
                letter: 'M',
                number: 117 | 118,
                subcode: None,
            }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Comment => Ok(()),
            Command::Code {
                letter,
                number,
                subcode: None,
            } => write!(f, "{}{}", letter, number),
            Command::Code {
                letter,
                number,
                subcode: Some(sub),
            } => write!(f, "{}{}.{}", letter, number, sub),
        }
    }
}

/// Value of a single letter-coded parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    /// Non-numeric argument. Empty for bare flags such as `G28 X`.
    Text(String),
}

impl ParamValue {
    /// Numeric value, if this parameter is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => f.write_str(&format_number(*v)),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Format a parameter number the way slicers emit them: integers without a
/// decimal point, everything else with at most 5 decimals and no trailing
/// zeros.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }

    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// A single parsed G-code instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct GCodeLine {
    command: Command,

    /// Parameters in source order.
    params: Vec<(char, ParamValue)>,

    /// Comment text without the leading `;`, trimmed.
    comment: String,

    /// Free-text argument of message commands (`M117`).
    message: Option<String>,

    /// Original text. Cleared on the first modification.
    raw: Option<String>,

    /// Position in the current working sequence.
    pub sequence_index: Option<usize>,

    /// Layer this record belongs to.
    pub layer_index: i32,

    /// Section label from the most recent `;TYPE:` marker.
    pub section_label: Option<String>,
}

impl GCodeLine {
    /// Create a synthesized command line with no parameters.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            params: Vec::new(),
            comment: String::new(),
            message: None,
            raw: None,
            sequence_index: None,
            layer_index: 0,
            section_label: None,
        }
    }

    /// Create a comment-only line.
    pub fn comment_line(text: &str) -> Self {
        let mut line = Self::new(Command::Comment);
        line.comment = text.to_string();
        line
    }

    /// Add a parameter (builder style).
    pub fn with_param(mut self, letter: char, value: impl Into<ParamValue>) -> Self {
        self.set_param(letter, value);
        self
    }

    /// Set the trailing comment (builder style).
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.set_comment(comment);
        self
    }

    /// Parse one line of G-code.
    ///
    /// Returns `Ok(None)` for blank lines. `line_number` is 1-based and only
    /// used for error reporting.
    pub fn parse(line: &str, line_number: usize) -> Result<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (code_part, comment) = match trimmed.find(';') {
            Some(pos) => (trimmed[..pos].trim(), trimmed[pos + 1..].trim()),
            None => (trimmed, ""),
        };

        if code_part.is_empty() {
            let mut parsed = Self::comment_line(comment);
            parsed.raw = Some(trimmed.to_string());
            return Ok(Some(parsed));
        }

        let mut tokens = code_part.split_whitespace();
        // code_part is non-empty and trimmed, so there is a first token
        let word = tokens.next().unwrap_or_default();
        let command = parse_command_word(word, line_number)?;

        let mut parsed = Self::new(command);
        parsed.comment = comment.to_string();

        if command.takes_message() {
            let rest = code_part[word.len()..].trim();
            if !rest.is_empty() {
                parsed.message = Some(rest.to_string());
            }
        } else {
            for token in tokens {
                let (letter, value) = parse_param(token, line_number)?;
                parsed.params.push((letter, value));
            }
        }

        parsed.raw = Some(trimmed.to_string());
        Ok(Some(parsed))
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn params(&self) -> &[(char, ParamValue)] {
        &self.params
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Original text of the line, if it has not been modified since parsing.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Whether the line differs from what was parsed (or was synthesized).
    pub fn is_modified(&self) -> bool {
        self.raw.is_none()
    }

    /// Check if this is an extrusion move (`G1`).
    pub fn is_extrusion_move(&self) -> bool {
        self.command == Command::G1
    }

    /// Check if this is a comment-only line whose text is exactly `text`.
    pub fn is_comment_marker(&self, text: &str) -> bool {
        self.command.is_comment() && self.params.is_empty() && self.comment == text
    }

    /// Look up a parameter by letter.
    pub fn param(&self, letter: char) -> Option<&ParamValue> {
        let letter = letter.to_ascii_uppercase();
        self.params
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, v)| v)
    }

    /// Numeric value of a parameter.
    pub fn number(&self, letter: char) -> Option<f64> {
        self.param(letter).and_then(ParamValue::as_f64)
    }

    /// Whether the parameter is present.
    pub fn has_param(&self, letter: char) -> bool {
        self.param(letter).is_some()
    }

    /// Set or replace a parameter, keeping its position if it already exists.
    pub fn set_param(&mut self, letter: char, value: impl Into<ParamValue>) {
        let letter = letter.to_ascii_uppercase();
        let value = value.into();
        match self.params.iter_mut().find(|(l, _)| *l == letter) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((letter, value)),
        }
        self.raw = None;
    }

    /// Replace the trailing comment.
    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
        self.raw = None;
    }

    /// Label from a `;TYPE:<label>` marker line.
    pub fn section_marker(&self) -> Option<&str> {
        if !self.command.is_comment() {
            return None;
        }
        self.comment.strip_prefix("TYPE:").map(str::trim)
    }

    /// Text after a `;LAYER:` marker line.
    pub fn layer_marker(&self) -> Option<&str> {
        if !self.command.is_comment() {
            return None;
        }
        self.comment.strip_prefix("LAYER:").map(str::trim)
    }

    /// Serialize the record back to a line of G-code (without newline).
    pub fn to_gcode_string(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        if self.command.is_comment() {
            return format!(";{}", self.comment);
        }

        let mut out = self.command.to_string();
        for (letter, value) in &self.params {
            out.push(' ');
            out.push(*letter);
            out.push_str(&value.to_string());
        }
        if let Some(message) = &self.message {
            out.push(' ');
            out.push_str(message);
        }
        if !self.comment.is_empty() {
            out.push_str(" ; ");
            out.push_str(&self.comment);
        }
        out
    }
}

impl fmt::Display for GCodeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_gcode_string())
    }
}

/// Parse a whole G-code text into records, skipping blank lines.
pub fn parse_gcode(text: &str) -> Result<Vec<GCodeLine>> {
    let mut lines = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(parsed) = GCodeLine::parse(line, idx + 1)? {
            lines.push(parsed);
        }
    }
    Ok(lines)
}

fn parse_command_word(word: &str, line_number: usize) -> Result<Command> {
    let mut chars = word.chars();
    let letter = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
        _ => {
            return Err(Error::Parse {
                line: line_number,
                message: format!("expected a command word, found '{}'", word),
            })
        }
    };

    let code = chars.as_str();
    let (number, subcode) = match code.split_once('.') {
        Some((number, sub)) => (number, Some(sub)),
        None => (code, None),
    };

    let invalid = || Error::Parse {
        line: line_number,
        message: format!("invalid command code '{}'", word),
    };

    let number = number.parse::<u32>().map_err(|_| invalid())?;
    let subcode = match subcode {
        Some(sub) => Some(sub.parse::<u32>().map_err(|_| invalid())?),
        None => None,
    };

    Ok(Command::Code {
        letter,
        number,
        subcode,
    })
}

fn parse_param(token: &str, line_number: usize) -> Result<(char, ParamValue)> {
    let mut chars = token.chars();
    let letter = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
        _ => {
            return Err(Error::Parse {
                line: line_number,
                message: format!("parameter '{}' does not start with a letter", token),
            })
        }
    };

    let value = chars.as_str();
    let value = match value.parse::<f64>() {
        Ok(v) => ParamValue::Number(v),
        Err(_) => ParamValue::Text(value.to_string()),
    };

    Ok((letter, value))
}
