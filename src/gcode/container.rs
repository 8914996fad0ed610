//! Stream container.
//!
//! Owns the full working sequence of a G-code job and derives everything the
//! color-change planner needs from it:
//!
//! 1. Annotation: sequence index, layer index and section label per record
//! 2. Partition: prolog / body / epilog split at the slicer's start and end
//!    sentinels, optionally skipping leading lines and bottom layers
//! 3. Analytic table: one [`AnalyticRow`] per extrusion move in the body with
//!    XY distance, cumulative distance and polar position about the model
//!    center
//! 4. Model metrics: center point, height and layer count
//!
//! # Layer detection
//!
//! Files produced by Cura carry `;LAYER:<n>` and `;TYPE:<label>` markers and
//! are annotated from those. For every other generator the layer of a move is
//! derived from its Z height and the printer's layer height.

use std::ops::Range;

use tracing::{debug, info, warn};

use super::line::{parse_gcode, GCodeLine};
use crate::{Error, Result};

/// Signature line Cura writes into the header of every file.
pub const CURA_SIGNATURE: &str = ";Generated with Cura_SteamEngine";

/// Comment text of the sentinel closing the start G-code.
pub const PROLOG_END_MARKER: &str = "END OF THE START GCODE";

/// Comment text of the sentinel opening the end G-code.
pub const EPILOG_START_MARKER: &str = "START OF THE END GCODE";

/// Slack added before flooring Z / layer height so that heights which are
/// exact multiples of the layer height land on their own layer.
const LAYER_EPSILON: f64 = 1e-9;

/// Half-open ranges of the three regions of the working sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Everything up to and including the start boundary.
    pub prolog: Range<usize>,
    /// Records strictly between the start boundary and the epilog sentinel.
    pub body: Range<usize>,
    /// The epilog sentinel and everything after it.
    pub epilog: Range<usize>,
}

/// One extrusion move of the body, with derived geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticRow {
    /// Index of the source record in the working sequence.
    pub sequence_index: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Extrusion length of this move (0 when the move has no `E`).
    pub e: f64,
    /// XY distance from the previous row. NaN for the first row.
    pub distance_xy: f64,
    /// Running total of `distance_xy`. NaN for the first row.
    pub distance_xy_cumsum: f64,
    /// Distance from the model center in the XY plane.
    pub rho: f64,
    /// Angle about the model center in degrees, `atan2(dx, dy)`.
    pub phi: f64,
    pub layer_index: i32,
}

/// Global metrics of the model in the body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModelMetrics {
    /// Mean X and mean Y of all extrusion moves.
    pub center_xy: (f64, f64),
    /// Maximum Z of all extrusion moves.
    pub height_mm: f64,
    /// `height_mm / line_height`, rounded.
    pub layer_count: usize,
}

/// Container for one G-code job.
#[derive(Debug, Clone)]
pub struct GCodeContainer {
    /// Working sequence.
    lines: Vec<GCodeLine>,

    /// Printer layer height in mm.
    line_height: f64,

    /// Moves below this Z are kept in the prolog. 0 disables.
    start_layer_height: f64,

    /// Whether layers and sections come from Cura markers.
    marker_layers: bool,

    partition: Option<Partition>,

    rows: Vec<AnalyticRow>,

    metrics: Option<ModelMetrics>,
}

impl GCodeContainer {
    /// Parse raw G-code and annotate every record.
    pub fn build(raw: &str, line_height: f64, start_layer_height: f64) -> Result<Self> {
        let lines = parse_gcode(raw)?;
        let marker_layers = raw.contains(CURA_SIGNATURE);

        debug!(
            lines = lines.len(),
            marker_layers, "Parsed G-code into instruction records"
        );

        let mut container = Self {
            lines,
            line_height,
            start_layer_height,
            marker_layers,
            partition: None,
            rows: Vec::new(),
            metrics: None,
        };
        container.annotate();
        Ok(container)
    }

    /// Assign sequence index, layer index and section label to every record.
    ///
    /// Layer and section markers are only honored for Cura files.
    pub fn annotate(&mut self) {
        let mut section: Option<String> = None;
        let mut layer = 0;

        for (index, line) in self.lines.iter_mut().enumerate() {
            if self.marker_layers {
                if let Some(label) = line.section_marker() {
                    section = Some(label.to_string());
                }
                if let Some(marker) = line.layer_marker() {
                    match marker.parse::<i32>() {
                        Ok(n) => layer = n,
                        Err(_) => warn!(marker, "Ignoring unreadable layer marker"),
                    }
                }
            }

            line.sequence_index = Some(index);
            line.layer_index = layer;
            line.section_label = section.clone();
        }
    }

    /// Split the working sequence into prolog, body and epilog.
    ///
    /// The start boundary is the prolog sentinel advanced by
    /// `remove_leading_count` records and then past the bottom layers (see
    /// [`exclude_bottom_layers`](Self::exclude_bottom_layers)). With
    /// `limit_count` the body is truncated, the working sequence is rebuilt
    /// from the three regions and sequence indices are recomputed for it.
    pub fn partition(
        &mut self,
        remove_leading_count: usize,
        limit_count: Option<usize>,
    ) -> Result<&Partition> {
        let prolog_end = self.find_unique_marker(PROLOG_END_MARKER)?;
        let epilog_start = self.find_unique_marker(EPILOG_START_MARKER)?;

        let start = prolog_end + remove_leading_count;
        if start >= epilog_start {
            return Err(Error::Structure(format!(
                "start boundary {} is not before the end G-code at {}",
                start, epilog_start
            )));
        }
        let start = self.exclude_bottom_layers(start, epilog_start);

        let mut partition = Partition {
            prolog: 0..start + 1,
            body: start + 1..epilog_start,
            epilog: epilog_start..self.lines.len(),
        };

        if let Some(limit) = limit_count {
            if limit < partition.body.len() {
                let cut = partition.body.start + limit..partition.body.end;
                let removed = cut.len();
                self.lines.drain(cut);

                partition.body.end -= removed;
                partition.epilog = partition.body.end..self.lines.len();
                debug!(limit, removed, "Truncated body");
            }

            // positions no longer match the parsed file
            for line in &mut self.lines {
                line.sequence_index = None;
            }
            reindex(&mut self.lines);
        }

        info!(
            prolog = partition.prolog.len(),
            body = partition.body.len(),
            epilog = partition.epilog.len(),
            "Partitioned G-code"
        );

        self.rows.clear();
        self.metrics = None;
        Ok(self.partition.insert(partition))
    }

    /// Move the start boundary past the bottom layers.
    ///
    /// If `start_layer_height > 0`, the first extrusion move after `start`
    /// (and before `end`) whose Z is at least `start_layer_height` becomes the
    /// new boundary. Otherwise, or if no such move exists, `start` is returned.
    pub fn exclude_bottom_layers(&self, start: usize, end: usize) -> usize {
        if self.start_layer_height <= 0.0 {
            return start;
        }

        let found = self
            .lines
            .iter()
            .enumerate()
            .take(end)
            .skip(start + 1)
            .find(|(_, line)| {
                line.is_extrusion_move()
                    && line
                        .number('Z')
                        .is_some_and(|z| z >= self.start_layer_height)
            });

        match found {
            Some((index, line)) => {
                info!(
                    index,
                    line = %line,
                    "Start found after bottom layers"
                );
                index
            }
            None => {
                warn!(
                    height = self.start_layer_height,
                    "No move reaches the start layer height, keeping bottom layers"
                );
                start
            }
        }
    }

    /// Build the per-move analytic table and the model metrics.
    pub fn build_analytic_table(&mut self) -> Result<&[AnalyticRow]> {
        let body = self
            .partition
            .as_ref()
            .map(|p| p.body.clone())
            .ok_or_else(|| {
                Error::Structure("analytic table requires a partitioned stream".to_string())
            })?;

        let moves: Vec<&GCodeLine> = self.lines[body]
            .iter()
            .filter(|line| line.is_extrusion_move())
            .collect();

        if moves.is_empty() {
            warn!("Body contains no extrusion moves");
            self.rows.clear();
            self.metrics = Some(ModelMetrics::default());
            return Ok(&self.rows);
        }

        let xs = fill_column(moves.iter().map(|l| l.number('X')).collect(), 'X');
        let ys = fill_column(moves.iter().map(|l| l.number('Y')).collect(), 'Y');
        let zs = fill_column(moves.iter().map(|l| l.number('Z')).collect(), 'Z');

        let mut rows = Vec::with_capacity(moves.len());
        let mut cumsum = 0.0;

        for (i, line) in moves.iter().enumerate() {
            let sequence_index = line.sequence_index.ok_or_else(|| {
                Error::Structure(format!("record '{}' has no sequence index", line))
            })?;

            let (x, y, z) = (xs[i], ys[i], zs[i]);

            let (distance_xy, distance_xy_cumsum) = if i == 0 {
                (f64::NAN, f64::NAN)
            } else {
                let d = (x - xs[i - 1]).hypot(y - ys[i - 1]);
                cumsum += d;
                (d, cumsum)
            };

            let e = match line.number('E') {
                Some(e) => e,
                None => {
                    debug!(sequence_index, "Move without extrusion length, using 0");
                    0.0
                }
            };

            let layer_index = if self.marker_layers {
                line.layer_index
            } else {
                (z / self.line_height + LAYER_EPSILON).floor() as i32
            };

            rows.push(AnalyticRow {
                sequence_index,
                x,
                y,
                z,
                e,
                distance_xy,
                distance_xy_cumsum,
                rho: 0.0,
                phi: 0.0,
                layer_index,
            });
        }

        let count = rows.len() as f64;
        let center_xy = (
            rows.iter().map(|r| r.x).sum::<f64>() / count,
            rows.iter().map(|r| r.y).sum::<f64>() / count,
        );
        let height_mm = rows.iter().map(|r| r.z).fold(f64::NEG_INFINITY, f64::max);
        let layer_count = (height_mm / self.line_height).round().max(0.0) as usize;

        for row in &mut rows {
            let dx = row.x - center_xy.0;
            let dy = row.y - center_xy.1;
            row.rho = dx.hypot(dy);
            row.phi = dx.atan2(dy).to_degrees();
        }

        info!(
            rows = rows.len(),
            center_x = center_xy.0,
            center_y = center_xy.1,
            height_mm,
            layer_count,
            "Built analytic table"
        );

        self.rows = rows;
        self.metrics = Some(ModelMetrics {
            center_xy,
            height_mm,
            layer_count,
        });
        Ok(&self.rows)
    }

    fn find_unique_marker(&self, text: &str) -> Result<usize> {
        let mut found = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.is_comment_marker(text))
            .map(|(index, _)| index);

        match (found.next(), found.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(Error::Structure(format!("missing ';{}' marker", text))),
            (Some(_), Some(_)) => Err(Error::Structure(format!(
                "';{}' marker occurs more than once",
                text
            ))),
        }
    }

    /// The full working sequence.
    pub fn lines(&self) -> &[GCodeLine] {
        &self.lines
    }

    /// Hand over the working sequence for editing.
    pub fn into_lines(self) -> Vec<GCodeLine> {
        self.lines
    }

    pub fn partition_ranges(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    pub fn prolog(&self) -> &[GCodeLine] {
        self.region(|p| p.prolog.clone())
    }

    pub fn body(&self) -> &[GCodeLine] {
        self.region(|p| p.body.clone())
    }

    pub fn epilog(&self) -> &[GCodeLine] {
        self.region(|p| p.epilog.clone())
    }

    fn region(&self, range: impl Fn(&Partition) -> Range<usize>) -> &[GCodeLine] {
        match &self.partition {
            Some(p) => &self.lines[range(p)],
            None => &[],
        }
    }

    /// Rows of the analytic table (empty until it is built).
    pub fn rows(&self) -> &[AnalyticRow] {
        &self.rows
    }

    /// Model metrics (available once the analytic table is built).
    pub fn metrics(&self) -> Option<ModelMetrics> {
        self.metrics
    }

    pub fn line_height(&self) -> f64 {
        self.line_height
    }

    /// Whether layers and sections are read from Cura markers.
    pub fn uses_layer_markers(&self) -> bool {
        self.marker_layers
    }
}

/// Assign `sequence_index` = position to every record.
pub fn reindex(lines: &mut [GCodeLine]) {
    for (index, line) in lines.iter_mut().enumerate() {
        line.sequence_index = Some(index);
    }
}

/// Forward-fill then back-fill a positional column.
///
/// A column with no value at all falls back to zeros.
fn fill_column(values: Vec<Option<f64>>, axis: char) -> Vec<f64> {
    let first = values.iter().flatten().next().copied();
    let Some(first) = first else {
        warn!(%axis, "Axis never set in body, using 0");
        return vec![0.0; values.len()];
    };

    let mut last = first;
    values
        .into_iter()
        .map(|value| {
            if let Some(v) = value {
                last = v;
            }
            last
        })
        .collect()
}
