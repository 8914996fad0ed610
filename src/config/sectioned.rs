//! Per-layer-range parameters.
//!
//! Some settings (retraction length, refill length, retraction speed) can vary
//! over the height of the print. A [`SectionedParam`] is either one value for
//! the whole model, or a list of N values for N equal, contiguous layer
//! ranges.

use serde::{Deserialize, Serialize};

/// A scalar, or one value per equal layer section.
///
/// Serialized untagged: `0.8` or `[0.8, 1.0, 1.2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionedParam {
    Scalar(f64),
    Sectioned(Vec<f64>),
}

impl SectionedParam {
    /// Value for `layer_index` in a model of `layer_count` layers.
    ///
    /// For N sections, layers in `[k*L/N, (k+1)*L/N)` resolve to section `k`.
    /// Layers outside `0..layer_count` clamp to the first/last section. An
    /// empty list resolves to 0.
    pub fn resolve(&self, layer_index: i32, layer_count: usize) -> f64 {
        match self {
            SectionedParam::Scalar(value) => *value,
            SectionedParam::Sectioned(values) => values
                .get(section_index(values.len(), layer_index, layer_count))
                .copied()
                .unwrap_or_default(),
        }
    }

    /// Number of sections (1 for a scalar).
    pub fn sections(&self) -> usize {
        match self {
            SectionedParam::Scalar(_) => 1,
            SectionedParam::Sectioned(values) => values.len(),
        }
    }
}

impl From<f64> for SectionedParam {
    fn from(value: f64) -> Self {
        SectionedParam::Scalar(value)
    }
}

impl From<Vec<f64>> for SectionedParam {
    fn from(values: Vec<f64>) -> Self {
        SectionedParam::Sectioned(values)
    }
}

/// `floor(layer / (layer_count / sections))`, clamped to `0..sections`.
fn section_index(sections: usize, layer_index: i32, layer_count: usize) -> usize {
    if sections == 0 || layer_count == 0 {
        return 0;
    }
    let layer = layer_index.max(0) as usize;
    (layer * sections / layer_count).min(sections - 1)
}
