use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn single_step() -> usize {
    1
}

/// Fixed-shape model input for one base timestamp and one horizon.
///
/// `values` holds `steps` rows of `columns.len()` values, oldest row first;
/// the last row is anchored at `base_timestamp`. Column order is the model's
/// feature config order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub base_timestamp: DateTime<Utc>,
    pub horizon: u32,
    pub columns: Vec<String>,
    #[serde(default = "single_step")]
    pub steps: usize,
    pub values: Vec<f64>,
    /// Close of the anchor bar. Not a model input.
    pub base_price: f64,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of `column` in the newest row.
    pub fn get(&self, column: &str) -> Option<f64> {
        let offset = self.values.len().checked_sub(self.columns.len())?;
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(offset + i).copied())
    }

    /// Row `step` of a sequence input, 0 being the oldest.
    pub fn row(&self, step: usize) -> Option<&[f64]> {
        let width = self.columns.len();
        self.values.get(step * width..(step + 1) * width)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}
