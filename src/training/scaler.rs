//! Min-max feature scaling and the scaler artifact

use super::features::{FeatureEncoder, FeatureError};
use serde::{Deserialize, Serialize};

/// Scales each feature to `[0, 1]` over the fitted range
///
/// `x' = (x - min) / (max - min)`; a constant column uses a range of 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub range: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];

        for row in rows {
            for (j, &v) in row.iter().enumerate().take(width) {
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }

        let range = min
            .iter()
            .zip(&max)
            .map(|(lo, hi)| {
                let r = hi - lo;
                if r > 0.0 && r.is_finite() {
                    r
                } else {
                    1.0
                }
            })
            .collect();
        let min = min
            .into_iter()
            .map(|m| if m.is_finite() { m } else { 0.0 })
            .collect();

        MinMaxScaler { min, range }
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        debug_assert_eq!(row.len(), self.width());
        row.iter()
            .zip(self.min.iter().zip(&self.range))
            .map(|(x, (lo, r))| (x - lo) / r)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

/// Scaler blob: column encoding plus the fitted scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub encoder: FeatureEncoder,
    pub scaler: MinMaxScaler,
}

impl Preprocessor {
    /// Encode and scale request rows
    pub fn transform_json(&self, rows: &[Vec<serde_json::Value>]) -> Result<Vec<Vec<f64>>, FeatureError> {
        rows.iter()
            .map(|row| Ok(self.scaler.transform_row(&self.encoder.encode_json_row(row)?)))
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
