//! Column encoding shared by training and inference
//!
//! A column is numeric when every training value parses as a float.
//! Otherwise it is categorical and each distinct value maps to its index in
//! the sorted set of training values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("expected {expected} columns, got {found}")]
    WrongWidth { expected: usize, found: usize },

    #[error("column {column}: unknown category {value:?}")]
    UnknownCategory { column: String, value: String },

    #[error("column {column}: {value:?} is not a number")]
    NotNumeric { column: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical { categories: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEncoding {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
}

impl ColumnEncoding {
    fn encode_str(&self, value: &str) -> Result<f64, FeatureError> {
        match &self.kind {
            ColumnKind::Numeric => value.trim().parse::<f64>().map_err(|_| FeatureError::NotNumeric {
                column: self.name.clone(),
                value: value.to_string(),
            }),
            ColumnKind::Categorical { categories } => categories
                .binary_search_by(|c| c.as_str().cmp(value))
                .map(|idx| idx as f64)
                .map_err(|_| FeatureError::UnknownCategory {
                    column: self.name.clone(),
                    value: value.to_string(),
                }),
        }
    }

    fn encode_json(&self, value: &serde_json::Value) -> Result<f64, FeatureError> {
        use serde_json::Value;
        match (&self.kind, value) {
            (ColumnKind::Numeric, Value::Number(n)) => n.as_f64().ok_or_else(|| FeatureError::NotNumeric {
                column: self.name.clone(),
                value: n.to_string(),
            }),
            (_, Value::String(s)) => self.encode_str(s),
            (ColumnKind::Categorical { .. }, Value::Number(n)) => self.encode_str(&n.to_string()),
            (_, other) => Err(FeatureError::NotNumeric {
                column: self.name.clone(),
                value: other.to_string(),
            }),
        }
    }
}

/// Learned encoding of every feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    pub columns: Vec<ColumnEncoding>,
}

impl FeatureEncoder {
    pub fn fit(names: &[String], rows: &[Vec<String>]) -> Self {
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values = || rows.iter().filter_map(move |r| r.get(i)).map(String::as_str);
                let numeric = values().all(|v| v.trim().parse::<f64>().is_ok());
                let kind = if numeric {
                    ColumnKind::Numeric
                } else {
                    let mut categories: Vec<String> = values().map(str::to_string).collect();
                    categories.sort_unstable();
                    categories.dedup();
                    ColumnKind::Categorical { categories }
                };
                ColumnEncoding {
                    name: name.clone(),
                    kind,
                }
            })
            .collect();
        FeatureEncoder { columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn encode_row(&self, row: &[String]) -> Result<Vec<f64>, FeatureError> {
        self.check_width(row.len())?;
        self.columns
            .iter()
            .zip(row)
            .map(|(col, v)| col.encode_str(v))
            .collect()
    }

    /// Encode a request row of JSON scalars
    pub fn encode_json_row(&self, row: &[serde_json::Value]) -> Result<Vec<f64>, FeatureError> {
        self.check_width(row.len())?;
        self.columns
            .iter()
            .zip(row)
            .map(|(col, v)| col.encode_json(v))
            .collect()
    }

    fn check_width(&self, found: usize) -> Result<(), FeatureError> {
        if found != self.columns.len() {
            return Err(FeatureError::WrongWidth {
                expected: self.columns.len(),
                found,
            });
        }
        Ok(())
    }
}

/// Map raw target values to class indices
///
/// Classes are sorted numerically when every label is a number, otherwise
/// lexicographically. Returns (class names, index per label).
pub fn encode_labels(labels: &[String]) -> (Vec<String>, Vec<usize>) {
    let mut classes: Vec<String> = labels.to_vec();
    let numeric: Option<Vec<f64>> = classes.iter().map(|l| l.trim().parse::<f64>().ok()).collect();
    if numeric.is_some() {
        classes.sort_by(|a, b| {
            let a: f64 = a.trim().parse().unwrap_or(f64::NAN);
            let b: f64 = b.trim().parse().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        });
    } else {
        classes.sort_unstable();
    }
    classes.dedup();

    let indices = labels
        .iter()
        .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
        .collect();
    (classes, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn encoder() -> FeatureEncoder {
        FeatureEncoder::fit(
            &strings(&["country", "count"]),
            &[strings(&["fr", "3"]), strings(&["de", "5"]), strings(&["us", "1.5"])],
        )
    }

    #[test]
    fn test_fit_detects_column_kinds() {
        let enc = encoder();
        assert_eq!(
            enc.columns[0].kind,
            ColumnKind::Categorical {
                categories: strings(&["de", "fr", "us"])
            }
        );
        assert_eq!(enc.columns[1].kind, ColumnKind::Numeric);
    }

    #[test]
    fn test_encode_row() {
        let enc = encoder();
        assert_eq!(enc.encode_row(&strings(&["us", "7"])).unwrap(), vec![2.0, 7.0]);
        assert_eq!(
            enc.encode_row(&strings(&["it", "7"])).unwrap_err(),
            FeatureError::UnknownCategory {
                column: "country".to_string(),
                value: "it".to_string()
            }
        );
        assert!(matches!(
            enc.encode_row(&strings(&["fr"])),
            Err(FeatureError::WrongWidth { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_encode_json_row() {
        let enc = encoder();
        assert_eq!(enc.encode_json_row(&[json!("de"), json!(2)]).unwrap(), vec![0.0, 2.0]);
        assert_eq!(enc.encode_json_row(&[json!("fr"), json!("2.5")]).unwrap(), vec![1.0, 2.5]);
        assert!(matches!(
            enc.encode_json_row(&[json!("fr"), json!(null)]),
            Err(FeatureError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_numeric_category_matches_json_number() {
        let enc = FeatureEncoder::fit(&strings(&["id"]), &[strings(&["a1"]), strings(&["2"])]);
        assert_eq!(enc.encode_json_row(&[json!(2)]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_encode_labels() {
        let (classes, idx) = encode_labels(&strings(&["yes", "no", "no", "yes"]));
        assert_eq!(classes, strings(&["no", "yes"]));
        assert_eq!(idx, vec![1, 0, 0, 1]);

        let (classes, idx) = encode_labels(&strings(&["10", "9", "10"]));
        assert_eq!(classes, strings(&["9", "10"]));
        assert_eq!(idx, vec![1, 0, 1]);
    }

    #[test]
    fn test_encoder_json_roundtrip() {
        let enc = encoder();
        let text = serde_json::to_string(&enc).unwrap();
        assert!(text.contains("\"kind\":\"categorical\""));
        assert_eq!(serde_json::from_str::<FeatureEncoder>(&text).unwrap(), enc);
    }
}
