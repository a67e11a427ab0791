//! Metadata record stored beside each bundle

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// `metadata_{v}.json`
///
/// ```json
/// {"version": 3, "scaler": "models/scaler_3.bin", "accuracy": 0.91, "training_date": "2024-03-09"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub version: u64,
    /// Key of the paired scaler blob
    pub scaler: String,
    /// Held-out accuracy in `[0, 1]`
    pub accuracy: f64,
    #[serde(with = "date_format")]
    pub training_date: NaiveDate,
}

impl ArtifactMetadata {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&text, FORMAT).map_err(serde::de::Error::custom)
    }
}
