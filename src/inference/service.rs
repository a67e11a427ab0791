//! Request handling, free of HTTP

use super::InferenceError;
use crate::clock::SharedClock;
use crate::ledger::{LedgerRecord, LedgerSink};
use crate::registry::ArtifactFetcher;
use crate::storage::ObjectStore;
use crate::training::{NearestCentroid, Preprocessor};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `model_version` as sent by clients: `"3"` or `3`
///
/// Any other JSON value lands in `Other` and is rejected by `parse`, so a
/// bad version is always an `InvalidRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionField {
    Number(u64),
    Text(String),
    Other(serde_json::Value),
}

impl VersionField {
    pub fn parse(&self) -> Result<u64, InferenceError> {
        let version = match self {
            VersionField::Number(v) => *v,
            VersionField::Text(s) => s.trim().parse::<u64>().map_err(|_| {
                InferenceError::InvalidRequest(format!("model_version {:?} is not an integer", s))
            })?,
            VersionField::Other(value) => {
                return Err(InferenceError::InvalidRequest(format!(
                    "model_version {} is not a positive integer",
                    value
                )))
            }
        };
        if version == 0 {
            return Err(InferenceError::InvalidRequest(
                "model_version must be positive".to_string(),
            ));
        }
        Ok(version)
    }
}

impl From<u64> for VersionField {
    fn from(v: u64) -> Self {
        VersionField::Number(v)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub data: Vec<Vec<serde_json::Value>>,
    pub model_version: VersionField,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub model_version: u64,
    /// One row of class probabilities per input row
    pub probabilities: Vec<Vec<f64>>,
    /// Ledger rows written
    pub recorded: usize,
}

pub struct InferenceService<S: ObjectStore> {
    fetcher: ArtifactFetcher<S>,
    ledger: Arc<dyn LedgerSink>,
    clock: SharedClock,
}

impl<S: ObjectStore> InferenceService<S> {
    pub fn new(fetcher: ArtifactFetcher<S>, ledger: Arc<dyn LedgerSink>, clock: SharedClock) -> Self {
        InferenceService {
            fetcher,
            ledger,
            clock,
        }
    }

    pub async fn handle(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let version = request.model_version.parse()?;
        if request.data.is_empty() {
            return Err(InferenceError::InvalidRequest("data has no rows".to_string()));
        }

        let blobs = self.fetcher.fetch(version).await?;
        let model = NearestCentroid::from_json(&blobs.model).map_err(|e| InferenceError::Artifact {
            version,
            reason: format!("model: {}", e),
        })?;
        let preprocessor =
            Preprocessor::from_json(&blobs.scaler).map_err(|e| InferenceError::Artifact {
                version,
                reason: format!("scaler: {}", e),
            })?;
        if let Some(width) = model.width() {
            if width != preprocessor.scaler.width() {
                return Err(InferenceError::Artifact {
                    version,
                    reason: format!(
                        "model expects {} features, scaler produces {}",
                        width,
                        preprocessor.scaler.width()
                    ),
                });
            }
        }

        let scaled = preprocessor.transform_json(&request.data)?;
        let probabilities: Vec<Vec<f64>> = scaled.iter().map(|row| model.predict_proba(row)).collect();

        let now = self.clock.now_utc();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        let records: Vec<LedgerRecord> = scaled
            .into_iter()
            .zip(&probabilities)
            .map(|(features, proba)| LedgerRecord::new(features, proba.clone(), timestamp))
            .collect();

        let outcome = self.ledger.append_batch(version, records).await?;
        tracing::info!(
            version,
            rows = outcome.rows_appended,
            ledger = %outcome.key,
            "inference recorded"
        );

        Ok(InferenceResponse {
            model_version: version,
            probabilities,
            recorded: outcome.rows_appended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::config::{LedgerConfig, RegistryConfig};
    use crate::ledger::ResultLedger;
    use crate::registry::ArtifactPublisher;
    use crate::training::{FeatureEncoder, MinMaxScaler};
    use crate::storage::InMemoryObjectStore;
    use serde_json::json;

    const NOW_MS: u64 = 1_700_000_000_123;

    async fn publish_fixture(artifacts: &InMemoryObjectStore, clock: SharedClock) -> u64 {
        let names = vec!["plan".to_string(), "usage".to_string()];
        let raw = vec![
            vec!["basic".to_string(), "1".to_string()],
            vec!["pro".to_string(), "9".to_string()],
        ];
        let encoder = FeatureEncoder::fit(&names, &raw);
        let encoded: Vec<Vec<f64>> = raw.iter().map(|r| encoder.encode_row(r).unwrap()).collect();
        let scaler = MinMaxScaler::fit(&encoded);
        let model = NearestCentroid::fit(
            vec!["no".into(), "yes".into()],
            &scaler.transform(&encoded),
            &[1, 0],
        );
        let pre = Preprocessor { encoder, scaler };

        ArtifactPublisher::new(artifacts.clone(), &RegistryConfig::default(), clock)
            .publish(&model.to_json().unwrap(), &pre.to_json().unwrap(), 0.9)
            .await
            .unwrap()
            .version
    }

    fn service(
        artifacts: &InMemoryObjectStore,
        results: &InMemoryObjectStore,
        clock: SharedClock,
    ) -> InferenceService<InMemoryObjectStore> {
        InferenceService::new(
            ArtifactFetcher::new(artifacts.clone(), &RegistryConfig::default()),
            Arc::new(ResultLedger::new(results.clone(), &LedgerConfig::default())),
            clock,
        )
    }

    #[tokio::test]
    async fn test_handle_predicts_and_records() {
        let clock: SharedClock = Arc::new(SimulatedClock::new(NOW_MS));
        let artifacts = InMemoryObjectStore::new();
        let results = InMemoryObjectStore::new();
        let version = publish_fixture(&artifacts, clock.clone()).await;
        let svc = service(&artifacts, &results, clock.clone());

        let response = svc
            .handle(InferenceRequest {
                data: vec![vec![json!("basic"), json!(1)], vec![json!("pro"), json!("9")]],
                model_version: VersionField::Text(version.to_string()),
            })
            .await
            .unwrap();

        assert_eq!(response.model_version, 1);
        assert_eq!(response.recorded, 2);
        assert!(response.probabilities[0][1] > 0.5);
        assert!(response.probabilities[1][0] > 0.5);

        let rows = ResultLedger::new(results, &LedgerConfig::default()).read(1).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].features, vec![0.0, 0.0]);
        assert_eq!(rows[1].features, vec![1.0, 1.0]);
        assert_eq!(rows[0].timestamp.timestamp(), (NOW_MS / 1000) as i64);
        assert_eq!(rows[0].probabilities, response.probabilities[0]);
    }

    #[tokio::test]
    async fn test_unknown_version_is_not_found() {
        let clock: SharedClock = Arc::new(SimulatedClock::new(NOW_MS));
        let results = InMemoryObjectStore::new();
        let svc = service(&InMemoryObjectStore::new(), &results, clock);

        let err = svc
            .handle(InferenceRequest {
                data: vec![vec![json!(1)]],
                model_version: 4.into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_bad_requests_write_nothing() {
        let clock: SharedClock = Arc::new(SimulatedClock::new(NOW_MS));
        let artifacts = InMemoryObjectStore::new();
        let results = InMemoryObjectStore::new();
        publish_fixture(&artifacts, clock.clone()).await;
        let svc = service(&artifacts, &results, clock);

        let cases = vec![
            (vec![vec![json!("basic"), json!(1)]], VersionField::Text("one".into())),
            (vec![vec![json!("basic"), json!(1)]], VersionField::Number(0)),
            (vec![], VersionField::Number(1)),
            (vec![vec![json!("enterprise"), json!(1)]], VersionField::Number(1)),
            (vec![vec![json!("basic")]], VersionField::Number(1)),
        ];
        for (data, model_version) in cases {
            let err = svc
                .handle(InferenceRequest { data, model_version })
                .await
                .unwrap_err();
            assert!(err.is_client_error(), "unexpected error: {}", err);
        }
        assert!(results.is_empty());
    }

    #[test]
    fn test_version_field_accepts_string_or_number() {
        let req: InferenceRequest =
            serde_json::from_str(r#"{"data": [[1, "a"]], "model_version": "7"}"#).unwrap();
        assert_eq!(req.model_version.parse().unwrap(), 7);

        let req: InferenceRequest =
            serde_json::from_str(r#"{"data": [], "model_version": 7}"#).unwrap();
        assert_eq!(req.model_version, VersionField::Number(7));
    }

    #[test]
    fn test_non_integer_version_numbers_are_invalid_requests() {
        for raw in ["1.5", "-1", "true", "null", "[1]"] {
            let body = format!(r#"{{"data": [[1]], "model_version": {}}}"#, raw);
            let req: InferenceRequest = serde_json::from_str(&body).unwrap();
            assert!(matches!(req.model_version, VersionField::Other(_)), "{}", raw);
            assert!(
                matches!(req.model_version.parse(), Err(InferenceError::InvalidRequest(_))),
                "{}",
                raw
            );
        }
    }
}
