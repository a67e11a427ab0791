//! HTTP adapter
//!
//! - `POST /inference` → `InferenceResponse` JSON
//! - `GET /health` → `ok`
//!
//! Errors come back as `{"error": "..."}` with 400 for bad input (including
//! bodies that do not deserialize), 404 for an unknown version, 500 for
//! everything else.

use super::service::{InferenceRequest, InferenceResponse, InferenceService};
use super::InferenceError;
use crate::storage::ObjectStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

impl InferenceError {
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "inference failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "inference rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router<S: ObjectStore>(service: Arc<InferenceService<S>>) -> Router {
    Router::new()
        .route("/inference", post(run_inference::<S>))
        .route("/health", get(|| async { "ok" }))
        .with_state(service)
}

async fn run_inference<S: ObjectStore>(
    State(service): State<Arc<InferenceService<S>>>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<InferenceResponse>, InferenceError> {
    let Json(request) = payload.map_err(|e| InferenceError::InvalidRequest(e.body_text()))?;
    service.handle(request).await.map(Json)
}

/// Serve until `shutdown` resolves
pub async fn serve<S: ObjectStore>(
    listener: TcpListener,
    service: Arc<InferenceService<S>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "inference server listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SharedClock, SimulatedClock};
    use crate::config::{LedgerConfig, RegistryConfig};
    use crate::ledger::{ResultLedger, spawn_ledger_writer};
    use crate::registry::{ArtifactFetcher, ArtifactPublisher};
    use crate::storage::InMemoryObjectStore;
    use crate::training::{FeatureEncoder, MinMaxScaler, NearestCentroid, Preprocessor};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app() -> (Router, InMemoryObjectStore) {
        let clock: SharedClock = Arc::new(SimulatedClock::new(1_700_000_000_000));
        let artifacts = InMemoryObjectStore::new();
        let results = InMemoryObjectStore::new();

        let rows = vec![vec!["0".to_string()], vec!["10".to_string()]];
        let encoder = FeatureEncoder::fit(&["x".to_string()], &rows);
        let scaler = MinMaxScaler::fit(&[vec![0.0], vec![10.0]]);
        let model = NearestCentroid::fit(vec!["a".into(), "b".into()], &[vec![0.0], vec![1.0]], &[0, 1]);
        ArtifactPublisher::new(artifacts.clone(), &RegistryConfig::default(), clock.clone())
            .publish(
                &model.to_json().unwrap(),
                &Preprocessor { encoder, scaler }.to_json().unwrap(),
                1.0,
            )
            .await
            .unwrap();

        let (writer, _tasks) =
            spawn_ledger_writer(ResultLedger::new(results.clone(), &LedgerConfig::default()), 2);
        let service = InferenceService::new(
            ArtifactFetcher::new(artifacts, &RegistryConfig::default()),
            Arc::new(writer),
            clock,
        );
        (router(Arc::new(service)), results)
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/inference")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_inference_ok() {
        let (app, results) = app().await;
        let response = app
            .oneshot(post_json(r#"{"data": [[1], [9]], "model_version": "1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["model_version"], 1);
        assert_eq!(body["recorded"], 2);
        assert_eq!(body["probabilities"].as_array().unwrap().len(), 2);
        assert_eq!(results.keys(), vec!["results_1.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let (app, results) = app().await;

        let missing = app
            .clone()
            .oneshot(post_json(r#"{"data": [[1]], "model_version": 9}"#))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(body_json(missing).await["error"].as_str().unwrap().contains("not found"));

        let bad = app
            .clone()
            .oneshot(post_json(r#"{"data": [[1, 2]], "model_version": 1}"#))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let malformed = app.oneshot(post_json(r#"{"data": 5}"#)).await.unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_bad_model_version_is_400_whatever_its_json_type() {
        let (app, results) = app().await;

        for version in ["1.5", "-1", r#""1.5""#, r#""0""#, "0", "null"] {
            let body = format!(r#"{{"data": [[1]], "model_version": {}}}"#, version);
            let response = app.clone().oneshot(post_json(&body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "model_version {}", version);
            assert!(body_json(response).await["error"].is_string());
        }

        let missing = app
            .oneshot(post_json(r#"{"data": [[1]]}"#))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        assert!(results.is_empty());
    }
}
