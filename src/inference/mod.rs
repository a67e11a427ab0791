//! Inference Service
//!
//! `InferenceService::handle` takes a parsed request, runs the published
//! model for the requested version, and records every row in the result
//! ledger as one batch. `http` mounts it on an axum router.

pub mod http;
pub mod service;

pub use http::{router, serve};
pub use service::{InferenceRequest, InferenceResponse, InferenceService, VersionField};

use crate::ledger::LedgerError;
use crate::registry::RegistryError;
use crate::training::FeatureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid input row: {0}")]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("artifacts for version {version} are unusable: {reason}")]
    Artifact { version: u64, reason: String },

    #[error("recording results failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl InferenceError {
    /// The caller sent something we cannot run
    pub fn is_client_error(&self) -> bool {
        matches!(self, InferenceError::InvalidRequest(_) | InferenceError::Feature(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            InferenceError::Registry(RegistryError::ArtifactNotFound { .. })
        )
    }
}
