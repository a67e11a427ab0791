//! Versioned Artifact Registry
//!
//! Stores model bundles under integer versions:
//!
//! ```text
//! publish(model, scaler, accuracy)
//!   → list {prefix}/model_*     (VersionScan)
//!   → put_if_absent model_{v}   (claim; AlreadyExists → rescan, retry)
//!   → put scaler_{v}, metadata_{v}, model_af_{v}
//! ```
//!
//! Publishing is not atomic across blobs. A failure after the claim leaves a
//! partial bundle, reported as `RegistryError::PartialBundle` and visible
//! through `ArtifactFetcher::bundle_status`.

pub mod archive;
pub mod fetch;
pub mod keys;
pub mod metadata;
pub mod publisher;
pub mod versioner;

pub use archive::{ArchiveEntry, ArchiveError, ArchiveReader, ArchiveWriter, Compression};
pub use fetch::{ArtifactBlobs, ArtifactFetcher, BundleStatus};
pub use keys::{ArtifactKind, ArtifactLayout};
pub use metadata::ArtifactMetadata;
pub use publisher::{ArtifactPublisher, PublishedBundle};
pub use versioner::{next_version, parse_version_token, VersionScan};

use std::io::{Error as IoError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed version key {key}: {reason}")]
    MalformedVersionKey { key: String, reason: &'static str },

    #[error("publish of version {version} failed at {failed_key} after writing {written_keys:?}: {source}")]
    PartialBundle {
        version: u64,
        failed_key: String,
        written_keys: Vec<String>,
        #[source]
        source: IoError,
    },

    #[error("artifact {key} for version {version} not found")]
    ArtifactNotFound { version: u64, key: String },

    #[error("no free version after {attempts} claim attempts")]
    VersionContention { attempts: u32 },

    #[error("no version after {latest} fits in u64")]
    VersionsExhausted { latest: u64 },

    #[error("accuracy must be within [0, 1], got {0}")]
    InvalidAccuracy(f64),

    #[error("encoding error for {key}: {reason}")]
    Encoding { key: String, reason: String },

    #[error("object store error on {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: IoError,
    },
}

impl RegistryError {
    pub(crate) fn store(key: &str, source: IoError) -> Self {
        RegistryError::Store {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn encoding(key: &str, reason: impl std::fmt::Display) -> Self {
        RegistryError::Encoding {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the underlying store call hit its deadline
    pub fn is_timeout(&self) -> bool {
        match self {
            RegistryError::Store { source, .. } | RegistryError::PartialBundle { source, .. } => {
                source.kind() == ErrorKind::TimedOut
            }
            _ => false,
        }
    }
}
