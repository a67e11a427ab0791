//! Artifact Publisher
//!
//! Assigns a version and writes the four bundle blobs. The model blob is the
//! claim: it is written create-only, so two publishers racing for the same
//! number cannot both win. The loser rescans and tries the next number.

use super::archive::{ArchiveWriter, Compression};
use super::keys::{ArtifactKind, ArtifactLayout};
use super::metadata::ArtifactMetadata;
use super::versioner::VersionScan;
use super::RegistryError;
use crate::clock::SharedClock;
use crate::config::RegistryConfig;
use crate::storage::{list_all, ObjectStore};
use std::io::ErrorKind;

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedBundle {
    pub version: u64,
    /// Keys written, in write order
    pub keys: Vec<String>,
    pub metadata: ArtifactMetadata,
}

pub struct ArtifactPublisher<S: ObjectStore> {
    store: S,
    layout: ArtifactLayout,
    max_claim_attempts: u32,
    compression: Compression,
    clock: SharedClock,
}

impl<S: ObjectStore> ArtifactPublisher<S> {
    pub fn new(store: S, config: &RegistryConfig, clock: SharedClock) -> Self {
        debug_assert!(config.max_claim_attempts > 0);
        ArtifactPublisher {
            store,
            layout: ArtifactLayout::new(&config.prefix),
            max_claim_attempts: config.max_claim_attempts.max(1),
            compression: Compression::from_level(config.archive_zstd_level),
            clock,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Publish a new bundle and return its version
    pub async fn publish(
        &self,
        model: &[u8],
        scaler: &[u8],
        accuracy: f64,
    ) -> Result<PublishedBundle, RegistryError> {
        if !(0.0..=1.0).contains(&accuracy) {
            return Err(RegistryError::InvalidAccuracy(accuracy));
        }

        let version = self.claim_version(model).await?;
        let mut written = vec![self.layout.model_key(version)];

        let scaler_key = self.layout.scaler_key(version);
        self.put_member(version, &scaler_key, scaler, &mut written)
            .await?;

        let metadata = ArtifactMetadata {
            version,
            scaler: scaler_key,
            accuracy,
            training_date: self.clock.today(),
        };
        let metadata_key = self.layout.metadata_key(version);
        let metadata_json = metadata
            .to_json()
            .map_err(|e| RegistryError::encoding(&metadata_key, e))?;
        self.put_member(version, &metadata_key, &metadata_json, &mut written)
            .await?;

        let archive_key = self.layout.archive_key(version);
        let archive = self
            .build_archive(version, model, scaler, &metadata_json)
            .map_err(|e| RegistryError::encoding(&archive_key, e))?;
        self.put_member(version, &archive_key, &archive, &mut written)
            .await?;

        tracing::info!(
            version,
            accuracy,
            model_bytes = model.len(),
            scaler_bytes = scaler.len(),
            "published artifact bundle"
        );

        Ok(PublishedBundle {
            version,
            keys: written,
            metadata,
        })
    }

    /// Reserve a version by creating its model blob
    async fn claim_version(&self, model: &[u8]) -> Result<u64, RegistryError> {
        let listing_prefix = self.layout.model_listing_prefix();

        for attempt in 1..=self.max_claim_attempts {
            let listing = list_all(&self.store, &listing_prefix)
                .await
                .map_err(|e| RegistryError::store(&listing_prefix, e))?;
            let scan = VersionScan::from_keys(&self.layout, listing.iter().map(|m| m.key.as_str()));
            let version = scan.next_version()?;
            let model_key = self.layout.model_key(version);

            match self.store.put_if_absent(&model_key, model).await {
                Ok(()) => {
                    tracing::debug!(version, attempt, "claimed version");
                    return Ok(version);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(version, attempt, "version already claimed, rescanning");
                }
                Err(e) => return Err(RegistryError::store(&model_key, e)),
            }
        }

        Err(RegistryError::VersionContention {
            attempts: self.max_claim_attempts,
        })
    }

    async fn put_member(
        &self,
        version: u64,
        key: &str,
        data: &[u8],
        written: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        match self.store.put(key, data).await {
            Ok(()) => {
                written.push(key.to_string());
                Ok(())
            }
            Err(source) => {
                tracing::error!(version, key, written = ?written, error = %source, "bundle left partial");
                Err(RegistryError::PartialBundle {
                    version,
                    failed_key: key.to_string(),
                    written_keys: written.clone(),
                    source,
                })
            }
        }
    }

    fn build_archive(
        &self,
        version: u64,
        model: &[u8],
        scaler: &[u8],
        metadata_json: &[u8],
    ) -> Result<Vec<u8>, super::ArchiveError> {
        let mut writer = ArchiveWriter::new(self.compression);
        writer.add(&ArtifactKind::Model.file_name(version), model)?;
        writer.add(&ArtifactKind::Scaler.file_name(version), scaler)?;
        writer.add(&ArtifactKind::Metadata.file_name(version), metadata_json)?;
        writer.finish()
    }
}
