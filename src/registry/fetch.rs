//! Artifact Fetch
//!
//! Read side of the registry. Keys are built from the version; nothing is
//! listed except for `list_versions`/`latest_version`.

use super::keys::{ArtifactKind, ArtifactLayout};
use super::metadata::ArtifactMetadata;
use super::versioner::VersionScan;
use super::RegistryError;
use crate::config::RegistryConfig;
use crate::storage::{list_all, ObjectStore};
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

/// Model and scaler payloads of one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBlobs {
    pub version: u64,
    pub model: Vec<u8>,
    pub scaler: Vec<u8>,
}

/// Which bundle members exist for a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleStatus {
    pub version: u64,
    pub present: Vec<ArtifactKind>,
    pub missing: Vec<ArtifactKind>,
}

impl BundleStatus {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// True when some but not all members exist
    pub fn is_partial(&self) -> bool {
        !self.present.is_empty() && !self.missing.is_empty()
    }
}

pub struct ArtifactFetcher<S: ObjectStore> {
    store: S,
    layout: ArtifactLayout,
}

impl<S: ObjectStore> ArtifactFetcher<S> {
    pub fn new(store: S, config: &RegistryConfig) -> Self {
        ArtifactFetcher {
            store,
            layout: ArtifactLayout::new(&config.prefix),
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Download the model and scaler of `version`
    pub async fn fetch(&self, version: u64) -> Result<ArtifactBlobs, RegistryError> {
        let (model, scaler) = tokio::try_join!(
            self.get_member(version, ArtifactKind::Model),
            self.get_member(version, ArtifactKind::Scaler),
        )?;

        tracing::debug!(version, model_bytes = model.len(), scaler_bytes = scaler.len(), "fetched artifacts");
        Ok(ArtifactBlobs {
            version,
            model,
            scaler,
        })
    }

    pub async fn metadata(&self, version: u64) -> Result<ArtifactMetadata, RegistryError> {
        let data = self.get_member(version, ArtifactKind::Metadata).await?;
        ArtifactMetadata::from_json(&data)
            .map_err(|e| RegistryError::encoding(&self.layout.metadata_key(version), e))
    }

    /// Versions with a model blob, ascending
    pub async fn list_versions(&self) -> Result<Vec<u64>, RegistryError> {
        let prefix = self.layout.model_listing_prefix();
        let listing = list_all(&self.store, &prefix)
            .await
            .map_err(|e| RegistryError::store(&prefix, e))?;
        Ok(VersionScan::from_keys(&self.layout, listing.iter().map(|m| m.key.as_str())).versions)
    }

    pub async fn latest_version(&self) -> Result<Option<u64>, RegistryError> {
        Ok(self.list_versions().await?.last().copied())
    }

    /// Report which of the four bundle blobs exist
    pub async fn bundle_status(&self, version: u64) -> Result<BundleStatus, RegistryError> {
        let mut status = BundleStatus {
            version,
            present: Vec::new(),
            missing: Vec::new(),
        };

        for kind in ArtifactKind::ALL {
            let key = self.layout.key(kind, version);
            let exists = self
                .store
                .exists(&key)
                .await
                .map_err(|e| RegistryError::store(&key, e))?;
            if exists {
                status.present.push(kind);
            } else {
                status.missing.push(kind);
            }
        }

        if status.is_partial() {
            tracing::warn!(version, missing = ?status.missing, "partial bundle");
        }
        Ok(status)
    }

    /// Write the model and scaler of `version` into `dir`
    ///
    /// Returns the local model and scaler paths.
    pub async fn download(
        &self,
        version: u64,
        dir: &Path,
    ) -> Result<(PathBuf, PathBuf), RegistryError> {
        let model = self.download_member(version, ArtifactKind::Model, dir).await?;
        let scaler = self.download_member(version, ArtifactKind::Scaler, dir).await?;
        tracing::info!(version, dir = %dir.display(), "downloaded artifacts");
        Ok((model, scaler))
    }

    async fn download_member(
        &self,
        version: u64,
        kind: ArtifactKind,
        dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        let key = self.layout.key(kind, version);
        let dest = dir.join(kind.file_name(version));
        self.store
            .download(&key, &dest)
            .await
            .map_err(|e| self.classify(version, &key, e))?;
        Ok(dest)
    }

    async fn get_member(&self, version: u64, kind: ArtifactKind) -> Result<Vec<u8>, RegistryError> {
        let key = self.layout.key(kind, version);
        if version == 0 {
            return Err(RegistryError::ArtifactNotFound { version, key });
        }
        self.store
            .get(&key)
            .await
            .map_err(|e| self.classify(version, &key, e))
    }

    fn classify(&self, version: u64, key: &str, err: IoError) -> RegistryError {
        if err.kind() == ErrorKind::NotFound {
            RegistryError::ArtifactNotFound {
                version,
                key: key.to_string(),
            }
        } else {
            RegistryError::store(key, err)
        }
    }
}
