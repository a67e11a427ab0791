//! S3 Object Store Implementation
//!
//! Provides an S3-compatible object store for production use.
//! Uses the `object_store` crate from the Arrow ecosystem.
//!
//! Supports:
//! - AWS S3
//! - S3-compatible services (MinIO, LocalStack, etc.)
//! - Custom endpoints
//!
//! Credentials come from `S3Config`, never from the process environment.

use crate::config::S3Config;
use crate::storage::object_store::{ListResult, ObjectMeta, ObjectStore, StoreFuture};
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore as ObjectStoreTrait, PutMode, PutOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::sync::Arc;

/// Keys returned per list page
const PAGE_SIZE: usize = 1000;

/// S3 Object Store for production deployments
#[derive(Clone)]
pub struct S3ObjectStore {
    store: Arc<dyn ObjectStoreTrait>,
    prefix: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store for one bucket
    pub fn new(config: &S3Config) -> IoResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);

        // Use custom endpoint for S3-compatible services (MinIO)
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        // Needed for create-only puts (version claims)
        if config.conditional_put {
            builder = builder.with_conditional_put(S3ConditionalPut::ETagMatch);
        }

        let store = builder.build().map_err(|e| {
            IoError::new(
                ErrorKind::InvalidInput,
                format!("Failed to create S3 store: {}", e),
            )
        })?;

        Ok(S3ObjectStore {
            store: Arc::new(store),
            prefix: config.prefix.clone(),
        })
    }

    /// Create from an existing object store (for testing)
    pub fn from_store(store: Arc<dyn ObjectStoreTrait>, prefix: String) -> Self {
        S3ObjectStore { store, prefix }
    }

    /// Get the full path with prefix
    fn full_path(&self, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, key))
        }
    }

    /// Strip prefix from path
    fn strip_prefix(&self, path: &ObjectPath) -> String {
        let path_str = path.to_string();
        if self.prefix.is_empty() {
            path_str
        } else {
            let prefix_with_slash = format!("{}/", self.prefix);
            path_str
                .strip_prefix(&prefix_with_slash)
                .unwrap_or(&path_str)
                .to_string()
        }
    }

    /// Convert object_store errors to IoError
    fn map_error(err: object_store::Error) -> IoError {
        match &err {
            object_store::Error::NotFound { .. } => IoError::new(ErrorKind::NotFound, err.to_string()),
            object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
                IoError::new(ErrorKind::AlreadyExists, err.to_string())
            }
            object_store::Error::NotImplemented => IoError::new(ErrorKind::Unsupported, err.to_string()),
            _ => IoError::new(ErrorKind::Other, err.to_string()),
        }
    }

    fn to_meta(&self, meta: object_store::ObjectMeta) -> ObjectMeta {
        ObjectMeta {
            key: self.strip_prefix(&meta.location),
            size_bytes: meta.size as u64,
            last_modified_ms: meta.last_modified.timestamp_millis().try_into().unwrap_or(0),
            etag: meta.e_tag,
        }
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ObjectStore for S3ObjectStore {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            self.store
                .put(&path, bytes::Bytes::copy_from_slice(data).into())
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            let opts = PutOptions {
                mode: PutMode::Create,
                ..Default::default()
            };
            self.store
                .put_opts(&path, bytes::Bytes::copy_from_slice(data).into(), opts)
                .await
                .map_err(Self::map_error)?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.full_path(key);
            let result = self.store.get(&path).await.map_err(Self::map_error)?;
            let data = result.bytes().await.map_err(Self::map_error)?;
            Ok(data.to_vec())
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.full_path(key);
            match self.store.head(&path).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key);
            // S3 delete is idempotent - ignore not found errors
            match self.store.delete(&path).await {
                Ok(()) => Ok(()),
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(e) => Err(Self::map_error(e)),
            }
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        Box::pin(async move {
            use futures::TryStreamExt;

            // object_store lists by path segment, so list the parent
            // directory and filter on the raw key prefix.
            let dir = match prefix.rfind('/') {
                Some(idx) => &prefix[..idx],
                None => "",
            };
            let list_root = if dir.is_empty() && self.prefix.is_empty() {
                None
            } else {
                Some(self.full_path(dir))
            };

            let offset: usize = continuation_token
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);

            let mut all_objects: Vec<ObjectMeta> = self
                .store
                .list(list_root.as_ref())
                .map_ok(|meta| self.to_meta(meta))
                .try_filter(|meta| futures::future::ready(meta.key.starts_with(prefix)))
                .try_collect()
                .await
                .map_err(Self::map_error)?;
            all_objects.sort_by(|a, b| a.key.cmp(&b.key));

            let total = all_objects.len();
            let objects: Vec<ObjectMeta> = all_objects
                .into_iter()
                .skip(offset)
                .take(PAGE_SIZE)
                .collect();

            let next = offset + objects.len();
            let continuation_token = if next < total {
                Some(next.to_string())
            } else {
                None
            };

            Ok(ListResult {
                objects,
                continuation_token,
            })
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let path = self.full_path(key);
            let meta = self.store.head(&path).await.map_err(Self::map_error)?;
            let mut meta = self.to_meta(meta);
            meta.key = key.to_string();
            Ok(meta)
        })
    }
}
