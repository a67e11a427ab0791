//! Object Store Abstraction
//!
//! Trait-based abstraction over blob storage. Every artifact, metadata record
//! and ledger file goes through this trait, so backends can be swapped and
//! faults injected in tests.
//!
//! Implementations:
//! - `InMemoryObjectStore`: for unit tests and simulation
//! - `LocalFsObjectStore`: for development and local testing
//! - `S3ObjectStore`: for production (feature-gated)
//!
//! Errors are plain `std::io::Error`s. Callers rely on the kinds:
//! `NotFound` for missing keys, `AlreadyExists` for a lost conditional put,
//! `TimedOut` for a store that did not answer in time.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by every store operation
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = IoResult<T>> + Send + 'a>>;

/// Default number of keys returned per list page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key (path)
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Last modification timestamp (Unix ms)
    pub last_modified_ms: u64,
    /// ETag or content hash (optional)
    pub etag: Option<String>,
}

/// Result of a list operation
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Objects matching the prefix
    pub objects: Vec<ObjectMeta>,
    /// Continuation token for pagination (if more results exist)
    pub continuation_token: Option<String>,
}

/// Object store abstraction trait
///
/// No operation spans more than one key; there is no multi-key transaction.
/// `put_if_absent` is the only conditional write and is what version claims
/// are built on.
pub trait ObjectStore: Send + Sync + 'static {
    /// Put an object (create or overwrite)
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()>;

    /// Create an object only if the key is free.
    ///
    /// Fails with `ErrorKind::AlreadyExists` when the key is taken.
    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()>;

    /// Get an object's contents
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Check if an object exists
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Delete an object (idempotent)
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// List one page of objects with a prefix, sorted by key
    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult>;

    /// Get object metadata without downloading content
    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta>;

    /// Download an object into a local file, returning the byte count
    fn download<'a>(&'a self, key: &'a str, dest: &'a Path) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let data = self.get(key).await?;
            if let Some(parent) = dest.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(dest, &data).await?;
            Ok(data.len() as u64)
        })
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        (**self).put(key, data)
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        (**self).put_if_absent(key, data)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        (**self).get(key)
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        (**self).exists(key)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        (**self).delete(key)
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        (**self).list(prefix, continuation_token)
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        (**self).head(key)
    }

    fn download<'a>(&'a self, key: &'a str, dest: &'a Path) -> StoreFuture<'a, u64> {
        (**self).download(key, dest)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn not_found(key: &str) -> IoError {
    IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key))
}

// ============================================================================
// InMemoryObjectStore - For tests and simulation
// ============================================================================

/// In-memory object store for unit tests and deterministic simulation
///
/// Clones share the same underlying map, like handles to one bucket.
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    data: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified_ms: u64,
}

impl InMemoryObjectStore {
    /// Create a new in-memory object store
    pub fn new() -> Self {
        InMemoryObjectStore {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a smaller list page size (for exercising pagination)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Insert an object with an explicit modification time (for testing)
    pub fn insert_with_modified(&self, key: &str, data: &[u8], last_modified_ms: u64) {
        self.data.write().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                last_modified_ms,
            },
        );
    }

    /// All keys currently stored (for testing)
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Get the number of stored objects (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn meta(key: &str, obj: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size_bytes: obj.data.len() as u64,
            last_modified_ms: obj.last_modified_ms,
            etag: Some(format!("{:08x}", crc32fast::hash(&obj.data))),
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let obj = StoredObject {
                data: data.to_vec(),
                last_modified_ms: now_ms(),
            };
            self.data.write().insert(key.to_string(), obj);
            Ok(())
        })
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.data.write();
            if map.contains_key(key) {
                return Err(IoError::new(
                    ErrorKind::AlreadyExists,
                    format!("Object already exists: {}", key),
                ));
            }
            map.insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    last_modified_ms: now_ms(),
                },
            );
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| obj.data.clone())
                .ok_or_else(|| not_found(key))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.data.read().contains_key(key)) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.data.write().remove(key);
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        Box::pin(async move {
            let data = self.data.read();
            // The token is the last key of the previous page; BTreeMap keeps keys sorted.
            let mut matching = data
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .filter(|(k, _)| continuation_token.map_or(true, |t| k.as_str() > t));

            let objects: Vec<ObjectMeta> = matching
                .by_ref()
                .take(self.page_size)
                .map(|(k, v)| Self::meta(k, v))
                .collect();

            let continuation_token = if matching.next().is_some() {
                objects.last().map(|o| o.key.clone())
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
            self.data
                .read()
                .get(key)
                .map(|obj| Self::meta(key, obj))
                .ok_or_else(|| not_found(key))
        })
    }
}

// ============================================================================
// LocalFsObjectStore - For development
// ============================================================================

/// Local filesystem object store for development and testing
///
/// Keys map to paths below `base_path`; `/` in a key becomes a directory.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_path: PathBuf,
}

impl LocalFsObjectStore {
    /// Create a new local filesystem object store
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsObjectStore { base_path }
    }

    /// Get the full path for a key
    fn full_path(&self, key: &str) -> IoResult<PathBuf> {
        if key.split('/').any(|part| part == "..") {
            return Err(IoError::new(
                ErrorKind::InvalidInput,
                format!("Key escapes store root: {}", key),
            ));
        }
        Ok(self.base_path.join(key))
    }

    /// Ensure parent directories exist
    async fn ensure_parent(path: &Path) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn modified_ms(metadata: &std::fs::Metadata) -> u64 {
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn walk_dir(dir: &Path, base: &Path, prefix: &str, objects: &mut Vec<ObjectMeta>) -> IoResult<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                Self::walk_dir(&path, base, prefix, objects)?;
            } else if path.is_file() {
                let Ok(relative) = path.strip_prefix(base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.starts_with(prefix) {
                    let metadata = std::fs::metadata(&path)?;
                    objects.push(ObjectMeta {
                        key,
                        size_bytes: metadata.len(),
                        last_modified_ms: Self::modified_ms(&metadata),
                        etag: None,
                    });
                }
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalFsObjectStore {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key)?;
            Self::ensure_parent(&path).await?;
            tokio::fs::write(&path, data).await
        })
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            use tokio::io::AsyncWriteExt;

            let path = self.full_path(key)?;
            Self::ensure_parent(&path).await?;
            // create_new is atomic: exactly one concurrent creator wins.
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            file.write_all(data).await?;
            file.sync_all().await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.full_path(key)?;
            tokio::fs::read(&path).await
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.full_path(key)?;
            tokio::fs::try_exists(&path).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let path = self.full_path(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already deleted
                Err(e) => Err(e),
            }
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        _continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        Box::pin(async move {
            let base = self.base_path.clone();
            if !base.exists() {
                return Ok(ListResult::default());
            }

            let mut objects = Vec::new();
            Self::walk_dir(&base, &base, prefix, &mut objects)?;
            objects.sort_by(|a, b| a.key.cmp(&b.key));

            Ok(ListResult {
                objects,
                continuation_token: None,
            })
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let path = self.full_path(key)?;
            let metadata = tokio::fs::metadata(&path).await?;
            Ok(ObjectMeta {
                key: key.to_string(),
                size_bytes: metadata.len(),
                last_modified_ms: Self::modified_ms(&metadata),
                etag: None,
            })
        })
    }
}
