//! Object Store Layer
//!
//! Every artifact, dataset and ledger lives in an object store. This module
//! holds the store trait, its backends and the wrappers layered on top:
//!
//! ```text
//! caller → TimeoutObjectStore → {InMemory | LocalFs | S3}
//!                 (tests: SimulatedObjectStore for fault injection)
//! ```

pub mod object_store;
pub mod simulated_store;
pub mod timeout;
#[cfg(feature = "s3")]
pub mod s3_store;

pub use object_store::{
    InMemoryObjectStore, ListResult, LocalFsObjectStore, ObjectMeta, ObjectStore, StoreFuture,
    DEFAULT_PAGE_SIZE,
};
#[cfg(feature = "s3")]
pub use s3_store::S3ObjectStore;
pub use simulated_store::{SimulatedObjectStore, SimulatedStoreConfig, SimulatedStoreStats};
pub use timeout::TimeoutObjectStore;

use crate::config::{ObjectStoreType, StoreConfig};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::sync::Arc;

/// Store handle shared between components
pub type SharedStore = Arc<dyn ObjectStore>;

/// Drain every page of a listing
pub async fn list_all<S: ObjectStore + ?Sized>(store: &S, prefix: &str) -> IoResult<Vec<ObjectMeta>> {
    let mut objects = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = store.list(prefix, token.as_deref()).await?;
        objects.extend(page.objects);
        match page.continuation_token {
            Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
            Some(next) => {
                return Err(IoError::new(
                    ErrorKind::Other,
                    format!("listing of {:?} repeated continuation token {}", prefix, next),
                ))
            }
            None => break,
        }
    }

    Ok(objects)
}

/// Build the store described by `config`, bounded by its operation timeout
pub fn open_store(config: &StoreConfig) -> IoResult<SharedStore> {
    let timeout = config.op_timeout;
    let store: SharedStore = match config.store_type {
        ObjectStoreType::InMemory => {
            Arc::new(TimeoutObjectStore::new(InMemoryObjectStore::new(), timeout))
        }
        ObjectStoreType::LocalFs => {
            let path = config.local_path.clone().ok_or_else(|| {
                IoError::new(ErrorKind::InvalidInput, "local_path is required for a localfs store")
            })?;
            std::fs::create_dir_all(&path)?;
            Arc::new(TimeoutObjectStore::new(LocalFsObjectStore::new(path), timeout))
        }
        #[cfg(feature = "s3")]
        ObjectStoreType::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                IoError::new(ErrorKind::InvalidInput, "s3 settings are required for an s3 store")
            })?;
            Arc::new(TimeoutObjectStore::new(S3ObjectStore::new(s3)?, timeout))
        }
    };

    tracing::debug!(store_type = ?config.store_type, timeout_ms = timeout.as_millis() as u64, "opened object store");
    Ok(store)
}
