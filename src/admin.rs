//! Store cleanup
//!
//! Deletes every object under a prefix, including every published version
//! and ledger. Irreversible; there is no confirmation step.

use crate::storage::{list_all, ObjectStore};
use std::io::Result as IoResult;

/// Delete every object under `prefix`, returning how many were removed
pub async fn empty_store<S: ObjectStore + ?Sized>(store: &S, prefix: &str) -> IoResult<usize> {
    let objects = list_all(store, prefix).await?;

    let mut deleted = 0;
    for object in &objects {
        store.delete(&object.key).await?;
        deleted += 1;
    }

    tracing::info!(prefix, deleted, "emptied store");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryObjectStore, SimulatedObjectStore, SimulatedStoreConfig};

    #[tokio::test]
    async fn test_empty_everything() {
        let store = InMemoryObjectStore::new().with_page_size(2);
        for key in ["models/model_1.bin", "models/scaler_1.bin", "results_1.csv", "data.csv", "x"] {
            store.put(key, b"payload").await.unwrap();
        }

        assert_eq!(empty_store(&store, "").await.unwrap(), 5);
        assert!(store.is_empty());
        assert_eq!(empty_store(&store, "").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_prefix_only() {
        let store = InMemoryObjectStore::new();
        store.put("models/model_1.bin", b"m").await.unwrap();
        store.put("models/model_2.bin", b"m").await.unwrap();
        store.put("results_1.csv", b"r").await.unwrap();

        assert_eq!(empty_store(&store, "models/").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["results_1.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_list_failure_deletes_nothing() {
        let mut config = SimulatedStoreConfig::no_faults();
        config.list_fail_prob = 1.0;
        let store = SimulatedObjectStore::new(InMemoryObjectStore::new(), 3, config);
        store.inner().put("a", b"1").await.unwrap();

        assert!(empty_store(&store, "").await.is_err());
        assert_eq!(store.inner().len(), 1);
    }
}
