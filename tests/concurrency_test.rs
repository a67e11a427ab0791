//! Concurrent writers against the ledger and the registry
//!
//! ## Test Categories
//!
//! - **Lost update**: two direct `ResultLedger` appends forced to read the
//!   same content; one row disappears. This is the known limitation of the
//!   direct path, asserted as such.
//! - **Serialized writer**: the same interleaving through `LedgerWriter`
//!   keeps every row.
//! - **Fault seeds**: writer appends under injected store faults; every
//!   acknowledged row is in the ledger and no failed row is.
//! - **Version claims**: concurrent publishers on a filesystem store get
//!   distinct versions.

use chrono::{TimeZone, Utc};
use model_vault::clock::{SharedClock, SimulatedClock};
use model_vault::config::{LedgerConfig, RegistryConfig, StoreConfig};
use model_vault::ledger::{spawn_ledger_writer, LedgerRecord};
use model_vault::storage::{
    open_store, InMemoryObjectStore, ListResult, ObjectMeta, ObjectStore, SimulatedObjectStore,
    SimulatedStoreConfig, StoreFuture,
};
use model_vault::{ArtifactFetcher, ArtifactPublisher, ResultLedger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

// =============================================================================
// Interleaving store
// =============================================================================

/// Holds every read of `key` until a second reader arrives, or until
/// `max_wait` passes when nobody else is reading.
struct RendezvousStore {
    inner: InMemoryObjectStore,
    key: String,
    barrier: Barrier,
    max_wait: Option<Duration>,
}

impl RendezvousStore {
    fn new(inner: InMemoryObjectStore, key: &str, max_wait: Option<Duration>) -> Self {
        RendezvousStore {
            inner,
            key: key.to_string(),
            barrier: Barrier::new(2),
            max_wait,
        }
    }
}

impl ObjectStore for RendezvousStore {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        self.inner.put(key, data)
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        self.inner.put_if_absent(key, data)
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let data = self.inner.get(key).await?;
            if key == self.key {
                match self.max_wait {
                    Some(limit) => {
                        let _ = tokio::time::timeout(limit, self.barrier.wait()).await;
                    }
                    None => {
                        self.barrier.wait().await;
                    }
                }
            }
            Ok(data)
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        self.inner.exists(key)
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.inner.delete(key)
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        self.inner.list(prefix, continuation_token)
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        self.inner.head(key)
    }
}

fn rec(x: f64) -> LedgerRecord {
    LedgerRecord::new(
        vec![x, x * 2.0],
        vec![0.25, 0.75],
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    )
}

async fn seeded_ledger(first: &LedgerRecord) -> InMemoryObjectStore {
    let store = InMemoryObjectStore::new();
    ResultLedger::new(store.clone(), &LedgerConfig::default())
        .append(1, first)
        .await
        .unwrap();
    store
}

// =============================================================================
// Lost update on the direct path
// =============================================================================

#[tokio::test]
async fn test_direct_appends_lose_a_row_when_interleaved() {
    let inner = seeded_ledger(&rec(0.0)).await;
    let ledger = ResultLedger::new(
        RendezvousStore::new(inner.clone(), "results_1.csv", None),
        &LedgerConfig::default(),
    );

    // Both appends read [r0] before either writes.
    let (r1, r2) = (rec(1.0), rec(2.0));
    let (a, b) = tokio::join!(ledger.append(1, &r1), ledger.append(1, &r2));
    a.unwrap();
    b.unwrap();

    let rows = ResultLedger::new(inner, &LedgerConfig::default())
        .read(1)
        .await
        .unwrap();
    // Known limitation: three appends acknowledged, two rows stored.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], rec(0.0));
}

#[tokio::test]
async fn test_sequential_direct_appends_keep_order() {
    let store = seeded_ledger(&rec(0.0)).await;
    let ledger = ResultLedger::new(store, &LedgerConfig::default());

    ledger.append(1, &rec(1.0)).await.unwrap();
    ledger.append(1, &rec(1.0)).await.unwrap();

    let rows = ledger.read(1).await.unwrap();
    assert_eq!(rows, vec![rec(0.0), rec(1.0), rec(1.0)]);
}

// =============================================================================
// Serialized writer
// =============================================================================

#[tokio::test]
async fn test_writer_keeps_both_rows_under_same_interleaving() {
    let inner = seeded_ledger(&rec(0.0)).await;
    let store = RendezvousStore::new(inner.clone(), "results_1.csv", Some(Duration::from_millis(50)));
    let (writer, tasks) = spawn_ledger_writer(ResultLedger::new(store, &LedgerConfig::default()), 2);

    let (a, b) = tokio::join!(writer.append(1, rec(1.0)), writer.append(1, rec(2.0)));
    a.unwrap();
    b.unwrap();
    writer.shutdown().await;
    for t in tasks {
        t.await.unwrap();
    }

    let rows = ResultLedger::new(inner, &LedgerConfig::default())
        .read(1)
        .await
        .unwrap();
    assert_eq!(rows, vec![rec(0.0), rec(1.0), rec(2.0)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writer_acknowledged_rows_survive_faults() {
    for seed in 0..16u64 {
        let config = SimulatedStoreConfig {
            put_fail_prob: 0.1,
            get_fail_prob: 0.1,
            list_fail_prob: 0.0,
            timeout_prob: 0.05,
            latency_range_us: (0, 300),
            fail_puts_after: None,
            fail_put_key_containing: None,
        };
        let store = SimulatedObjectStore::new(InMemoryObjectStore::new(), seed, config);
        let (writer, tasks) =
            spawn_ledger_writer(ResultLedger::new(store.clone(), &LedgerConfig::default()), 3);

        let mut handles = Vec::new();
        for i in 0..30u64 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                let version = 1 + i % 3;
                (version, writer.append(version, rec(i as f64)).await.is_ok())
            }));
        }

        let mut acknowledged = [0usize; 3];
        for h in handles {
            let (version, ok) = h.await.unwrap();
            if ok {
                acknowledged[(version - 1) as usize] += 1;
            }
        }
        writer.shutdown().await;
        for t in tasks {
            t.await.unwrap();
        }

        let reader = ResultLedger::new(store.inner().clone(), &LedgerConfig::default());
        for version in 1..=3u64 {
            let rows = reader.read(version).await.unwrap();
            assert_eq!(
                rows.len(),
                acknowledged[(version - 1) as usize],
                "seed {} version {}",
                seed,
                version
            );
        }
    }
}

// =============================================================================
// Version claims
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_on_filesystem_get_distinct_versions() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&StoreConfig::local(dir.path().to_path_buf())).unwrap();
    let clock: SharedClock = Arc::new(SimulatedClock::new(1_709_294_400_000));
    let config = RegistryConfig {
        max_claim_attempts: 16,
        ..RegistryConfig::default()
    };
    let publisher = Arc::new(ArtifactPublisher::new(store.clone(), &config, clock));

    let mut handles = Vec::new();
    for i in 0..6u8 {
        let publisher = Arc::clone(&publisher);
        handles.push(tokio::spawn(async move {
            let model = vec![i; 8];
            let bundle = publisher.publish(&model, b"scaler", 0.5).await.unwrap();
            (bundle.version, model)
        }));
    }

    let mut published = Vec::new();
    for h in handles {
        published.push(h.await.unwrap());
    }
    let mut versions: Vec<u64> = published.iter().map(|(v, _)| *v).collect();
    versions.sort_unstable();
    assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);

    // Each version holds the model of the publisher that claimed it
    let fetcher = ArtifactFetcher::new(store, &config);
    for (version, model) in published {
        assert_eq!(fetcher.fetch(version).await.unwrap().model, model);
        assert!(fetcher.bundle_status(version).await.unwrap().is_complete());
    }
}
