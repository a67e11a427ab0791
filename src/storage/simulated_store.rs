//! Simulated Object Store with Fault Injection
//!
//! Wraps another store and injects failures, timeouts and latency from a
//! seeded RNG, so a failing run can be replayed from its seed. Besides the
//! probabilistic faults, `fail_puts_after` and `fail_put_key_containing`
//! inject deterministic write failures for reproducing partial bundles.

use crate::storage::object_store::{ListResult, ObjectMeta, ObjectStore, StoreFuture};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Probability of PUT operation failure
    pub put_fail_prob: f64,
    /// Probability of GET operation failure
    pub get_fail_prob: f64,
    /// Probability of LIST operation failure
    pub list_fail_prob: f64,
    /// Probability of operation timeout
    pub timeout_prob: f64,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
    /// Fail every write once this many writes have succeeded
    pub fail_puts_after: Option<u64>,
    /// Fail every write whose key contains this fragment
    pub fail_put_key_containing: Option<String>,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.01,             // 1%
            get_fail_prob: 0.01,             // 1%
            list_fail_prob: 0.01,            // 1%
            timeout_prob: 0.005,             // 0.5%
            latency_range_us: (100, 10_000), // 0.1ms - 10ms
            fail_puts_after: None,
            fail_put_key_containing: None,
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.05,
            get_fail_prob: 0.05,
            list_fail_prob: 0.05,
            timeout_prob: 0.02,
            latency_range_us: (1_000, 20_000),
            fail_puts_after: None,
            fail_put_key_containing: None,
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            put_fail_prob: 0.0,
            get_fail_prob: 0.0,
            list_fail_prob: 0.0,
            timeout_prob: 0.0,
            latency_range_us: (0, 0),
            fail_puts_after: None,
            fail_put_key_containing: None,
        }
    }

    /// No random faults; writes start failing after `n` successes
    pub fn fail_after_puts(n: u64) -> Self {
        SimulatedStoreConfig {
            fail_puts_after: Some(n),
            ..Self::no_faults()
        }
    }

    /// No random faults; writes to keys containing `fragment` fail
    pub fn fail_puts_matching(fragment: &str) -> Self {
        SimulatedStoreConfig {
            fail_put_key_containing: Some(fragment.to_string()),
            ..Self::no_faults()
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub put_attempts: u64,
    pub put_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub list_attempts: u64,
    pub list_failures: u64,
    pub timeouts: u64,
    pub successful_puts: u64,
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
}

/// Simulated object store that wraps another store and injects faults
#[derive(Clone)]
pub struct SimulatedObjectStore<S: ObjectStore> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

enum Op {
    Put,
    Get,
    List,
    Other,
}

impl<S: ObjectStore> SimulatedObjectStore<S> {
    /// Create a new simulated store seeded with `seed`
    pub fn new(inner_store: S, seed: u64, config: SimulatedStoreConfig) -> Self {
        SimulatedObjectStore {
            inner_store,
            config,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: SimulatedStoreStats::default(),
            })),
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    /// Access the wrapped store (bypasses fault injection)
    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Decide the fate of one operation; returns the latency to apply.
    fn roll(&self, op: Op, key: &str) -> Result<Duration, IoError> {
        let mut s = self.state.lock();
        let config = &self.config;

        match op {
            Op::Put => s.stats.put_attempts += 1,
            Op::Get => s.stats.get_attempts += 1,
            Op::List => s.stats.list_attempts += 1,
            Op::Other => {}
        }

        if config.timeout_prob > 0.0 && s.rng.gen_bool(config.timeout_prob) {
            s.stats.timeouts += 1;
            return Err(IoError::new(ErrorKind::TimedOut, "simulated timeout"));
        }

        let fail = match op {
            Op::Put => {
                let deterministic = config
                    .fail_puts_after
                    .map_or(false, |n| s.stats.successful_puts >= n)
                    || config
                        .fail_put_key_containing
                        .as_deref()
                        .map_or(false, |fragment| key.contains(fragment));
                deterministic
                    || (config.put_fail_prob > 0.0 && s.rng.gen_bool(config.put_fail_prob))
            }
            Op::Get => config.get_fail_prob > 0.0 && s.rng.gen_bool(config.get_fail_prob),
            Op::List => config.list_fail_prob > 0.0 && s.rng.gen_bool(config.list_fail_prob),
            Op::Other => false,
        };

        if fail {
            let what = match op {
                Op::Put => {
                    s.stats.put_failures += 1;
                    "put"
                }
                Op::Get => {
                    s.stats.get_failures += 1;
                    "get"
                }
                Op::List => {
                    s.stats.list_failures += 1;
                    "list"
                }
                Op::Other => "op",
            };
            return Err(IoError::new(
                ErrorKind::Other,
                format!("simulated {} failure: {}", what, key),
            ));
        }

        let (min, max) = config.latency_range_us;
        let latency_us = if max > min {
            s.rng.gen_range(min..max)
        } else {
            min
        };
        Ok(Duration::from_micros(latency_us))
    }

    fn record_put_success(&self) {
        self.state.lock().stats.successful_puts += 1;
    }
}

async fn delay(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

impl<S: ObjectStore> ObjectStore for SimulatedObjectStore<S> {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let latency = self.roll(Op::Put, key)?;
            delay(latency).await;
            self.inner_store.put(key, data).await?;
            self.record_put_success();
            Ok(())
        })
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let latency = self.roll(Op::Put, key)?;
            delay(latency).await;
            self.inner_store.put_if_absent(key, data).await?;
            self.record_put_success();
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let latency = self.roll(Op::Get, key)?;
            delay(latency).await;
            self.inner_store.get(key).await
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let latency = self.roll(Op::Other, key)?;
            delay(latency).await;
            self.inner_store.exists(key).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let latency = self.roll(Op::Other, key)?;
            delay(latency).await;
            self.inner_store.delete(key).await
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        Box::pin(async move {
            let latency = self.roll(Op::List, prefix)?;
            delay(latency).await;
            self.inner_store.list(prefix, continuation_token).await
        })
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        Box::pin(async move {
            let latency = self.roll(Op::Other, key)?;
            delay(latency).await;
            self.inner_store.head(key).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;

    #[tokio::test]
    async fn test_no_faults_passes_through() {
        let store = SimulatedObjectStore::new(
            InMemoryObjectStore::new(),
            7,
            SimulatedStoreConfig::no_faults(),
        );

        for i in 0..50 {
            store.put(&format!("k{}", i), b"v").await.unwrap();
        }
        let stats = store.stats();
        assert_eq!(stats.put_attempts, 50);
        assert_eq!(stats.put_failures, 0);
        assert_eq!(store.inner().len(), 50);
    }

    #[tokio::test]
    async fn test_fail_after_puts() {
        let store = SimulatedObjectStore::new(
            InMemoryObjectStore::new(),
            1,
            SimulatedStoreConfig::fail_after_puts(2),
        );

        store.put("a", b"1").await.unwrap();
        store.put("b", b"2").await.unwrap();
        assert!(store.put("c", b"3").await.is_err());
        assert!(!store.inner().exists("c").await.unwrap());
        // Reads still work
        assert_eq!(store.get("a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_fail_puts_matching_key() {
        let store = SimulatedObjectStore::new(
            InMemoryObjectStore::new(),
            1,
            SimulatedStoreConfig::fail_puts_matching("metadata_"),
        );

        store.put("models/model_1.bin", b"m").await.unwrap();
        let err = store.put("models/metadata_1.json", b"{}").await.unwrap_err();
        assert!(err.to_string().contains("metadata_1"));
    }

    #[tokio::test]
    async fn test_same_seed_same_faults() {
        async fn run(seed: u64) -> Vec<bool> {
            let mut config = SimulatedStoreConfig::high_chaos();
            config.latency_range_us = (0, 0);
            let store = SimulatedObjectStore::new(InMemoryObjectStore::new(), seed, config);
            let mut outcomes = Vec::new();
            for i in 0..200 {
                outcomes.push(store.put(&format!("k{}", i), b"v").await.is_ok());
            }
            outcomes
        }

        assert_eq!(run(42).await, run(42).await);
    }
}
