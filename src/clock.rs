//! Clock abstraction
//!
//! Publish dates and ledger timestamps are read through `Clock` so tests can
//! pin them. `ProductionClock` follows wall time; `SimulatedClock` only moves
//! when told to.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Source of the current time
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since the UNIX epoch
    fn now_ms(&self) -> u64;

    /// Current time as a UTC datetime
    fn now_utc(&self) -> DateTime<Utc> {
        millis_to_utc(self.now_ms())
    }

    /// Current UTC calendar date
    fn today(&self) -> NaiveDate {
        self.now_utc().date_naive()
    }
}

/// Convert epoch milliseconds to a UTC datetime (saturating at the epoch)
pub fn millis_to_utc(ms: u64) -> DateTime<Utc> {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Production clock using real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductionClock;

impl ProductionClock {
    pub fn new() -> Self {
        ProductionClock
    }

    pub fn shared() -> SharedClock {
        Arc::new(ProductionClock)
    }
}

impl Clock for ProductionClock {
    fn now_ms(&self) -> u64 {
        // A system clock before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Simulated clock for deterministic testing
///
/// Time only advances when explicitly told to via `advance()` or `set()`.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    time_ms: Arc<AtomicU64>,
}

impl SimulatedClock {
    /// Create a new simulated clock starting at the given time
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            time_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Start at a UTC datetime
    pub fn at(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime.timestamp_millis().max(0) as u64)
    }

    pub fn advance(&self, duration: Duration) {
        self.time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, time_ms: u64) {
        self.time_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}
