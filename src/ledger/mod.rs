//! Append-only Result Ledger
//!
//! One CSV object per model version, `{prefix}results_{v}.csv`, holding a
//! header and one row per inference.
//!
//! ```text
//! ResultLedger::append_batch   exists? ─no──→ put(header + rows)
//!                                   └─yes─→ get, check header, put(old + rows)
//!
//! LedgerWriter                 version % shards → single task per shard,
//!                              appends for one version run one at a time
//! ```
//!
//! `ResultLedger` alone is a read-modify-write with no isolation: two
//! concurrent appends to the same version can lose a row. Route appends
//! through a `LedgerWriter` when callers run concurrently.

pub mod record;
pub mod result_ledger;
pub mod writer;

pub use record::{decode, encode, read_schema, LedgerRecord, LedgerSchema, DATE_FORMAT};
pub use result_ledger::{AppendOutcome, ResultLedger};
pub use writer::{spawn_ledger_writer, LedgerWriter};

use std::future::Future;
use std::io::Error as IoError;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger {key} has {expected}, append has {found}")]
    SchemaMismatch {
        key: String,
        expected: LedgerSchema,
        found: LedgerSchema,
    },

    #[error("ledger encoding error: {0}")]
    Encoding(String),

    #[error("object store error on {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: IoError,
    },

    #[error("ledger writer shard {shard} is not running")]
    WriterUnavailable { shard: usize },
}

impl From<csv::Error> for LedgerError {
    fn from(e: csv::Error) -> Self {
        LedgerError::Encoding(e.to_string())
    }
}

/// Boxed future returned by `LedgerSink`
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Destination for inference records
///
/// Implemented by `ResultLedger` (direct, unserialized) and `LedgerWriter`
/// (serialized per version).
pub trait LedgerSink: Send + Sync + 'static {
    fn append_batch(&self, version: u64, records: Vec<LedgerRecord>) -> LedgerFuture<'_, AppendOutcome>;
}
