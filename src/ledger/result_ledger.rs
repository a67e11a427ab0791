//! Direct read-modify-write ledger

use super::record::{self, LedgerRecord};
use super::{LedgerError, LedgerFuture, LedgerSink};
use crate::config::LedgerConfig;
use crate::storage::ObjectStore;

/// What an append did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub key: String,
    /// The ledger object did not exist before this append
    pub created: bool,
    pub rows_appended: usize,
}

pub struct ResultLedger<S: ObjectStore> {
    store: S,
    prefix: String,
}

impl<S: ObjectStore> ResultLedger<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        ResultLedger {
            store,
            prefix: config.prefix.clone(),
        }
    }

    /// Object key of the ledger for `version`
    pub fn key(&self, version: u64) -> String {
        format!("{}results_{}.csv", self.prefix, version)
    }

    pub async fn append(
        &self,
        version: u64,
        record: &LedgerRecord,
    ) -> Result<AppendOutcome, LedgerError> {
        self.append_batch(version, std::slice::from_ref(record)).await
    }

    /// Append rows with a single read-modify-write
    ///
    /// An empty batch touches nothing. A batch whose shape differs from the
    /// stored header fails with `SchemaMismatch` before any write.
    pub async fn append_batch(
        &self,
        version: u64,
        records: &[LedgerRecord],
    ) -> Result<AppendOutcome, LedgerError> {
        let key = self.key(version);
        let schema = match record::batch_schema(records) {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                return Ok(AppendOutcome {
                    key,
                    created: false,
                    rows_appended: 0,
                })
            }
            Err(LedgerError::SchemaMismatch {
                expected, found, ..
            }) => {
                return Err(LedgerError::SchemaMismatch {
                    key,
                    expected,
                    found,
                })
            }
            Err(e) => return Err(e),
        };

        let exists = self
            .store
            .exists(&key)
            .await
            .map_err(|source| store_error(&key, source))?;

        let (body, created) = if exists {
            let mut existing = self
                .store
                .get(&key)
                .await
                .map_err(|source| store_error(&key, source))?;
            let stored = record::read_schema(&existing)?;
            if stored != schema {
                return Err(LedgerError::SchemaMismatch {
                    key,
                    expected: stored,
                    found: schema,
                });
            }
            if !existing.is_empty() && !existing.ends_with(b"\n") {
                existing.push(b'\n');
            }
            existing.extend_from_slice(&record::encode(records, false)?);
            (existing, false)
        } else {
            (record::encode(records, true)?, true)
        };

        self.store
            .put(&key, &body)
            .await
            .map_err(|source| store_error(&key, source))?;

        if created {
            tracing::info!(version, key = %key, rows = records.len(), "created result ledger");
        } else {
            tracing::debug!(version, key = %key, rows = records.len(), "appended to result ledger");
        }

        Ok(AppendOutcome {
            key,
            created,
            rows_appended: records.len(),
        })
    }

    /// Every row of a ledger; an absent ledger reads as empty
    pub async fn read(&self, version: u64) -> Result<Vec<LedgerRecord>, LedgerError> {
        let key = self.key(version);
        match self.store.get(&key).await {
            Ok(data) => Ok(record::decode(&data)?.1),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(store_error(&key, source)),
        }
    }
}

fn store_error(key: &str, source: std::io::Error) -> LedgerError {
    LedgerError::Store {
        key: key.to_string(),
        source,
    }
}

impl<S: ObjectStore> LedgerSink for ResultLedger<S> {
    fn append_batch(&self, version: u64, records: Vec<LedgerRecord>) -> LedgerFuture<'_, AppendOutcome> {
        Box::pin(async move { ResultLedger::append_batch(self, version, &records).await })
    }
}
