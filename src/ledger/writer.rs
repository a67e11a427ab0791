//! Single-writer ledger actors
//!
//! Each shard is one tokio task draining an mpsc queue. A version always maps
//! to the same shard, so appends to one ledger never overlap in time and the
//! read-modify-write in `ResultLedger` cannot lose rows to a sibling request
//! in this process.

use super::record::LedgerRecord;
use super::result_ledger::{AppendOutcome, ResultLedger};
use super::{LedgerError, LedgerFuture, LedgerSink};
use crate::storage::ObjectStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum LedgerMessage {
    Append {
        version: u64,
        records: Vec<LedgerRecord>,
        response_tx: oneshot::Sender<Result<AppendOutcome, LedgerError>>,
    },
    Shutdown {
        response_tx: oneshot::Sender<()>,
    },
}

struct LedgerShardActor<S: ObjectStore> {
    ledger: Arc<ResultLedger<S>>,
    rx: mpsc::UnboundedReceiver<LedgerMessage>,
    shard_id: usize,
}

impl<S: ObjectStore> LedgerShardActor<S> {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                LedgerMessage::Append {
                    version,
                    records,
                    response_tx,
                } => {
                    let result = self.ledger.append_batch(version, &records).await;
                    if let Err(e) = &result {
                        tracing::warn!(shard = self.shard_id, version, error = %e, "ledger append failed");
                    }
                    // Caller may have gone away; the append still happened.
                    let _ = response_tx.send(result);
                }
                LedgerMessage::Shutdown { response_tx } => {
                    let _ = response_tx.send(());
                    break;
                }
            }
        }
        tracing::debug!(shard = self.shard_id, "ledger writer stopped");
    }
}

/// Handle to the ledger writer shards; cheap to clone
#[derive(Clone)]
pub struct LedgerWriter {
    shards: Arc<[mpsc::UnboundedSender<LedgerMessage>]>,
}

impl LedgerWriter {
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard that owns `version`
    pub fn shard_for(&self, version: u64) -> usize {
        (version % self.shards.len() as u64) as usize
    }

    pub async fn append(
        &self,
        version: u64,
        record: LedgerRecord,
    ) -> Result<AppendOutcome, LedgerError> {
        self.append_batch(version, vec![record]).await
    }

    /// Queue rows on the version's shard and wait for the write
    pub async fn append_batch(
        &self,
        version: u64,
        records: Vec<LedgerRecord>,
    ) -> Result<AppendOutcome, LedgerError> {
        let shard = self.shard_for(version);
        let (response_tx, response_rx) = oneshot::channel();
        let msg = LedgerMessage::Append {
            version,
            records,
            response_tx,
        };

        if self.shards[shard].send(msg).is_err() {
            return Err(LedgerError::WriterUnavailable { shard });
        }
        response_rx
            .await
            .unwrap_or(Err(LedgerError::WriterUnavailable { shard }))
    }

    /// Stop every shard after its queued appends finish
    pub async fn shutdown(&self) {
        for tx in self.shards.iter() {
            let (response_tx, response_rx) = oneshot::channel();
            if tx.send(LedgerMessage::Shutdown { response_tx }).is_ok() {
                let _ = response_rx.await;
            }
        }
    }
}

impl LedgerSink for LedgerWriter {
    fn append_batch(&self, version: u64, records: Vec<LedgerRecord>) -> LedgerFuture<'_, AppendOutcome> {
        Box::pin(LedgerWriter::append_batch(self, version, records))
    }
}

/// Spawn `shards` writer tasks over one ledger
pub fn spawn_ledger_writer<S: ObjectStore>(
    ledger: ResultLedger<S>,
    shards: usize,
) -> (LedgerWriter, Vec<JoinHandle<()>>) {
    debug_assert!(shards > 0, "ledger writer needs at least one shard");
    let shards = shards.max(1);
    let ledger = Arc::new(ledger);

    let mut senders = Vec::with_capacity(shards);
    let mut tasks = Vec::with_capacity(shards);
    for shard_id in 0..shards {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = LedgerShardActor {
            ledger: Arc::clone(&ledger),
            rx,
            shard_id,
        };
        tasks.push(tokio::spawn(actor.run()));
        senders.push(tx);
    }

    tracing::debug!(shards, "spawned ledger writers");
    (
        LedgerWriter {
            shards: senders.into(),
        },
        tasks,
    )
}
