//! Inference HTTP server
//!
//! `POST /inference` with `{"data": [[...]], "model_version": "1"}` runs the
//! requested model version and appends the results to that version's ledger.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | VAULT_CONFIG | - | TOML config file; when set, the variables below are ignored |
//! | VAULT_BIND_ADDR | 0.0.0.0:8000 | Listen address |
//! | VAULT_STORE_TYPE | localfs | memory, localfs, or s3 |
//! | VAULT_DATA_ROOT | ./vault-data | Root directory for localfs stores |
//! | MODEL_ARTIFACTS_STORE | model-artifacts | Artifact bucket / directory |
//! | RESULTS_STORE | results | Ledger bucket / directory |
//! | VAULT_STORE_TIMEOUT_MS | 30000 | Per-call store deadline |
//! | VAULT_LOG_FORMAT | text | text or json |
//! | RUST_LOG | - | Overrides VAULT_LOG_FILTER |

use model_vault::clock::ProductionClock;
use model_vault::inference::serve;
use model_vault::ledger::spawn_ledger_writer;
use model_vault::observability::init_tracing;
use model_vault::storage::open_store;
use model_vault::{ArtifactFetcher, InferenceService, ResultLedger, VaultConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = VaultConfig::load()?;
    init_tracing(&config.logging);

    let artifacts = open_store(&config.artifacts)?;
    let results = open_store(&config.results)?;

    let ledger = ResultLedger::new(results, &config.ledger);
    let (writer, writer_tasks) = spawn_ledger_writer(ledger, config.ledger.writer_shards);

    let service = Arc::new(InferenceService::new(
        ArtifactFetcher::new(artifacts, &config.registry),
        Arc::new(writer.clone()),
        ProductionClock::shared(),
    ));

    let listener = TcpListener::bind(&config.server.bind_addr).await?;
    println!("Inference server listening on {}", config.server.bind_addr);
    println!("Press Ctrl+C to shutdown gracefully");

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };
    serve(listener, service, shutdown).await?;

    // In-flight requests are done; let queued ledger appends drain.
    writer.shutdown().await;
    for task in writer_tasks {
        if let Err(e) = task.await {
            error!(error = %e, "ledger writer task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
