//! Train and publish one model version
//!
//! Picks the most recently modified dataset in the dataset store, trains,
//! and publishes a new version to the artifact store.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | VAULT_CONFIG | - | TOML config file; when set, the variables below are ignored |
//! | VAULT_STORE_TYPE | localfs | memory, localfs, or s3 |
//! | VAULT_DATA_ROOT | ./vault-data | Root directory for localfs stores |
//! | DATA_STORE | train-data | Dataset bucket / directory |
//! | MODEL_ARTIFACTS_STORE | model-artifacts | Artifact bucket / directory |
//! | VAULT_DATASET_PREFIX | (empty) | Prefix scanned for datasets |
//! | VAULT_TARGET_COLUMN | churn | Label column |
//! | RUST_LOG | - | Overrides VAULT_LOG_FILTER |

use model_vault::clock::ProductionClock;
use model_vault::observability::init_tracing;
use model_vault::storage::open_store;
use model_vault::{ArtifactPublisher, TrainingPipeline, VaultConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = VaultConfig::load()?;
    init_tracing(&config.logging);

    let datasets = open_store(&config.datasets)?;
    let artifacts = open_store(&config.artifacts)?;
    let publisher = ArtifactPublisher::new(artifacts, &config.registry, ProductionClock::shared());
    let pipeline = TrainingPipeline::new(datasets, publisher, config.training.clone());

    match pipeline.run().await {
        Ok(report) => {
            info!(
                version = report.version,
                accuracy = report.accuracy,
                dataset = %report.dataset_key,
                train_rows = report.train_rows,
                test_rows = report.test_rows,
                "training complete"
            );
            println!("Published model version {} (accuracy {:.4})", report.version, report.accuracy);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "training failed");
            Err(e.into())
        }
    }
}
