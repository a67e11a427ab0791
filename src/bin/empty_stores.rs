//! Delete every object in the dataset, artifact and results stores
//!
//! Irreversible. All published versions and ledgers are removed.
//!
//! ## Environment Variables
//!
//! Same store settings as `train` and `serve` (`VAULT_CONFIG`, or
//! `VAULT_STORE_TYPE`, `VAULT_DATA_ROOT`, `DATA_STORE`,
//! `MODEL_ARTIFACTS_STORE`, `RESULTS_STORE`).

use model_vault::admin::empty_store;
use model_vault::observability::init_tracing;
use model_vault::storage::open_store;
use model_vault::VaultConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = VaultConfig::load()?;
    init_tracing(&config.logging);

    for (name, store_config) in [
        ("datasets", &config.datasets),
        ("artifacts", &config.artifacts),
        ("results", &config.results),
    ] {
        let store = open_store(store_config)?;
        let deleted = empty_store(&store, "").await?;
        println!("The {} store has been emptied ({} objects deleted).", name, deleted);
    }
    Ok(())
}
