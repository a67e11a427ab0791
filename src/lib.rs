//! model-vault: versioned model artifacts and per-version result ledgers
//!
//! ```text
//! train:  datasets store → TrainingPipeline → ArtifactPublisher → artifacts store
//! serve:  POST /inference → InferenceService → ArtifactFetcher (artifacts store)
//!                                           → LedgerWriter → ResultLedger (results store)
//! ```

pub mod admin;
pub mod clock;
pub mod config;
pub mod inference;
pub mod ledger;
pub mod observability;
pub mod registry;
pub mod storage;
pub mod training;

pub use config::VaultConfig;
pub use inference::{InferenceService, InferenceError};
pub use ledger::{LedgerError, LedgerRecord, LedgerWriter, ResultLedger};
pub use registry::{ArtifactFetcher, ArtifactPublisher, RegistryError};
pub use storage::{ObjectStore, SharedStore};
pub use training::{TrainingError, TrainingPipeline};
