//! Training Pipeline
//!
//! Picks the newest dataset, encodes and scales it, fits a nearest-centroid
//! classifier, and hands the model and scaler blobs to the publisher.

pub mod dataset;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod scaler;

pub use dataset::{latest_dataset, latest_dataset_key, Dataset};
pub use features::{encode_labels, ColumnEncoding, ColumnKind, FeatureEncoder, FeatureError};
pub use model::NearestCentroid;
pub use pipeline::{train_test_split, TrainingPipeline, TrainingReport};
pub use scaler::{MinMaxScaler, Preprocessor};

use crate::registry::RegistryError;
use std::io::Error as IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no dataset found under prefix {prefix:?}")]
    NoDatasetFound { prefix: String },

    #[error("need at least 2 rows to train, got {rows}")]
    InsufficientData { rows: usize },

    #[error("target column {column:?} not in dataset")]
    MissingTargetColumn { column: String },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("object store error on {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: IoError,
    },

    #[error("feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("publish failed: {0}")]
    Registry(#[from] RegistryError),
}
