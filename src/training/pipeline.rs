//! One training run, end to end

use super::dataset::{latest_dataset_key, Dataset};
use super::features::{encode_labels, FeatureEncoder};
use super::model::NearestCentroid;
use super::scaler::{MinMaxScaler, Preprocessor};
use super::TrainingError;
use crate::config::TrainingConfig;
use crate::registry::ArtifactPublisher;
use crate::storage::ObjectStore;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub version: u64,
    pub accuracy: f64,
    pub dataset_key: String,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Shuffled (train, test) row indices
///
/// The test side gets `ceil(n * fraction)` rows, clamped so both sides keep
/// at least one row.
pub fn train_test_split(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), TrainingError> {
    if n < 2 {
        return Err(TrainingError::InsufficientData { rows: n });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_n = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let train = indices.split_off(test_n);
    Ok((train, indices))
}

pub struct TrainingPipeline<D: ObjectStore, A: ObjectStore> {
    datasets: D,
    publisher: ArtifactPublisher<A>,
    config: TrainingConfig,
}

impl<D: ObjectStore, A: ObjectStore> TrainingPipeline<D, A> {
    pub fn new(datasets: D, publisher: ArtifactPublisher<A>, config: TrainingConfig) -> Self {
        TrainingPipeline {
            datasets,
            publisher,
            config,
        }
    }

    pub async fn run(&self) -> Result<TrainingReport, TrainingError> {
        let dataset_key = latest_dataset_key(&self.datasets, &self.config.dataset_prefix).await?;
        tracing::info!(key = %dataset_key, "training on dataset");

        let data = self
            .datasets
            .get(&dataset_key)
            .await
            .map_err(|source| TrainingError::Store {
                key: dataset_key.clone(),
                source,
            })?;
        let dataset = Dataset::from_csv(&data)?;
        let (features, labels) = dataset.split_target(&self.config.target_column)?;

        let (classes, targets) = encode_labels(&labels);
        let encoder = FeatureEncoder::fit(&features.columns, &features.rows);
        let encoded = features
            .rows
            .iter()
            .map(|row| encoder.encode_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        let scaler = MinMaxScaler::fit(&encoded);
        let scaled = scaler.transform(&encoded);

        let (train_idx, test_idx) =
            train_test_split(scaled.len(), self.config.test_fraction, self.config.seed)?;
        let pick_rows = |idx: &[usize]| idx.iter().map(|&i| scaled[i].clone()).collect::<Vec<_>>();
        let pick_labels = |idx: &[usize]| idx.iter().map(|&i| targets[i]).collect::<Vec<_>>();

        let model = NearestCentroid::fit(classes, &pick_rows(&train_idx), &pick_labels(&train_idx));
        let accuracy = model.accuracy(&pick_rows(&test_idx), &pick_labels(&test_idx));
        tracing::info!(
            accuracy,
            classes = model.num_classes(),
            train_rows = train_idx.len(),
            test_rows = test_idx.len(),
            "model fitted"
        );

        let model_blob = model
            .to_json()
            .map_err(|e| TrainingError::Encoding(format!("model: {}", e)))?;
        let scaler_blob = Preprocessor { encoder, scaler }
            .to_json()
            .map_err(|e| TrainingError::Encoding(format!("scaler: {}", e)))?;

        let bundle = self.publisher.publish(&model_blob, &scaler_blob, accuracy).await?;

        Ok(TrainingReport {
            version: bundle.version,
            accuracy,
            dataset_key,
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        })
    }
}
