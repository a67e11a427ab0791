//! Dataset selection and parsing

use super::TrainingError;
use crate::storage::{list_all, ObjectMeta, ObjectStore};

/// Most recently modified object under `prefix`
///
/// Equal modification times resolve to the lexicographically greatest key.
pub async fn latest_dataset<S: ObjectStore + ?Sized>(
    store: &S,
    prefix: &str,
) -> Result<ObjectMeta, TrainingError> {
    let objects = list_all(store, prefix)
        .await
        .map_err(|source| TrainingError::Store {
            key: prefix.to_string(),
            source,
        })?;

    objects
        .into_iter()
        .filter(|o| !o.key.ends_with('/'))
        .max_by(|a, b| {
            a.last_modified_ms
                .cmp(&b.last_modified_ms)
                .then_with(|| a.key.cmp(&b.key))
        })
        .ok_or_else(|| TrainingError::NoDatasetFound {
            prefix: prefix.to_string(),
        })
}

pub async fn latest_dataset_key<S: ObjectStore + ?Sized>(
    store: &S,
    prefix: &str,
) -> Result<String, TrainingError> {
    Ok(latest_dataset(store, prefix).await?.key)
}

/// Raw tabular data, one `String` per cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Parse CSV whose first column is a row index; the index is dropped
    pub fn from_csv(data: &[u8]) -> Result<Self, TrainingError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| TrainingError::Encoding(format!("dataset header: {}", e)))?
            .iter()
            .skip(1)
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(TrainingError::Encoding(
                "dataset has no columns besides the index".to_string(),
            ));
        }

        let mut rows = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| TrainingError::Encoding(format!("dataset row {}: {}", line + 1, e)))?;
            rows.push(row.iter().skip(1).map(str::to_string).collect());
        }

        Ok(Dataset { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Split off the column `target`, returning (features, labels)
    pub fn split_target(mut self, target: &str) -> Result<(Dataset, Vec<String>), TrainingError> {
        let idx = self
            .column_index(target)
            .ok_or_else(|| TrainingError::MissingTargetColumn {
                column: target.to_string(),
            })?;

        self.columns.remove(idx);
        let labels = self.rows.iter_mut().map(|row| row.remove(idx)).collect();
        Ok((self, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;

    const CSV: &str = "\
,country,count,churn
0,fr,3,yes
1,de,5,no
2,fr,1,no
";

    #[test]
    fn test_from_csv_drops_index() {
        let ds = Dataset::from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(ds.columns, vec!["country", "count", "churn"]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows[1], vec!["de", "5", "no"]);
    }

    #[test]
    fn test_split_target() {
        let ds = Dataset::from_csv(CSV.as_bytes()).unwrap();
        let (features, labels) = ds.split_target("churn").unwrap();
        assert_eq!(features.columns, vec!["country", "count"]);
        assert_eq!(labels, vec!["yes", "no", "no"]);
        assert_eq!(features.rows[0], vec!["fr", "3"]);
    }

    #[test]
    fn test_missing_target() {
        let ds = Dataset::from_csv(CSV.as_bytes()).unwrap();
        assert!(matches!(
            ds.split_target("label"),
            Err(TrainingError::MissingTargetColumn { .. })
        ));
    }

    #[test]
    fn test_ragged_csv_rejected() {
        let data = ",a,b\n0,1,2\n1,3\n";
        assert!(matches!(
            Dataset::from_csv(data.as_bytes()),
            Err(TrainingError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_by_modification_time() {
        let store = InMemoryObjectStore::new();
        store.insert_with_modified("z-old.csv", b"x", 1_000);
        store.insert_with_modified("a-new.csv", b"x", 5_000);
        store.insert_with_modified("m-mid.csv", b"x", 3_000);

        assert_eq!(latest_dataset_key(&store, "").await.unwrap(), "a-new.csv");
    }

    #[tokio::test]
    async fn test_latest_tie_breaks_on_key() {
        let store = InMemoryObjectStore::new();
        store.insert_with_modified("data/2024-01.csv", b"x", 5_000);
        store.insert_with_modified("data/2024-02.csv", b"x", 5_000);
        store.insert_with_modified("other/2099.csv", b"x", 9_000);

        assert_eq!(
            latest_dataset_key(&store, "data/").await.unwrap(),
            "data/2024-02.csv"
        );
    }

    #[tokio::test]
    async fn test_empty_prefix_has_no_dataset() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            latest_dataset_key(&store, "").await,
            Err(TrainingError::NoDatasetFound { .. })
        ));
    }
}
