//! Nearest-centroid classifier
//!
//! Each class is represented by the mean of its training rows. Class
//! probabilities are a softmax over negative squared distances to the
//! centroids; a class with no training rows gets probability zero.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroid {
    /// Class names, in probability-column order
    pub classes: Vec<String>,
    /// One centroid per class; `None` when the class had no training rows
    pub centroids: Vec<Option<Vec<f64>>>,
}

impl NearestCentroid {
    /// Fit on scaled rows and class indices into `classes`
    pub fn fit(classes: Vec<String>, rows: &[Vec<f64>], labels: &[usize]) -> Self {
        debug_assert_eq!(rows.len(), labels.len());
        let width = rows.first().map_or(0, Vec::len);
        let mut sums = vec![vec![0.0; width]; classes.len()];
        let mut counts = vec![0usize; classes.len()];

        for (row, &label) in rows.iter().zip(labels) {
            let (Some(sum), Some(count)) = (sums.get_mut(label), counts.get_mut(label)) else {
                continue;
            };
            for (s, v) in sum.iter_mut().zip(row) {
                *s += v;
            }
            *count += 1;
        }

        let centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, n)| (n > 0).then(|| sum.into_iter().map(|s| s / n as f64).collect()))
            .collect();

        NearestCentroid { classes, centroids }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Width of the rows the model was fitted on
    pub fn width(&self) -> Option<usize> {
        self.centroids.iter().flatten().map(Vec::len).next()
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let scores: Vec<Option<f64>> = self
            .centroids
            .iter()
            .map(|c| {
                c.as_ref().map(|c| {
                    -c.iter()
                        .zip(row)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f64>()
                })
            })
            .collect();

        let best = scores
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if !best.is_finite() {
            let n = self.classes.len().max(1) as f64;
            return vec![1.0 / n; self.classes.len()];
        }

        let exp: Vec<f64> = scores
            .iter()
            .map(|s| s.map_or(0.0, |s| (s - best).exp()))
            .collect();
        let total: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }

    /// Fraction of rows whose predicted class equals the label
    pub fn accuracy(&self, rows: &[Vec<f64>], labels: &[usize]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let correct = rows
            .iter()
            .zip(labels)
            .filter(|(row, &label)| self.predict(row) == label)
            .count();
        correct as f64 / rows.len() as f64
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}
