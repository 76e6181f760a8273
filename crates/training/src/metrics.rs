//! Epoch metrics and the confusion matrix.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Metrics reported at the end of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// 1-based epoch number.
    pub epoch: usize,
    pub loss: f64,
    pub acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
    /// Learning rate used during the epoch.
    pub lr: f64,
}

/// Sample-weighted running loss/accuracy over a sequence of batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMetrics {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl RunningMetrics {
    pub fn update(&mut self, mean_loss: f64, correct: usize, samples: usize) {
        self.loss_sum += mean_loss * samples as f64;
        self.correct += correct;
        self.samples += samples;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn loss(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.loss_sum / self.samples as f64
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.correct as f64 / self.samples as f64
        }
    }
}

/// Pull a tensor back to the host as `f32`, whatever the backend's float type.
pub fn to_f32_vec<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> anyhow::Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("tensor readback failed: {e:?}"))
}

/// The single value of a reduced loss tensor.
pub fn scalar_value<B: Backend>(tensor: Tensor<B, 1>) -> anyhow::Result<f64> {
    let values = to_f32_vec(tensor)?;
    match values.as_slice() {
        [v] => Ok(*v as f64),
        _ => anyhow::bail!("expected a scalar loss, got {} values", values.len()),
    }
}

/// Column of the largest value in each row of a row-major `[rows, cols]` buffer.
/// Ties resolve to the lowest column.
pub fn argmax_rows(values: &[f32], cols: usize) -> Vec<usize> {
    if cols == 0 {
        return Vec::new();
    }
    values
        .chunks_exact(cols)
        .map(|row| {
            let mut best = 0usize;
            for (i, v) in row.iter().enumerate().skip(1) {
                if *v > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// `num_classes x num_classes` tally; rows are true classes, columns predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn accumulate(&mut self, y_true: &[usize], y_pred: &[usize]) -> anyhow::Result<()> {
        if y_true.len() != y_pred.len() {
            anyhow::bail!(
                "label/prediction length mismatch: {} vs {}",
                y_true.len(),
                y_pred.len()
            );
        }
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t >= self.num_classes || p >= self.num_classes {
                anyhow::bail!(
                    "class pair ({t}, {p}) out of range for {} classes",
                    self.num_classes
                );
            }
            self.counts[t * self.num_classes + p] += 1;
        }
        Ok(())
    }

    /// Add another matrix of the same size.
    pub fn merge(&mut self, other: &ConfusionMatrix) -> anyhow::Result<()> {
        if other.num_classes != self.num_classes {
            anyhow::bail!(
                "cannot merge {}-class matrix into {}-class matrix",
                other.num_classes,
                self.num_classes
            );
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        Ok(())
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.num_classes + predicted]
    }

    pub fn row(&self, truth: usize) -> &[u64] {
        let start = truth * self.num_classes;
        &self.counts[start..start + self.num_classes]
    }

    pub fn rows(&self) -> Vec<Vec<u64>> {
        (0..self.num_classes).map(|t| self.row(t).to_vec()).collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.num_classes).map(|c| self.get(c, c)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    /// Recall per true class; `None` for classes with no samples.
    pub fn per_class_recall(&self) -> Vec<Option<f64>> {
        (0..self.num_classes)
            .map(|c| {
                let support: u64 = self.row(c).iter().sum();
                (support > 0).then(|| self.get(c, c) as f64 / support as f64)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_tallies_pairs() {
        let mut m = ConfusionMatrix::new(3);
        m.accumulate(&[0, 1, 2, 2], &[0, 2, 2, 1]).unwrap();
        m.accumulate(&[1], &[1]).unwrap();
        assert_eq!(m.rows(), vec![vec![1, 0, 0], vec![0, 1, 1], vec![0, 1, 1]]);
        assert_eq!(m.total(), 5);
        assert_eq!(m.correct(), 3);
        assert!((m.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn recall_skips_empty_classes() {
        let mut m = ConfusionMatrix::new(3);
        m.accumulate(&[0, 0, 1], &[0, 1, 1]).unwrap();
        assert_eq!(m.per_class_recall(), vec![Some(0.5), Some(1.0), None]);
    }

    #[test]
    fn out_of_range_and_mismatch_are_errors() {
        let mut m = ConfusionMatrix::new(2);
        assert!(m.accumulate(&[0, 1], &[0]).is_err());
        assert!(m.accumulate(&[2], &[0]).is_err());
        assert_eq!(m.total(), 0);
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = ConfusionMatrix::new(2);
        let mut b = ConfusionMatrix::new(2);
        a.accumulate(&[0], &[1]).unwrap();
        b.accumulate(&[0, 1], &[1, 1]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.get(0, 1), 2);
        assert_eq!(a.get(1, 1), 1);
        assert!(a.merge(&ConfusionMatrix::new(3)).is_err());
    }

    #[test]
    fn argmax_picks_first_maximum() {
        let values = [0.1, 0.7, 0.2, 0.5, 0.5, 0.0];
        assert_eq!(argmax_rows(&values, 3), vec![1, 0]);
        assert!(argmax_rows(&values, 0).is_empty());
    }

    #[test]
    fn running_metrics_weight_by_samples() {
        let mut r = RunningMetrics::default();
        r.update(1.0, 4, 4);
        r.update(4.0, 0, 2);
        assert_eq!(r.samples(), 6);
        assert!((r.loss() - 2.0).abs() < 1e-12);
        assert!((r.accuracy() - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn readback_returns_values_and_rejects_non_scalars() {
        type B = burn::backend::NdArray<f32>;
        let device = Default::default();
        let t = Tensor::<B, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        assert_eq!(to_f32_vec(t).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

        let loss = Tensor::<B, 1>::from_floats([0.25], &device);
        assert!((scalar_value(loss).unwrap() - 0.25).abs() < 1e-9);
        let pair = Tensor::<B, 1>::from_floats([0.25, 0.5], &device);
        assert!(scalar_value(pair).is_err());
    }

    #[test]
    fn matrix_serializes_to_json() {
        let mut m = ConfusionMatrix::new(2);
        m.accumulate(&[1], &[0]).unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["num_classes"], 2);
        assert_eq!(json["counts"], serde_json::json!([0, 0, 1, 0]));
    }
}
