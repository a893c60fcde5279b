//! Classifier seam and the built-in linear softmax model.

use crate::error::DecodeError;

/// Maps a flattened feature vector to a probability distribution over the
/// model's ordered label set. Implementations are pure functions; the
/// feature length is fixed at model-load time and callers must respect it.
pub trait ClassifierModel: Send + Sync {
    fn n_labels(&self) -> usize;

    /// One probability per label, ordered like the label set, summing to 1.
    fn predict_proba(&self, features: &[f64]) -> Vec<f64>;
}

/// Linear decision functions with a softmax link, weights taken from the
/// model artifact. `weights` is labels x features; `intercepts` is one bias
/// per label.
pub struct LinearClassifier {
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LinearClassifier {
    pub fn new(weights: Vec<Vec<f64>>, intercepts: Vec<f64>) -> Result<Self, DecodeError> {
        if weights.is_empty() {
            return Err(DecodeError::ModelInvalid(
                "classifier has no weight rows".into(),
            ));
        }
        if weights.len() != intercepts.len() {
            return Err(DecodeError::ModelInvalid(format!(
                "classifier has {} weight rows but {} intercepts",
                weights.len(),
                intercepts.len()
            )));
        }
        let width = weights[0].len();
        if width == 0 || weights.iter().any(|row| row.len() != width) {
            return Err(DecodeError::ModelInvalid(
                "classifier weight rows are empty or ragged".into(),
            ));
        }
        Ok(Self {
            weights,
            intercepts,
        })
    }

    pub fn n_features(&self) -> usize {
        self.weights[0].len()
    }
}

impl ClassifierModel for LinearClassifier {
    fn n_labels(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        debug_assert_eq!(features.len(), self.n_features());

        let mut scores: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, bias)| {
                row.iter()
                    .zip(features)
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + bias
            })
            .collect();

        // softmax with max subtraction for numerical stability
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for s in scores.iter_mut() {
            *s = (*s - max).exp();
            total += *s;
        }
        for s in scores.iter_mut() {
            *s /= total;
        }
        scores
    }
}
