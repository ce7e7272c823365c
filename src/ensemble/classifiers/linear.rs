use crate::config::TrainingConfig;
use crate::ensemble::types::{MemberKind, ProbabilisticClassifier};

use super::softmax;

/// Multinomial logistic regression fitted by full-batch gradient descent
/// with L2 regularization.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// `weights[k]` is the coefficient row for class `k`.
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl LogisticRegression {
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        config: &TrainingConfig,
    ) -> Self {
        let n_features = features.first().map(|r| r.len()).unwrap_or(0);
        let mut model = Self {
            weights: vec![vec![0.0; n_features]; n_classes],
            bias: vec![0.0; n_classes],
        };
        let n = features.len();
        if n == 0 {
            return model;
        }

        let lr = config.logistic_learning_rate;
        let l2 = config.logistic_l2;
        for _ in 0..config.logistic_epochs {
            let mut grad_w = vec![vec![0.0; n_features]; n_classes];
            let mut grad_b = vec![0.0; n_classes];
            for (row, &label) in features.iter().zip(labels) {
                let probs = softmax(&model.logits(row));
                for k in 0..n_classes {
                    let err = probs[k] - f64::from(u8::from(label == k));
                    grad_b[k] += err;
                    for (g, x) in grad_w[k].iter_mut().zip(row) {
                        *g += err * x;
                    }
                }
            }
            let n = n as f64;
            for k in 0..n_classes {
                model.bias[k] -= lr * grad_b[k] / n;
                for (w, g) in model.weights[k].iter_mut().zip(&grad_w[k]) {
                    *w -= lr * (g / n + l2 * *w);
                }
            }
        }

        tracing::debug!(epochs = config.logistic_epochs, samples = n, "Logistic regression fitted");
        model
    }

    fn logits(&self, features: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| b + row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>())
            .collect()
    }
}

impl ProbabilisticClassifier for LogisticRegression {
    fn kind(&self) -> MemberKind {
        MemberKind::LogisticRegression
    }

    fn predict_distribution(&self, features: &[f64]) -> Vec<f64> {
        softmax(&self.logits(features))
    }
}
