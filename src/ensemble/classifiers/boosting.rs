use crate::config::TrainingConfig;
use crate::ensemble::random::RandomSource;
use crate::ensemble::tree::{grow, SplitTarget, Tree, TreeParams};
use crate::ensemble::types::{MemberKind, ProbabilisticClassifier};

use super::softmax;

/// Multiclass gradient boosting on the softmax loss: one regression tree
/// per class per round, leaves set by a single Newton step.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    prior: Vec<f64>,
    learning_rate: f64,
    /// `rounds[r][k]` is the tree for class `k` in round `r`.
    rounds: Vec<Vec<Tree<f64>>>,
}

/// Pseudo-residuals with their per-sample curvature.
struct NewtonTarget<'a> {
    residuals: &'a [f64],
    hessians: &'a [f64],
    scale: f64,
}

impl SplitTarget for NewtonTarget<'_> {
    type Leaf = f64;
    type Stats = (f64, f64, f64);

    fn empty(&self) -> Self::Stats {
        (0.0, 0.0, 0.0)
    }

    fn add(&self, s: &mut Self::Stats, sample: usize) {
        let r = self.residuals[sample];
        s.0 += 1.0;
        s.1 += r;
        s.2 += r * r;
    }

    fn remove(&self, s: &mut Self::Stats, sample: usize) {
        let r = self.residuals[sample];
        s.0 -= 1.0;
        s.1 -= r;
        s.2 -= r * r;
    }

    fn cost(&self, (n, sum, sum_sq): &Self::Stats) -> f64 {
        if *n <= 0.0 {
            return 0.0;
        }
        (sum_sq - sum * sum / n).max(0.0)
    }

    fn leaf(&self, samples: &[usize]) -> f64 {
        let num: f64 = samples.iter().map(|&i| self.residuals[i]).sum();
        let den: f64 = samples.iter().map(|&i| self.hessians[i]).sum();
        if den.abs() < 1e-12 {
            return 0.0;
        }
        self.scale * num / den
    }
}

impl GradientBoosting {
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        config: &TrainingConfig,
        rng: &mut dyn RandomSource,
    ) -> Self {
        let n = features.len();
        let prior = log_prior(labels, n_classes);
        let mut model = Self {
            prior: prior.clone(),
            learning_rate: config.boosting_learning_rate,
            rounds: Vec::new(),
        };
        if n == 0 || n_classes < 2 {
            return model;
        }

        let params = TreeParams {
            max_depth: config.boosting_max_depth,
            min_samples_split: 2,
            max_features: None,
        };
        let scale = (n_classes as f64 - 1.0) / n_classes as f64;
        let mut scores: Vec<Vec<f64>> = vec![prior; n];

        for _ in 0..config.boosting_rounds {
            let probs: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
            let mut round = Vec::with_capacity(n_classes);
            for k in 0..n_classes {
                let residuals: Vec<f64> = (0..n)
                    .map(|i| f64::from(u8::from(labels[i] == k)) - probs[i][k])
                    .collect();
                let hessians: Vec<f64> = residuals.iter().map(|r| r.abs() * (1.0 - r.abs())).collect();
                let target = NewtonTarget {
                    residuals: &residuals,
                    hessians: &hessians,
                    scale,
                };
                round.push(grow(features, (0..n).collect(), &target, params, rng));
            }
            for (i, row) in features.iter().enumerate() {
                for (k, tree) in round.iter().enumerate() {
                    scores[i][k] += model.learning_rate * tree.leaf(row);
                }
            }
            model.rounds.push(round);
        }

        tracing::debug!(rounds = model.rounds.len(), samples = n, "Gradient boosting fitted");
        model
    }

    fn raw_scores(&self, features: &[f64]) -> Vec<f64> {
        let mut scores = self.prior.clone();
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                scores[k] += self.learning_rate * tree.leaf(features);
            }
        }
        scores
    }
}

impl ProbabilisticClassifier for GradientBoosting {
    fn kind(&self) -> MemberKind {
        MemberKind::GradientBoosting
    }

    fn predict_distribution(&self, features: &[f64]) -> Vec<f64> {
        if self.prior.is_empty() {
            return Vec::new();
        }
        softmax(&self.raw_scores(features))
    }
}

/// Log class frequencies, with add-one smoothing.
fn log_prior(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![1.0; n_classes];
    for &label in labels {
        counts[label] += 1.0;
    }
    let total: f64 = counts.iter().sum();
    counts.into_iter().map(|c| (c / total).ln()).collect()
}
