use crate::config::TrainingConfig;
use crate::ensemble::random::RandomSource;
use crate::ensemble::tree::{grow, ClassTarget, Tree, TreeParams};
use crate::ensemble::types::{MemberKind, ProbabilisticClassifier};

use super::uniform;

/// Bagged Gini trees with sqrt(d) features per split. The prediction is
/// the mean of the leaf class distributions.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree<Vec<f64>>>,
    n_classes: usize,
}

impl RandomForest {
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        config: &TrainingConfig,
        rng: &mut dyn RandomSource,
    ) -> Self {
        let n = features.len();
        let n_features = features.first().map(|r| r.len()).unwrap_or(0);
        let params = TreeParams {
            max_depth: config.forest_max_depth,
            min_samples_split: config.forest_min_samples_split,
            max_features: Some(((n_features as f64).sqrt().ceil() as usize).max(1)),
        };
        let target = ClassTarget { labels, n_classes };

        let mut trees = Vec::with_capacity(config.forest_trees);
        if n > 0 {
            for _ in 0..config.forest_trees.max(1) {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.below(n)).collect();
                trees.push(grow(features, bootstrap, &target, params, rng));
            }
        }

        tracing::debug!(trees = trees.len(), samples = n, "Random forest fitted");
        Self { trees, n_classes }
    }
}

impl ProbabilisticClassifier for RandomForest {
    fn kind(&self) -> MemberKind {
        MemberKind::RandomForest
    }

    fn predict_distribution(&self, features: &[f64]) -> Vec<f64> {
        if self.trees.is_empty() {
            return uniform(self.n_classes);
        }
        let mut dist = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in dist.iter_mut().zip(tree.leaf(features)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        dist.iter_mut().for_each(|p| *p /= n);
        dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::random::seeded;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            forest_trees: 15,
            forest_max_depth: 4,
            forest_min_samples_split: 2,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn learns_feature_to_class_mapping() {
        // class i is signalled by feature i
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3 {
            for _ in 0..10 {
                let mut row = vec![0.0; 3];
                row[class] = 1.0;
                features.push(row);
                labels.push(class);
            }
        }
        let forest = RandomForest::fit(&features, &labels, 3, &small_config(), &mut seeded(5));
        let dist = forest.predict_distribution(&[0.0, 1.0, 0.0]);
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let top = dist
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(top, Some(1));
    }

    #[test]
    fn empty_training_predicts_uniform() {
        let forest = RandomForest::fit(&[], &[], 4, &small_config(), &mut seeded(5));
        assert_eq!(forest.predict_distribution(&[1.0]), vec![0.25; 4]);
    }
}
