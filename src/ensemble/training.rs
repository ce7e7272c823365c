//! Training data generation and ensemble fitting.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::knowledge::KnowledgeTable;

use super::classifiers::{GradientBoosting, LogisticRegression, RandomForest};
use super::random::RandomSource;
use super::scorer::argmax;
use super::snapshot::EnsembleSnapshot;
use super::types::{EnsembleError, EnsembleMember, MemberKind, ProbabilisticClassifier};
use super::vocabulary::FeatureVocabulary;

const SYMPTOM_PRESENCE: f64 = 0.8;
const PRESENT_RANGE: (f64, f64) = (0.7, 1.0);
const NOISE_RANGE: (f64, f64) = (0.1, 0.4);
const MAX_NOISE_SYMPTOMS: usize = 2;

/// Labelled feature rows over a fixed vocabulary.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub vocabulary: FeatureVocabulary,
    /// Sorted disease codes; `labels` index into this.
    pub classes: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl TrainingSet {
    /// Build from rows labelled by disease code. Classes are the sorted
    /// distinct labels.
    pub fn new(
        vocabulary: FeatureVocabulary,
        rows: Vec<(Vec<f64>, String)>,
    ) -> Result<Self, EnsembleError> {
        if rows.is_empty() {
            return Err(EnsembleError::InsufficientTrainingData("no samples".into()));
        }
        if let Some((row, _)) = rows.iter().find(|(row, _)| row.len() != vocabulary.len()) {
            return Err(EnsembleError::DimensionMismatch {
                expected: vocabulary.len(),
                got: row.len(),
            });
        }
        let classes: Vec<String> = rows
            .iter()
            .map(|(_, label)| label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.len() < 2 {
            return Err(EnsembleError::InsufficientTrainingData(
                "at least two classes are required".into(),
            ));
        }

        let mut features = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for (row, label) in rows {
            // classes was built from these labels
            let index = classes.binary_search(&label).unwrap_or_default();
            features.push(row);
            labels.push(index);
        }

        Ok(Self {
            vocabulary,
            classes,
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> (Vec<Vec<f64>>, Vec<usize>) {
        indices
            .iter()
            .map(|&i| (self.features[i].clone(), self.labels[i]))
            .unzip()
    }
}

// ═══════════════════════════════════════════════════════════
// Synthetic data
// ═══════════════════════════════════════════════════════════

/// Samples patients from the knowledge table's symptom profiles.
///
/// Each disease symptom is present with probability 0.8 at a strength in
/// [0.7, 1.0); up to two unrelated noise symptoms are added at [0.1, 0.4).
pub struct SyntheticDataGenerator<'a> {
    table: &'a KnowledgeTable,
    samples_per_disease: usize,
}

impl<'a> SyntheticDataGenerator<'a> {
    pub fn new(table: &'a KnowledgeTable, samples_per_disease: usize) -> Self {
        Self {
            table,
            samples_per_disease,
        }
    }

    pub fn generate(&self, rng: &mut dyn RandomSource) -> Result<TrainingSet, EnsembleError> {
        let vocabulary = FeatureVocabulary::new(self.table.symptom_ids());
        let dims = vocabulary.len();
        let mut rows = Vec::new();

        for disease in self.table.disease_codes() {
            let profile: Vec<usize> = self
                .table
                .symptoms_for(disease)
                .iter()
                .filter_map(|s| vocabulary.position(s))
                .collect();
            if profile.is_empty() {
                continue;
            }
            for _ in 0..self.samples_per_disease {
                let mut row = vec![0.0; dims];
                for &i in &profile {
                    if rng.uniform() < SYMPTOM_PRESENCE {
                        row[i] = rng.between(PRESENT_RANGE.0, PRESENT_RANGE.1);
                    }
                }
                let noise = rng.below(MAX_NOISE_SYMPTOMS + 1);
                for i in rng.sample_distinct(dims, noise) {
                    if row[i] == 0.0 {
                        row[i] = rng.between(NOISE_RANGE.0, NOISE_RANGE.1);
                    }
                }
                rows.push((row, disease.to_string()));
            }
        }

        tracing::info!(
            samples = rows.len(),
            features = dims,
            "Synthetic training data generated"
        );
        TrainingSet::new(vocabulary, rows)
    }
}

// ═══════════════════════════════════════════════════════════
// Trainer
// ═══════════════════════════════════════════════════════════

/// Holdout accuracy per member and for the combined ensemble.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub holdout_samples: usize,
    pub member_accuracy: Vec<(MemberKind, f64)>,
    /// `None` when the holdout split is empty.
    pub ensemble_accuracy: Option<f64>,
}

pub struct Trainer {
    config: TrainingConfig,
    member_weights: Vec<(MemberKind, f64)>,
}

impl Trainer {
    pub fn new(config: TrainingConfig, member_weights: Vec<(MemberKind, f64)>) -> Self {
        Self {
            config,
            member_weights,
        }
    }

    /// Fit every configured member on a shuffled split and assemble a
    /// snapshot with the given version.
    pub fn train(
        &self,
        set: &TrainingSet,
        version: u64,
        rng: &mut dyn RandomSource,
    ) -> Result<EnsembleSnapshot, EnsembleError> {
        if set.is_empty() {
            return Err(EnsembleError::InsufficientTrainingData("no samples".into()));
        }

        let mut order: Vec<usize> = (0..set.len()).collect();
        rng.shuffle(&mut order);
        let holdout = ((set.len() as f64) * self.config.holdout_fraction).floor() as usize;
        let holdout = holdout.min(set.len() - 1);
        let (holdout_idx, train_idx) = order.split_at(holdout);

        let (train_x, train_y) = set.subset(train_idx);
        let (test_x, test_y) = set.subset(holdout_idx);
        let n_classes = set.classes.len();

        let mut members = Vec::with_capacity(self.member_weights.len());
        let mut member_accuracy = Vec::with_capacity(self.member_weights.len());
        for &(kind, weight) in &self.member_weights {
            let model: Box<dyn ProbabilisticClassifier> = match kind {
                MemberKind::RandomForest => Box::new(RandomForest::fit(
                    &train_x, &train_y, n_classes, &self.config, rng,
                )),
                MemberKind::GradientBoosting => Box::new(GradientBoosting::fit(
                    &train_x, &train_y, n_classes, &self.config, rng,
                )),
                MemberKind::LogisticRegression => Box::new(LogisticRegression::fit(
                    &train_x, &train_y, n_classes, &self.config,
                )),
            };
            if !test_x.is_empty() {
                member_accuracy.push((kind, accuracy(&test_x, &test_y, |x| model.predict_distribution(x))));
            }
            members.push(EnsembleMember::new(weight, model));
        }

        let ensemble_accuracy = (!test_x.is_empty()).then(|| {
            accuracy(&test_x, &test_y, |x| {
                let mut combined = vec![0.0; n_classes];
                for member in &members {
                    for (acc, p) in combined.iter_mut().zip(member.model.predict_distribution(x)) {
                        *acc += member.weight * p;
                    }
                }
                combined
            })
        });

        let report = TrainingReport {
            train_samples: train_idx.len(),
            holdout_samples: holdout_idx.len(),
            member_accuracy,
            ensemble_accuracy,
        };
        tracing::info!(
            version,
            train = report.train_samples,
            holdout = report.holdout_samples,
            accuracy = ?report.ensemble_accuracy,
            "Ensemble trained"
        );

        Ok(EnsembleSnapshot::new(version, set.vocabulary.clone(), set.classes.clone(), members)?
            .with_report(report))
    }
}

fn accuracy<F>(features: &[Vec<f64>], labels: &[usize], predict: F) -> f64
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let hits = features
        .iter()
        .zip(labels)
        .filter(|&(x, &y)| argmax(&predict(x)) == y)
        .count();
    hits as f64 / features.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ensemble::random::seeded;

    fn fast_config() -> TrainingConfig {
        TrainingConfig {
            samples_per_disease: 12,
            forest_trees: 8,
            forest_max_depth: 8,
            forest_min_samples_split: 2,
            boosting_rounds: 5,
            boosting_learning_rate: 0.3,
            boosting_max_depth: 2,
            logistic_epochs: 60,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn synthetic_data_covers_every_disease() {
        let table = KnowledgeTable::builtin();
        let set = SyntheticDataGenerator::new(&table, 5)
            .generate(&mut seeded(42))
            .unwrap();
        assert_eq!(set.classes.len(), table.disease_codes().count());
        assert_eq!(set.len(), 5 * set.classes.len());
        assert!(set
            .features
            .iter()
            .flatten()
            .all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn same_seed_same_data() {
        let table = KnowledgeTable::builtin();
        let generator = SyntheticDataGenerator::new(&table, 3);
        let a = generator.generate(&mut seeded(11)).unwrap();
        let b = generator.generate(&mut seeded(11)).unwrap();
        assert_eq!(a.features, b.features);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn training_set_rejects_single_class_and_bad_rows() {
        let vocab = FeatureVocabulary::new(["a", "b"]);
        let err = TrainingSet::new(vocab.clone(), vec![(vec![1.0, 0.0], "x".into())]).unwrap_err();
        assert!(matches!(err, EnsembleError::InsufficientTrainingData(_)));

        let err = TrainingSet::new(vocab, vec![(vec![1.0], "x".into())]).unwrap_err();
        assert!(matches!(err, EnsembleError::DimensionMismatch { .. }));
    }

    #[test]
    fn trains_snapshot_with_report() {
        let table = KnowledgeTable::builtin();
        let config = fast_config();
        let set = SyntheticDataGenerator::new(&table, config.samples_per_disease)
            .generate(&mut seeded(config.seed))
            .unwrap();
        let trainer = Trainer::new(config, EngineConfig::default().member_weights);
        let snapshot = trainer.train(&set, 1, &mut seeded(7)).unwrap();

        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.members.len(), 3);
        let report = snapshot.report.as_ref().unwrap();
        assert_eq!(report.train_samples + report.holdout_samples, set.len());
        assert_eq!(report.member_accuracy.len(), 3);
        // well above chance over sixteen classes
        assert!(report.ensemble_accuracy.unwrap() > 0.2);
    }
}
