//! Weighted ensemble of probabilistic classifiers.
//!
//! Members are trained together into an immutable `EnsembleSnapshot`,
//! published through a `SnapshotStore`, and combined per request by the
//! `EnsembleScorer` into one distribution with entropy-based uncertainty
//! and cross-member agreement.

pub mod classifiers;
pub mod random;
pub mod scorer;
pub mod snapshot;
pub mod training;
pub mod tree;
pub mod types;
pub mod vocabulary;

pub use random::{seeded, RandomSource};
pub use scorer::{normalized_entropy, score_vector, EnsembleScorer};
pub use snapshot::{EnsembleSnapshot, SnapshotStore};
pub use training::{SyntheticDataGenerator, Trainer, TrainingReport, TrainingSet};
pub use types::{
    EnsembleDecision, EnsembleError, EnsembleMember, MemberKind, MemberPrediction,
    ProbabilisticClassifier, RankedDiagnosis,
};
pub use vocabulary::FeatureVocabulary;
