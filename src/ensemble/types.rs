use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// Concrete classifier family of an ensemble member, selected at
/// configuration time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    RandomForest,
    GradientBoosting,
    LogisticRegression,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
            Self::LogisticRegression => "logistic_regression",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classifier that maps an encoded feature vector to a probability
/// distribution over the snapshot's classes.
///
/// The returned vector is indexed like `EnsembleSnapshot::classes`; entries
/// are in [0, 1] and sum to 1.
pub trait ProbabilisticClassifier: Send + Sync + fmt::Debug {
    fn kind(&self) -> MemberKind;

    fn predict_distribution(&self, features: &[f64]) -> Vec<f64>;
}

/// One weighted member of an ensemble snapshot.
#[derive(Debug)]
pub struct EnsembleMember {
    pub weight: f64,
    pub model: Box<dyn ProbabilisticClassifier>,
}

impl EnsembleMember {
    pub fn new(weight: f64, model: Box<dyn ProbabilisticClassifier>) -> Self {
        Self { weight, model }
    }

    pub fn kind(&self) -> MemberKind {
        self.model.kind()
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// A disease with its probability, as listed in differentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedDiagnosis {
    pub disease_code: String,
    pub probability: f64,
}

/// Top prediction of one ensemble member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberPrediction {
    pub kind: MemberKind,
    pub disease_code: String,
    pub probability: f64,
}

/// Combined ensemble output for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDecision {
    /// Combined probability per class, in snapshot class order.
    pub combined_distribution: Vec<RankedDiagnosis>,
    pub primary_disease_code: String,
    pub primary_probability: f64,
    /// Other classes by descending probability, capped at top-K.
    pub differential: Vec<RankedDiagnosis>,
    /// Normalized Shannon entropy of the combined distribution.
    pub uncertainty_score: f64,
    /// Fraction of members whose top class equals the majority top class.
    pub agreement_score: f64,
    /// Empty when the input vector carried no signal.
    pub member_predictions: Vec<MemberPrediction>,
    pub snapshot_version: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("No ensemble snapshot is loaded")]
    ModelNotReady,

    #[error("Ensemble snapshot is invalid: {0}")]
    InvalidSnapshot(String),

    #[error("Feature vector has {got} dimensions, vocabulary has {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Insufficient training data: {0}")]
    InsufficientTrainingData(String),

    #[error("A training pass is already running")]
    TrainingInProgress,

    #[error("Snapshot lock poisoned")]
    LockPoisoned,
}
