use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::ensemble::{EnsembleError, MemberPrediction, RankedDiagnosis};
use crate::knowledge::KnowledgeError;
use crate::opinion::ExternalOpinionPayload;
use crate::validation::{PatientContext, RuleConfigError, ValidationWarning, WarningKind};

// ═══════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════

/// One diagnostic request as received from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticRequest {
    /// Raw or already-normalized symptom tokens.
    pub symptoms: Vec<String>,
    #[serde(default, alias = "patient_age")]
    pub age: Option<u32>,
    #[serde(flatten)]
    pub context: PatientContext,
    #[serde(default)]
    pub external_opinion: Option<ExternalOpinionPayload>,
}

impl DiagnosticRequest {
    pub fn new<S: Into<String>>(symptoms: impl IntoIterator<Item = S>) -> Self {
        Self {
            symptoms: symptoms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_age(mut self, age: u32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.context.region = Some(region.into());
        self
    }

    pub fn with_opinion(mut self, opinion: ExternalOpinionPayload) -> Self {
        self.external_opinion = Some(opinion);
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════

/// Where a decision's confidence came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ensemble,
    Heuristic,
    External,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    Ensemble,
    /// No ensemble snapshot was available; the top heuristic candidate
    /// stands in for the ensemble decision.
    HeuristicOnly,
}

/// What happened to the caller's external opinion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExternalOpinionStatus {
    NotProvided,
    Accepted { quality_score: f64 },
    Discarded { reasons: Vec<String> },
}

/// Weights of the convex combination that produced the final confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FusionWeights {
    pub internal: f64,
    pub external: f64,
}

impl FusionWeights {
    pub fn internal_only() -> Self {
        Self {
            internal: 1.0,
            external: 0.0,
        }
    }

    /// `internal * alpha + external * (1 - alpha)`.
    pub fn blend(alpha: f64) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        Self {
            internal: alpha,
            external: 1.0 - alpha,
        }
    }

    pub fn apply(&self, internal: f64, external: f64) -> f64 {
        (self.internal * internal + self.external * external).clamp(0.0, 1.0)
    }
}

/// Final output of one diagnostic decision. Ownership passes to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisDecision {
    pub id: Uuid,
    pub decided_at: DateTime<Utc>,
    /// Canonical disease code.
    pub primary_diagnosis: String,
    pub primary_display_name: String,
    pub confidence: f64,
    pub differential_diagnoses: Vec<RankedDiagnosis>,
    pub uncertainty_score: f64,
    /// Zero in heuristic-only mode.
    pub agreement_score: f64,
    pub warnings: Vec<ValidationWarning>,
    pub recommendations: Vec<String>,
    pub alternative_diagnoses: BTreeSet<String>,
    pub sources_used: BTreeSet<SourceKind>,
    pub fusion_weights: FusionWeights,
    pub mode: DecisionMode,
    pub external_opinion_status: ExternalOpinionStatus,
    /// Sanitized copy of the opinion when it took part in fusion.
    pub accepted_opinion: Option<ExternalOpinionPayload>,
    pub requires_specialist_review: bool,
    pub clinical_reasoning: String,
    /// Symptoms as resolved onto the knowledge table.
    pub canonical_symptoms: Vec<String>,
    pub member_predictions: Vec<MemberPrediction>,
    /// `None` in heuristic-only mode.
    pub snapshot_version: Option<u64>,
}

impl DiagnosisDecision {
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

// ═══════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════

/// Cooperative cancellation flag, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Knowledge table error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Rule set error: {0}")]
    RuleConfig(#[from] RuleConfigError),

    #[error("Ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),

    #[error("Symptom list is empty or has no recognizable symptom")]
    InvalidSymptomInput { unmatched: Vec<String> },

    #[error("Decision cancelled")]
    Cancelled,

    #[error("Engine is shut down")]
    ShutDown,
}
