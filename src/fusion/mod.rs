//! Decision fusion: the top-level pipeline that sequences candidate
//! generation, ensemble scoring (or heuristic fallback), clinical
//! validation and external-opinion blending into one decision record.

pub mod engine;
pub mod reasoning;
pub mod types;

pub use engine::{DecisionEngine, TrainingSource};
pub use types::{
    CancelToken, DecisionMode, DiagnosisDecision, DiagnosticRequest, EngineError,
    ExternalOpinionStatus, FusionWeights, SourceKind,
};
