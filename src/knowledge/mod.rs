//! Disease knowledge table and symptom normalization.
//!
//! The table is static reference content: weighted symptom → disease
//! associations, per-disease metadata and a synonym list. It is loaded
//! once and shared read-only by every pipeline stage.

pub mod normalize;
pub mod table;
pub mod types;

pub use normalize::{MatchKind, NormalizationReport, SymptomNormalizer};
pub use table::KnowledgeTable;
pub use types::{
    AgeRestriction, DiseaseCategory, DiseaseMetadata, KnowledgeError, SeverityTier,
    SymptomAssociation, SynonymGroup,
};
