//! External opinion intake: parsing of the loosely typed payload, safety
//! scanning, sanitization, and the structural/appropriateness assessment
//! that decides whether the opinion may take part in fusion.

pub mod matching;
pub mod patterns;
pub mod sanitize;
pub mod types;
pub mod validator;

pub use matching::resolve_disease_code;
pub use sanitize::{sanitize, sanitize_text};
pub use types::{
    ConfidenceField, DifferentialItem, ExternalOpinionPayload, OpinionAssessment,
    PrimaryDiagnosis,
};
pub use validator::ExternalOpinionValidator;
