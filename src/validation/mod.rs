//! Declarative clinical validation of a proposed diagnosis.
//!
//! Four rule categories (age, symptom compatibility, geography, severity)
//! each contribute warnings and a multiplicative confidence penalty.

pub mod engine;
pub mod rules;
pub mod types;

pub use engine::ClinicalValidator;
pub use rules::{AgeBound, AgeRules, CompatibilityRule, GeographicRule, RuleSet, SeverityRules};
pub use types::{
    PatientContext, RuleConfigError, Severity, ValidationResult, ValidationWarning, WarningKind,
};
