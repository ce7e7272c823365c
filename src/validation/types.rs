use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Severity of a warning attached to a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a warning is about. Shared by clinical validation, external
/// opinion checks and fusion so the caller sees one warning list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    // Clinical rules
    AgeIncompatibility,
    AgeRiskFactor,
    MissingRequiredSymptoms,
    IncompatibleSymptoms,
    WarningSymptoms,
    GeographicRiskFactor,
    HighSeverityDisease,
    EmergencyCondition,
    RuleSkipped,

    // External opinion
    MissingFields,
    InvalidConfidence,
    UnsafeAdvice,
    EmergencyLanguage,
    LowConfidence,
    UnsupportedConfidence,
    AgeInappropriateMedication,
    DiagnosisMismatch,
    LowSymptomCoverage,
    UnknownDiagnosis,

    // Fusion
    ExternalOpinionIgnored,
    FusionDisagreement,
    HeuristicFallback,
    UnrecognizedSymptoms,
}

impl WarningKind {
    /// Opinion findings about patient safety, reported even when the
    /// opinion itself is discarded.
    pub fn is_safety_concern(self) -> bool {
        matches!(self, Self::UnsafeAdvice | Self::AgeInappropriateMedication)
    }
}

/// One structured warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationWarning {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ValidationWarning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    pub fn info(kind: WarningKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    pub fn warning(kind: WarningKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    /// Attach a metadata entry.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Exposure information about the patient beyond symptoms and age.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientContext {
    /// Region of residence, e.g. `sub_saharan_africa`.
    #[serde(alias = "patient_region")]
    pub region: Option<String>,
    /// Regions visited recently.
    pub travel_history: Vec<String>,
    /// Recorded risk factors, e.g. `immunocompromised`.
    pub risk_factors: Vec<String>,
}

/// Outcome of clinically validating one proposed diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Compounded penalty, floored; in [floor, 1].
    pub confidence_multiplier: f64,
    pub warnings: Vec<ValidationWarning>,
    pub recommendations: Vec<String>,
    pub alternative_diagnoses: BTreeSet<String>,
}

impl ValidationResult {
    pub fn has_critical(&self) -> bool {
        self.warnings.iter().any(|w| w.severity == Severity::Critical)
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &ValidationWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

/// Rule set could not be loaded or is malformed. Fatal at startup.
#[derive(Error, Debug)]
pub enum RuleConfigError {
    #[error("Failed to read rule set {0}: {1}")]
    Load(String, String),

    #[error("Failed to parse rule set: {0}")]
    Parse(String),

    #[error("Rule set has no rules")]
    Empty,

    #[error("Penalty for {rule} must be within (0, 1], got {value}")]
    InvalidPenalty { rule: String, value: f64 },

    #[error("Compatibility category {0} has no member diseases")]
    EmptyCategory(String),

    #[error("Compatibility category {0} is declared twice")]
    DuplicateCategory(String),

    #[error("Geographic rule for {0} lists neither endemic regions nor risk factors")]
    EmptyGeographicRule(String),

    #[error("Rule references unknown disease: {0}")]
    UnknownDisease(String),
}
