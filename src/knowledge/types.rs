use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Disease metadata
// ---------------------------------------------------------------------------

/// Age population a disease is restricted to or weighted towards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgeRestriction {
    #[default]
    None,
    /// Seen almost exclusively in children.
    PediatricOnly,
    /// Uncommon before adulthood.
    AdultPredominant,
    /// Not restricted, but risk and severity rise with age.
    ElderlyRisk,
}

impl AgeRestriction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PediatricOnly => "pediatric_only",
            Self::AdultPredominant => "adult_predominant",
            Self::ElderlyRisk => "elderly_risk",
        }
    }
}

/// Organ-system grouping used for symptom compatibility and relatedness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseCategory {
    Respiratory,
    Gastrointestinal,
    Infectious,
}

impl DiseaseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respiratory => "respiratory",
            Self::Gastrointestinal => "gastrointestinal",
            Self::Infectious => "infectious",
        }
    }
}

/// Clinical severity tier of a disease.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

/// Per-disease metadata from the knowledge table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiseaseMetadata {
    pub code: String,
    /// Human-readable name. Falls back to a title-cased code when absent.
    #[serde(default)]
    pub name: Option<String>,
    pub category: DiseaseCategory,
    #[serde(default)]
    pub age_restriction: AgeRestriction,
    /// Regions where the disease is endemic. Empty means not travel-dependent.
    #[serde(default)]
    pub endemic_regions: BTreeSet<String>,
    #[serde(default)]
    pub severity: SeverityTier,
    #[serde(default)]
    pub chronic: bool,
}

impl DiseaseMetadata {
    pub fn is_travel_dependent(&self) -> bool {
        !self.endemic_regions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------------

/// Weighted symptom → disease association.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymptomAssociation {
    pub symptom_id: String,
    pub disease_code: String,
    /// Association strength in (0, 1].
    pub weight: f64,
}

/// Synonym group mapping phrase variants onto one canonical symptom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynonymGroup {
    pub canonical: String,
    pub synonyms: Vec<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Failed to read knowledge file {0}: {1}")]
    Load(String, String),

    #[error("Failed to parse knowledge file {0}: {1}")]
    Parse(String, String),

    #[error("Association {symptom} -> {disease} has weight {weight} outside (0, 1]")]
    InvalidWeight {
        symptom: String,
        disease: String,
        weight: f64,
    },

    #[error("Association references undeclared disease: {0}")]
    UnknownDisease(String),

    #[error("Duplicate disease code: {0}")]
    DuplicateDisease(String),

    #[error("Knowledge table is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_restriction_serializes_snake_case() {
        let json = serde_json::to_string(&AgeRestriction::PediatricOnly).unwrap();
        assert_eq!(json, "\"pediatric_only\"");
        assert_eq!(AgeRestriction::PediatricOnly.as_str(), "pediatric_only");
    }

    #[test]
    fn metadata_defaults_apply() {
        let meta: DiseaseMetadata =
            serde_json::from_str(r#"{"code":"flu","category":"respiratory"}"#).unwrap();
        assert_eq!(meta.age_restriction, AgeRestriction::None);
        assert_eq!(meta.severity, SeverityTier::Low);
        assert!(!meta.is_travel_dependent());
        assert!(!meta.chronic);
    }

    #[test]
    fn severity_ordering() {
        assert!(SeverityTier::Critical > SeverityTier::High);
        assert!(SeverityTier::Moderate > SeverityTier::Low);
    }
}
