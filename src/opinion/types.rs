use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::ValidationResult;

/// Unit separator between values in [`ExternalOpinionPayload::searchable_text`].
/// Not whitespace, so `\s` in the safety patterns never crosses it.
pub const FIELD_SEPARATOR: &str = "\u{1f}";

/// Diagnostic opinion supplied by the caller from an external source.
/// Untrusted until validated; loosely typed so malformed input stays
/// representable and can be reported instead of rejected at parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExternalOpinionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_diagnosis: Option<PrimaryDiagnosis>,
    /// Raw JSON so non-numeric values survive parsing.
    #[serde(default, alias = "confidence_score", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub differential_diagnoses: Vec<DifferentialItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_management: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_education: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_investigations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_flags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_criteria: Option<Value>,
    /// Any other declared fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Either a bare name or an object carrying `disease_name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PrimaryDiagnosis {
    Text(String),
    Structured {
        disease_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disease_code: Option<String>,
    },
}

impl PrimaryDiagnosis {
    pub fn name(&self) -> &str {
        match self {
            Self::Text(name) => name,
            Self::Structured { disease_name, .. } => disease_name,
        }
    }

    /// Explicit code if one was given.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::Structured { disease_code, .. } => disease_code.as_deref(),
        }
    }
}

/// A differential entry, bare or with a probability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DifferentialItem {
    Name(String),
    Scored {
        #[serde(alias = "diagnosis", alias = "disease")]
        disease_name: String,
        #[serde(default, alias = "confidence", skip_serializing_if = "Option::is_none")]
        probability: Option<f64>,
    },
}

impl DifferentialItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Scored { disease_name, .. } => disease_name,
        }
    }

    /// Stated probability clamped to [0, 1]; 0 when absent.
    pub fn probability(&self) -> f64 {
        match self {
            Self::Name(_) => 0.0,
            Self::Scored { probability, .. } => probability
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(0.0),
        }
    }
}

/// How the payload's confidence field reads.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfidenceField {
    Missing,
    /// Present but not a number in [0, 1].
    Invalid(Value),
    Valid(f64),
}

impl ExternalOpinionPayload {
    pub fn confidence_field(&self) -> ConfidenceField {
        match &self.confidence {
            None => ConfidenceField::Missing,
            Some(value) => match value.as_f64() {
                Some(c) if (0.0..=1.0).contains(&c) => ConfidenceField::Valid(c),
                _ => ConfidenceField::Invalid(value.clone()),
            },
        }
    }

    pub fn reasoning(&self) -> &str {
        self.clinical_reasoning.as_deref().unwrap_or("")
    }

    /// Whether a recommended field is present (for completeness scoring).
    pub fn has_field(&self, field: &str) -> bool {
        match field {
            "primary_diagnosis" => self.primary_diagnosis.is_some(),
            "confidence" => self.confidence.is_some(),
            "recommended_investigations" => self.recommended_investigations.is_some(),
            "immediate_management" => self.immediate_management.is_some(),
            "red_flags" => self.red_flags.is_some(),
            "referral_criteria" => self.referral_criteria.is_some(),
            "clinical_reasoning" => self.clinical_reasoning.is_some(),
            "patient_education" => self.patient_education.is_some(),
            other => self.extra.contains_key(other),
        }
    }

    /// Every string value in the payload, lowercased and joined with
    /// [`FIELD_SEPARATOR`] so no pattern can span two values.
    pub fn searchable_text(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        let mut parts = Vec::new();
        collect_strings(&value, &mut parts);
        parts.join(FIELD_SEPARATOR).to_lowercase()
    }
}

fn collect_strings<'v>(value: &'v Value, out: &mut Vec<&'v str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Result of validating an external opinion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpinionAssessment {
    /// `is_valid`, `confidence_multiplier`, warnings, recommendations, and
    /// the opinion's differential resolved to known codes.
    #[serde(flatten)]
    pub result: ValidationResult,
    pub quality_score: f64,
    /// Stated confidence, or the fallback when it was malformed. `None`
    /// when missing.
    pub confidence: Option<f64>,
    /// Canonical disease code of the primary diagnosis, if recognized.
    pub resolved_primary: Option<String>,
    pub safety_flags: Vec<String>,
    /// Structural problems; any error makes the opinion invalid.
    pub errors: Vec<String>,
}

impl OpinionAssessment {
    pub fn is_valid(&self) -> bool {
        self.result.is_valid
    }

    /// Stated confidence scaled by the assessment's multiplier.
    pub fn effective_confidence(&self) -> Option<f64> {
        self.confidence
            .map(|c| (c * self.result.confidence_multiplier).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_structured_and_text_primary() {
        let p: ExternalOpinionPayload =
            serde_json::from_value(json!({"primary_diagnosis": {"disease_name": "Malaria"}})).unwrap();
        assert_eq!(p.primary_diagnosis.unwrap().name(), "Malaria");

        let p: ExternalOpinionPayload =
            serde_json::from_value(json!({"primary_diagnosis": "Typhoid fever"})).unwrap();
        assert_eq!(p.primary_diagnosis.unwrap().name(), "Typhoid fever");
    }

    #[test]
    fn confidence_field_states() {
        let p: ExternalOpinionPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.confidence_field(), ConfidenceField::Missing);

        let p: ExternalOpinionPayload =
            serde_json::from_value(json!({"confidence_score": "high"})).unwrap();
        assert!(matches!(p.confidence_field(), ConfidenceField::Invalid(_)));

        let p: ExternalOpinionPayload = serde_json::from_value(json!({"confidence": 1.4})).unwrap();
        assert!(matches!(p.confidence_field(), ConfidenceField::Invalid(_)));

        let p: ExternalOpinionPayload = serde_json::from_value(json!({"confidence": 0.7})).unwrap();
        assert_eq!(p.confidence_field(), ConfidenceField::Valid(0.7));
    }

    #[test]
    fn differential_items_accept_both_shapes() {
        let p: ExternalOpinionPayload = serde_json::from_value(json!({
            "differential_diagnoses": ["pneumonia", {"disease_name": "tuberculosis", "confidence": 0.3}]
        }))
        .unwrap();
        assert_eq!(p.differential_diagnoses[0].probability(), 0.0);
        assert_eq!(p.differential_diagnoses[1].name(), "tuberculosis");
        assert!((p.differential_diagnoses[1].probability() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn extra_fields_are_kept_and_searchable() {
        let p: ExternalOpinionPayload = serde_json::from_value(json!({
            "primary_diagnosis": "Malaria",
            "follow_up": "Return in 3 DAYS"
        }))
        .unwrap();
        assert!(p.has_field("follow_up"));
        let text = p.searchable_text();
        assert!(text.contains("return in 3 days"));
        assert!(text.contains("malaria"));
        assert!(!text.contains("follow_up"));
    }

    #[test]
    fn searchable_text_keeps_values_apart() {
        let p: ExternalOpinionPayload = serde_json::from_value(json!({
            "red_flags": ["Do not", "see a doctor"]
        }))
        .unwrap();
        assert_eq!(p.searchable_text(), "do not\u{1f}see a doctor");
    }
}
