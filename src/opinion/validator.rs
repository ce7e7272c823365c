use std::collections::BTreeSet;

use crate::knowledge::KnowledgeTable;
use crate::validation::{Severity, ValidationResult, ValidationWarning, WarningKind};

use super::matching::resolve_disease_code;
use super::patterns::{
    emergency_keywords, find_unsafe, ELDERLY_CAUTION_MEDICATIONS, EMERGENCY_KEYWORD_LIMIT,
    PEDIATRIC_CAUTION_MEDICATIONS,
};
use super::sanitize::FALLBACK_CONFIDENCE;
use super::types::{ConfidenceField, ExternalOpinionPayload, OpinionAssessment};

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.3;

/// Fields a complete opinion carries.
pub const RECOMMENDED_FIELDS: &[&str] = &[
    "primary_diagnosis",
    "confidence",
    "recommended_investigations",
    "immediate_management",
    "red_flags",
    "referral_criteria",
];

const MIN_CONFIDENCE: f64 = 0.1;
const LOW_CONFIDENCE: f64 = 0.4;
const HIGH_CONFIDENCE: f64 = 0.8;
const MIN_REASONING_FOR_HIGH_CONFIDENCE: usize = 100;
const MIN_SYMPTOM_COVERAGE: f64 = 0.3;
const PEDIATRIC_AGE_LIMIT: u32 = 18;
const ELDERLY_AGE_LIMIT: u32 = 65;

const MISSING_FIELDS_FACTOR: f64 = 0.8;
const INVALID_CONFIDENCE_FACTOR: f64 = 0.8;
const UNSAFE_ADVICE_FACTOR: f64 = 0.5;
const LOW_COVERAGE_FACTOR: f64 = 0.7;
const MISMATCH_FACTOR: f64 = 0.8;

/// Structural, safety and appropriateness checks on an external opinion.
pub struct ExternalOpinionValidator<'a> {
    table: &'a KnowledgeTable,
    quality_threshold: f64,
}

/// Running state of one assessment.
struct Assessment {
    quality: f64,
    multiplier: f64,
    warnings: Vec<ValidationWarning>,
    errors: Vec<String>,
    safety_flags: Vec<String>,
}

impl Assessment {
    fn new() -> Self {
        Self {
            quality: 1.0,
            multiplier: 1.0,
            warnings: Vec::new(),
            errors: Vec::new(),
            safety_flags: Vec::new(),
        }
    }

    fn error(&mut self, message: String) {
        tracing::debug!(error = %message, "External opinion error");
        self.errors.push(message);
    }
}

impl<'a> ExternalOpinionValidator<'a> {
    pub fn new(table: &'a KnowledgeTable) -> Self {
        Self {
            table,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    /// Assess `payload` against the engine's own primary diagnosis, the
    /// patient's canonical symptoms and age. Never fails; problems are
    /// reported in the returned assessment.
    pub fn validate(
        &self,
        payload: &ExternalOpinionPayload,
        internal_primary: Option<&str>,
        symptoms: &[String],
        age: Option<u32>,
    ) -> OpinionAssessment {
        let mut a = Assessment::new();
        let text = payload.searchable_text();

        let confidence = self.check_structure(payload, &mut a);
        self.check_safety(&text, &mut a);
        if let Some(age) = age {
            check_medications(&text, age, &mut a);
        }
        let resolved_primary = self.check_diagnosis(payload, internal_primary, &mut a);
        check_symptom_coverage(&text, symptoms, &mut a);
        if let Some(c) = confidence {
            check_confidence_level(c, payload.reasoning(), &mut a);
        }

        let quality = a.quality.min(base_quality(payload)).clamp(0.0, 1.0);
        let multiplier = a.multiplier.clamp(0.0, 1.0);
        let effective = confidence.map(|c| c * multiplier);

        let mut recommendations = Vec::new();
        if !a.safety_flags.is_empty() {
            recommendations.push("Review safety concerns before using the external opinion".to_string());
        }
        if quality < 0.5 {
            recommendations
                .push("Consider requesting a new opinion or relying on the internal decision".to_string());
        }
        if a.warnings.len() > 3 {
            recommendations.push("Multiple warnings detected; manual review recommended".to_string());
        }
        if effective.is_some_and(|c| c < LOW_CONFIDENCE) {
            recommendations.push("Low confidence; seek additional clinical input".to_string());
        }

        let alternative_diagnoses: BTreeSet<String> = payload
            .differential_diagnoses
            .iter()
            .filter_map(|item| resolve_disease_code(self.table, item.name()))
            .filter(|code| Some(code) != resolved_primary.as_ref())
            .collect();

        let is_valid = a.errors.is_empty() && quality >= self.quality_threshold;
        tracing::debug!(
            is_valid,
            quality,
            errors = a.errors.len(),
            warnings = a.warnings.len(),
            safety_flags = a.safety_flags.len(),
            "External opinion assessed"
        );

        OpinionAssessment {
            result: ValidationResult {
                is_valid,
                confidence_multiplier: multiplier,
                warnings: a.warnings,
                recommendations,
                alternative_diagnoses,
            },
            quality_score: quality,
            confidence,
            resolved_primary,
            safety_flags: a.safety_flags,
            errors: a.errors,
        }
    }

    /// Field presence and confidence format. Returns the usable confidence.
    fn check_structure(&self, payload: &ExternalOpinionPayload, a: &mut Assessment) -> Option<f64> {
        let missing: Vec<&str> = RECOMMENDED_FIELDS
            .iter()
            .copied()
            .filter(|f| !payload.has_field(f))
            .collect();
        if !missing.is_empty() {
            a.warnings.push(
                ValidationWarning::warning(
                    WarningKind::MissingFields,
                    format!("Missing recommended fields: {}", missing.join(", ")),
                )
                .with("fields", missing),
            );
            a.quality *= MISSING_FIELDS_FACTOR;
        }

        if payload.primary_diagnosis.is_none() {
            a.error("Missing primary diagnosis".to_string());
        }

        match payload.confidence_field() {
            ConfidenceField::Valid(c) => Some(c),
            ConfidenceField::Missing => {
                a.warnings.push(ValidationWarning::new(
                    WarningKind::InvalidConfidence,
                    Severity::Error,
                    "Confidence is missing",
                ));
                a.error("Missing confidence score".to_string());
                None
            }
            ConfidenceField::Invalid(raw) => {
                a.warnings.push(
                    ValidationWarning::warning(
                        WarningKind::InvalidConfidence,
                        format!(
                            "Invalid confidence format (must be 0.0-1.0); using {FALLBACK_CONFIDENCE}"
                        ),
                    )
                    .with("value", raw),
                );
                a.quality *= INVALID_CONFIDENCE_FACTOR;
                Some(FALLBACK_CONFIDENCE)
            }
        }
    }

    fn check_safety(&self, text: &str, a: &mut Assessment) {
        for label in find_unsafe(text) {
            tracing::warn!(pattern = label, "Unsafe advice in external opinion");
            a.safety_flags
                .push(format!("Potentially dangerous advice detected: {label}"));
            a.warnings.push(
                ValidationWarning::warning(
                    WarningKind::UnsafeAdvice,
                    format!("External opinion contains unsafe advice: {label}"),
                )
                .with("pattern", label),
            );
            a.quality *= UNSAFE_ADVICE_FACTOR;
        }

        let hits = emergency_keywords(text);
        if hits.len() >= EMERGENCY_KEYWORD_LIMIT {
            a.warnings.push(
                ValidationWarning::info(
                    WarningKind::EmergencyLanguage,
                    "High emergency indicator count; ensure an appropriate urgency level",
                )
                .with("keywords", hits),
            );
        }
    }

    /// Resolve the opinion's primary diagnosis and compare it with the
    /// engine's own.
    fn check_diagnosis(
        &self,
        payload: &ExternalOpinionPayload,
        internal_primary: Option<&str>,
        a: &mut Assessment,
    ) -> Option<String> {
        let primary = payload.primary_diagnosis.as_ref()?;
        let resolved = primary
            .code()
            .filter(|code| self.table.contains_disease(code))
            .map(str::to_string)
            .or_else(|| resolve_disease_code(self.table, primary.name()));

        if resolved.is_none() {
            a.warnings.push(
                ValidationWarning::info(
                    WarningKind::UnknownDiagnosis,
                    format!("'{}' does not match a known disease", primary.name()),
                )
                .with("diagnosis", primary.name()),
            );
        }

        if let Some(internal) = internal_primary {
            let related = resolved
                .as_deref()
                .is_some_and(|code| self.table.are_related(internal, code));
            if !related {
                a.warnings.push(
                    ValidationWarning::warning(
                        WarningKind::DiagnosisMismatch,
                        format!(
                            "External primary diagnosis '{}' differs from '{}'",
                            primary.name(),
                            self.table.display_name(internal)
                        ),
                    )
                    .with("external", primary.name())
                    .with("internal", internal),
                );
                a.multiplier *= MISMATCH_FACTOR;
            }
        }
        resolved
    }
}

fn check_medications(text: &str, age: u32, a: &mut Assessment) {
    let (list, group) = if age < PEDIATRIC_AGE_LIMIT {
        (PEDIATRIC_CAUTION_MEDICATIONS, "pediatric")
    } else if age > ELDERLY_AGE_LIMIT {
        (ELDERLY_CAUTION_MEDICATIONS, "elderly")
    } else {
        return;
    };
    for med in list.iter().filter(|m| text.contains(*m)) {
        a.warnings.push(
            ValidationWarning::warning(
                WarningKind::AgeInappropriateMedication,
                format!("Medication '{med}' mentioned for {group} patient"),
            )
            .with("medication", *med)
            .with("age", age),
        );
    }
}

/// Share of the patient's symptoms the opinion mentions.
fn check_symptom_coverage(text: &str, symptoms: &[String], a: &mut Assessment) {
    if symptoms.is_empty() {
        return;
    }
    let mentioned = symptoms
        .iter()
        .filter(|s| {
            let id = s.to_lowercase();
            text.contains(&id) || text.contains(&id.replace('_', " "))
        })
        .count();
    let coverage = mentioned as f64 / symptoms.len() as f64;
    if coverage < MIN_SYMPTOM_COVERAGE {
        a.warnings.push(
            ValidationWarning::warning(
                WarningKind::LowSymptomCoverage,
                "Low symptom coverage; the opinion may not address the presentation",
            )
            .with("coverage", coverage),
        );
        a.quality *= LOW_COVERAGE_FACTOR;
    }
}

fn check_confidence_level(confidence: f64, reasoning: &str, a: &mut Assessment) {
    if confidence < MIN_CONFIDENCE {
        a.error(format!("Confidence too low ({confidence:.2}); opinion unreliable"));
    } else if confidence < LOW_CONFIDENCE {
        a.warnings.push(ValidationWarning::warning(
            WarningKind::LowConfidence,
            "Low confidence; consider additional assessment",
        ));
    } else if confidence > HIGH_CONFIDENCE
        && reasoning.chars().count() < MIN_REASONING_FOR_HIGH_CONFIDENCE
    {
        a.warnings.push(ValidationWarning::warning(
            WarningKind::UnsupportedConfidence,
            "High confidence with insufficient reasoning",
        ));
    }
}

/// Mean of field completeness, reasoning length and differential breadth.
fn base_quality(payload: &ExternalOpinionPayload) -> f64 {
    let present = RECOMMENDED_FIELDS
        .iter()
        .filter(|f| payload.has_field(f))
        .count();
    let completeness = present as f64 / RECOMMENDED_FIELDS.len() as f64;
    let reasoning = (payload.reasoning().chars().count() as f64 / 200.0).min(1.0);
    let differential = (payload.differential_diagnoses.len() as f64 / 3.0).min(1.0);
    (completeness + reasoning + differential) / 3.0
}
