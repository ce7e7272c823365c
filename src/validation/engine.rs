use std::collections::BTreeSet;

use serde_json::Value;

use crate::knowledge::normalize::fold_token;
use crate::knowledge::{AgeRestriction, DiseaseMetadata, KnowledgeTable, SymptomNormalizer};

use super::rules::{check_penalty, AgeBound, RuleSet};
use super::types::{
    PatientContext, Severity, ValidationResult, ValidationWarning, WarningKind,
};

pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.1;
pub const DEFAULT_VALIDITY_THRESHOLD: f64 = 0.3;

/// Geography note for endemic diseases without a dedicated rule.
const DEFAULT_GEOGRAPHIC_MESSAGE: &str = "Consider travel history to endemic areas";

/// Evaluates the rule set against one proposed diagnosis.
///
/// Never fails. A rule whose parameters turn out malformed at evaluation
/// time is skipped and reported with a `rule_skipped` entry.
pub struct ClinicalValidator<'a> {
    table: &'a KnowledgeTable,
    rules: &'a RuleSet,
    floor: f64,
    validity_threshold: f64,
}

/// Running state of one evaluation.
#[derive(Default)]
struct Findings {
    multiplier: f64,
    warnings: Vec<ValidationWarning>,
    recommendations: Vec<String>,
    alternatives: BTreeSet<String>,
}

impl Findings {
    fn recommend(&mut self, text: String) {
        if !self.recommendations.contains(&text) {
            self.recommendations.push(text);
        }
    }

    /// Apply a penalty, or record the rule as skipped when the penalty is
    /// not a usable multiplier. Returns whether the rule took effect.
    fn penalize(&mut self, rule: &str, penalty: f64) -> bool {
        match check_penalty(rule, penalty) {
            Ok(()) => {
                self.multiplier *= penalty;
                true
            }
            Err(e) => {
                tracing::error!(rule, error = %e, "Clinical rule skipped");
                self.warnings.push(
                    ValidationWarning::new(WarningKind::RuleSkipped, Severity::Error, e.to_string())
                        .with("rule", rule),
                );
                false
            }
        }
    }
}

impl<'a> ClinicalValidator<'a> {
    pub fn new(table: &'a KnowledgeTable, rules: &'a RuleSet) -> Self {
        Self {
            table,
            rules,
            floor: DEFAULT_CONFIDENCE_FLOOR,
            validity_threshold: DEFAULT_VALIDITY_THRESHOLD,
        }
    }

    pub fn with_thresholds(mut self, floor: f64, validity_threshold: f64) -> Self {
        self.floor = floor;
        self.validity_threshold = validity_threshold;
        self
    }

    pub fn validate(
        &self,
        disease_code: &str,
        symptoms: &[String],
        age: Option<u32>,
        context: &PatientContext,
    ) -> ValidationResult {
        let disease = fold_token(disease_code);
        let symptoms = SymptomNormalizer::new(self.table).normalize(symptoms);
        let mut findings = Findings {
            multiplier: 1.0,
            ..Findings::default()
        };

        match self.table.metadata(&disease) {
            Some(meta) => {
                if let Some(age) = age {
                    self.check_age(meta, age, &mut findings);
                }
                self.check_symptoms(&disease, &symptoms, &mut findings);
                self.check_geography(meta, context, &mut findings);
                self.check_severity(meta, &symptoms, &mut findings);
            }
            None => {
                tracing::debug!(disease = %disease, "No metadata for disease, clinical rules not applicable");
            }
        }

        let has_critical = findings
            .warnings
            .iter()
            .any(|w| w.severity == Severity::Critical);
        let is_valid = !has_critical && findings.multiplier >= self.validity_threshold;
        let confidence_multiplier = findings.multiplier.clamp(self.floor, 1.0);

        tracing::debug!(
            disease = %disease,
            multiplier = confidence_multiplier,
            warnings = findings.warnings.len(),
            is_valid,
            "Clinical validation complete"
        );

        ValidationResult {
            is_valid,
            confidence_multiplier,
            warnings: findings.warnings,
            recommendations: findings.recommendations,
            alternative_diagnoses: findings.alternatives,
        }
    }

    fn check_age(&self, meta: &DiseaseMetadata, age: u32, out: &mut Findings) {
        let name = self.table.display_name(&meta.code);
        let age_rules = &self.rules.age;
        match meta.age_restriction {
            AgeRestriction::PediatricOnly if age > age_rules.pediatric_only.age => {
                let bound = &age_rules.pediatric_only;
                self.age_warning(
                    "age.pediatric_only",
                    bound,
                    format!("{name} is uncommon in adults (age {age}). {}", bound.message),
                    format!("0-{}", bound.age),
                    age,
                    out,
                );
            }
            AgeRestriction::AdultPredominant if age < age_rules.adult_predominant.age => {
                let bound = &age_rules.adult_predominant;
                self.age_warning(
                    "age.adult_predominant",
                    bound,
                    format!("{name} is uncommon in children (age {age}). {}", bound.message),
                    format!("{}+", bound.age),
                    age,
                    out,
                );
            }
            AgeRestriction::ElderlyRisk if age >= age_rules.elderly_risk.age => {
                let bound = &age_rules.elderly_risk;
                if out.penalize("age.elderly_risk", bound.penalty) {
                    out.warnings.push(
                        ValidationWarning::info(
                            WarningKind::AgeRiskFactor,
                            format!(
                                "{name} has higher risk and severity in elderly patients (age {age}). {}",
                                bound.message
                            ),
                        )
                        .with("patient_age", age),
                    );
                }
            }
            _ => {}
        }
    }

    fn age_warning(
        &self,
        rule: &str,
        bound: &AgeBound,
        message: String,
        expected_range: String,
        age: u32,
        out: &mut Findings,
    ) {
        if out.penalize(rule, bound.penalty) {
            out.warnings.push(
                ValidationWarning::warning(WarningKind::AgeIncompatibility, message)
                    .with("patient_age", age)
                    .with("expected_age_range", expected_range),
            );
        }
    }

    fn check_symptoms(&self, disease: &str, symptoms: &[String], out: &mut Findings) {
        let name = self.table.display_name(disease);
        for rule in &self.rules.compatibility {
            if !rule.applies_to(disease, self.table) {
                continue;
            }

            let has_required = rule.required_symptoms.iter().any(|r| symptoms.contains(r));
            if !rule.required_symptoms.is_empty()
                && !has_required
                && out.penalize("missing_required_penalty", self.rules.missing_required_penalty)
            {
                out.warnings.push(
                    ValidationWarning::warning(
                        WarningKind::MissingRequiredSymptoms,
                        format!(
                            "{name} typically presents with symptoms like: {}",
                            rule.required_symptoms.join(", ")
                        ),
                    )
                    .with("missing_symptoms", string_array(&rule.required_symptoms))
                    .with("category", rule.name.as_str()),
                );
            }

            let incompatible: Vec<String> = symptoms
                .iter()
                .filter(|s| rule.incompatible_symptoms.contains(s))
                .cloned()
                .collect();
            if !incompatible.is_empty()
                && out.penalize("incompatible_penalty", self.rules.incompatible_penalty)
            {
                out.warnings.push(
                    ValidationWarning::warning(
                        WarningKind::IncompatibleSymptoms,
                        format!("{name} rarely presents with: {}", incompatible.join(", ")),
                    )
                    .with("incompatible_symptoms", string_array(&incompatible))
                    .with("category", rule.name.as_str()),
                );
                for symptom in &incompatible {
                    for alt in self.rules.alternatives.get(symptom).into_iter().flatten() {
                        if alt != disease {
                            out.alternatives.insert(alt.clone());
                        }
                    }
                }
            }

            let noted: Vec<String> = symptoms
                .iter()
                .filter(|s| rule.warning_symptoms.contains(s))
                .cloned()
                .collect();
            if !noted.is_empty() {
                out.warnings.push(
                    ValidationWarning::info(
                        WarningKind::WarningSymptoms,
                        format!("{} noted; common but non-specific for {name}", noted.join(", ")),
                    )
                    .with("symptoms", string_array(&noted))
                    .with("category", rule.name.as_str()),
                );
            }
        }
    }

    fn check_geography(&self, meta: &DiseaseMetadata, context: &PatientContext, out: &mut Findings) {
        let rule = self.rules.geographic_rule(&meta.code);
        let regions = match rule {
            Some(rule) if !rule.endemic_regions.is_empty() => &rule.endemic_regions,
            _ => &meta.endemic_regions,
        };

        if !regions.is_empty() {
            let exposure: Vec<String> = context
                .region
                .iter()
                .chain(&context.travel_history)
                .map(|r| fold_token(r))
                .collect();
            let exposed = regions
                .iter()
                .any(|region| exposure.iter().any(|e| names_region(e, region)));
            if !exposed {
                let message = rule.map_or(DEFAULT_GEOGRAPHIC_MESSAGE, |r| r.message.as_str());
                let listed: Vec<String> = regions.iter().cloned().collect();
                out.warnings.push(
                    ValidationWarning::info(WarningKind::GeographicRiskFactor, message)
                        .with("endemic_regions", string_array(&listed)),
                );
                out.recommend(format!("Verify travel history to {}", listed.join(", ")));
            }
        }

        let Some(rule) = rule else {
            return;
        };
        if !rule.risk_factors.is_empty() {
            let recorded = context
                .risk_factors
                .iter()
                .map(|f| fold_token(f))
                .any(|f| rule.risk_factors.contains(&f));
            if !recorded {
                out.recommend(format!(
                    "{}: assess {}",
                    rule.message,
                    rule.risk_factors.join(", ")
                ));
            }
        }
    }

    fn check_severity(&self, meta: &DiseaseMetadata, symptoms: &[String], out: &mut Findings) {
        let name = self.table.display_name(&meta.code);
        let severity = &self.rules.severity;

        if meta.severity >= severity.minimum_tier {
            out.warnings.push(
                ValidationWarning::info(
                    WarningKind::HighSeverityDisease,
                    format!("{name} is a serious condition requiring prompt medical attention"),
                )
                .with("disease", meta.code.as_str()),
            );
            out.recommend("Ensure appropriate follow-up and monitoring".into());

            let emergency: Vec<String> = symptoms
                .iter()
                .filter(|s| severity.emergency_symptoms.contains(s))
                .cloned()
                .collect();
            if !emergency.is_empty() {
                out.warnings.push(
                    ValidationWarning::new(
                        WarningKind::EmergencyCondition,
                        Severity::Critical,
                        format!("{name} with severe symptoms may require immediate medical intervention"),
                    )
                    .with("disease", meta.code.as_str())
                    .with("emergency_symptoms", string_array(&emergency)),
                );
                out.recommend("Consider immediate referral or emergency care".into());
            }
        }

        if meta.chronic {
            out.recommend(format!(
                "{name} requires long-term management and regular follow-up"
            ));
        }
    }
}

/// Whether a folded exposure token names `region`, whole or as an
/// underscore-delimited run (`rural_sub_saharan_africa` names
/// `sub_saharan_africa`, `west_africa` does not name `africa_west`).
fn names_region(exposure: &str, region: &str) -> bool {
    let region = fold_token(region);
    !region.is_empty() && format!("_{exposure}_").contains(&format!("_{region}_"))
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}
