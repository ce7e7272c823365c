use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::knowledge::{DiseaseCategory, KnowledgeTable, SeverityTier};

use super::types::RuleConfigError;

/// Age threshold with its penalty and explanation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgeBound {
    pub age: u32,
    /// Multiplier applied when the rule fires; 1.0 means note only.
    pub penalty: f64,
    pub message: String,
}

/// One bound per age restriction class of the knowledge table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgeRules {
    /// Fires when the patient is older than `age`.
    pub pediatric_only: AgeBound,
    /// Fires when the patient is younger than `age`.
    pub adult_predominant: AgeBound,
    /// Fires from `age` upwards, informational.
    pub elderly_risk: AgeBound,
}

/// Expected and unexpected symptoms for a group of diseases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityRule {
    pub name: String,
    /// Every disease of this knowledge-table category is a member.
    #[serde(default)]
    pub category: Option<DiseaseCategory>,
    /// Additional explicit members.
    #[serde(default)]
    pub diseases: BTreeSet<String>,
    /// At least one must be present.
    #[serde(default)]
    pub required_symptoms: Vec<String>,
    /// Presence penalizes.
    #[serde(default)]
    pub incompatible_symptoms: Vec<String>,
    /// Presence is noted without penalty.
    #[serde(default)]
    pub warning_symptoms: Vec<String>,
}

impl CompatibilityRule {
    /// Member disease codes under the given knowledge table.
    pub fn members<'a>(&'a self, table: &'a KnowledgeTable) -> BTreeSet<&'a str> {
        let mut members: BTreeSet<&str> = self.diseases.iter().map(String::as_str).collect();
        if let Some(category) = self.category {
            members.extend(table.diseases_in(category));
        }
        members
    }

    pub fn applies_to(&self, disease: &str, table: &KnowledgeTable) -> bool {
        self.diseases.contains(disease)
            || self
                .category
                .is_some_and(|c| table.metadata(disease).is_some_and(|m| m.category == c))
    }
}

/// Exposure check for one disease.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeographicRule {
    pub disease: String,
    /// Empty means the knowledge table's endemic regions are used.
    #[serde(default)]
    pub endemic_regions: BTreeSet<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeverityRules {
    /// Diseases at or above this tier get a high-severity note.
    pub minimum_tier: SeverityTier,
    /// Any of these alongside a high-severity disease is an emergency.
    pub emergency_symptoms: Vec<String>,
}

/// Declarative clinical validation rules, versioned and loaded once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    pub version: String,
    pub age: AgeRules,
    pub compatibility: Vec<CompatibilityRule>,
    pub missing_required_penalty: f64,
    pub incompatible_penalty: f64,
    /// Alternative diagnoses suggested per incompatible symptom found.
    #[serde(default)]
    pub alternatives: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub geographic: Vec<GeographicRule>,
    pub severity: SeverityRules,
}

impl RuleSet {
    /// The reference rule set.
    pub fn builtin() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            version: "1.0.0".into(),
            age: AgeRules {
                pediatric_only: AgeBound {
                    age: 18,
                    penalty: 0.3,
                    message: "This disease is primarily seen in children".into(),
                },
                adult_predominant: AgeBound {
                    age: 18,
                    penalty: 0.4,
                    message: "This disease is more common in adults".into(),
                },
                elderly_risk: AgeBound {
                    age: 65,
                    penalty: 1.0,
                    message: "Higher risk and severity in elderly patients".into(),
                },
            },
            compatibility: vec![
                CompatibilityRule {
                    name: "respiratory_diseases".into(),
                    category: Some(DiseaseCategory::Respiratory),
                    diseases: BTreeSet::new(),
                    required_symptoms: strings(&["cough", "shortness_of_breath", "chest_pain", "fever"]),
                    incompatible_symptoms: strings(&["diarrhea", "vomiting", "abdominal_pain"]),
                    warning_symptoms: Vec::new(),
                },
                CompatibilityRule {
                    name: "gastrointestinal_diseases".into(),
                    category: Some(DiseaseCategory::Gastrointestinal),
                    diseases: BTreeSet::new(),
                    required_symptoms: strings(&["abdominal_pain", "nausea", "vomiting", "diarrhea"]),
                    incompatible_symptoms: strings(&["cough", "shortness_of_breath"]),
                    warning_symptoms: Vec::new(),
                },
                CompatibilityRule {
                    name: "infectious_diseases".into(),
                    category: Some(DiseaseCategory::Infectious),
                    diseases: ["tuberculosis", "hepatitis_a"].iter().map(|s| s.to_string()).collect(),
                    required_symptoms: strings(&["fever"]),
                    incompatible_symptoms: Vec::new(),
                    warning_symptoms: strings(&["fatigue", "muscle_aches"]),
                },
            ],
            missing_required_penalty: 0.6,
            incompatible_penalty: 0.7,
            alternatives: [
                ("diarrhea", &["gastroenteritis", "rotavirus", "appendicitis"]),
                ("vomiting", &["gastroenteritis", "rotavirus", "appendicitis"]),
                ("cough", &["pneumonia", "tuberculosis", "rsv"]),
                ("shortness_of_breath", &["pneumonia", "tuberculosis", "rsv"]),
            ]
            .iter()
            .map(|(symptom, alts)| (symptom.to_string(), strings(*alts)))
            .collect(),
            geographic: vec![
                GeographicRule {
                    disease: "malaria".into(),
                    endemic_regions: BTreeSet::new(),
                    risk_factors: Vec::new(),
                    message: "Consider travel history to endemic areas".into(),
                },
                GeographicRule {
                    disease: "tuberculosis".into(),
                    endemic_regions: BTreeSet::new(),
                    risk_factors: strings(&["immunocompromised", "crowded_living", "malnutrition"]),
                    message: "Consider TB risk factors and exposure history".into(),
                },
            ],
            severity: SeverityRules {
                minimum_tier: SeverityTier::High,
                emergency_symptoms: strings(&[
                    "severe_pain",
                    "high_fever",
                    "difficulty_breathing",
                    "severe_abdominal_pain",
                ]),
            },
        }
    }

    /// Load a rule set from JSON and validate it.
    pub fn load(path: &Path) -> Result<Self, RuleConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RuleConfigError::Load(path.display().to_string(), e.to_string()))?;
        let rules: Self =
            serde_json::from_str(&raw).map_err(|e| RuleConfigError::Parse(e.to_string()))?;
        rules.validate()?;
        tracing::info!(
            version = %rules.version,
            categories = rules.compatibility.len(),
            geographic = rules.geographic.len(),
            "Clinical rule set loaded"
        );
        Ok(rules)
    }

    /// Structural checks that need no knowledge table.
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        if self.compatibility.is_empty() && self.geographic.is_empty() {
            return Err(RuleConfigError::Empty);
        }

        for (rule, value) in self.penalties() {
            check_penalty(&rule, value)?;
        }

        let mut seen = BTreeSet::new();
        for category in &self.compatibility {
            if !seen.insert(category.name.as_str()) {
                return Err(RuleConfigError::DuplicateCategory(category.name.clone()));
            }
            if category.category.is_none() && category.diseases.is_empty() {
                return Err(RuleConfigError::EmptyCategory(category.name.clone()));
            }
        }
        Ok(())
    }

    /// Checks against the knowledge table the rules will run over.
    pub fn validate_against(&self, table: &KnowledgeTable) -> Result<(), RuleConfigError> {
        self.validate()?;
        for category in &self.compatibility {
            if category.members(table).is_empty() {
                return Err(RuleConfigError::EmptyCategory(category.name.clone()));
            }
            if let Some(unknown) = category.diseases.iter().find(|d| !table.contains_disease(d)) {
                return Err(RuleConfigError::UnknownDisease(unknown.clone()));
            }
        }
        for rule in &self.geographic {
            let Some(meta) = table.metadata(&rule.disease) else {
                return Err(RuleConfigError::UnknownDisease(rule.disease.clone()));
            };
            if rule.endemic_regions.is_empty() && rule.risk_factors.is_empty() && !meta.is_travel_dependent() {
                return Err(RuleConfigError::EmptyGeographicRule(rule.disease.clone()));
            }
        }
        Ok(())
    }

    pub fn geographic_rule(&self, disease: &str) -> Option<&GeographicRule> {
        self.geographic.iter().find(|r| r.disease == disease)
    }

    /// Every configured penalty with a label for error reporting.
    fn penalties(&self) -> Vec<(String, f64)> {
        vec![
            ("age.pediatric_only".into(), self.age.pediatric_only.penalty),
            ("age.adult_predominant".into(), self.age.adult_predominant.penalty),
            ("age.elderly_risk".into(), self.age.elderly_risk.penalty),
            ("missing_required_penalty".into(), self.missing_required_penalty),
            ("incompatible_penalty".into(), self.incompatible_penalty),
        ]
    }
}

/// A penalty must be a finite multiplier in (0, 1].
pub fn check_penalty(rule: &str, value: f64) -> Result<(), RuleConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(RuleConfigError::InvalidPenalty {
            rule: rule.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_valid_against_builtin_table() {
        let table = KnowledgeTable::builtin();
        RuleSet::builtin().validate_against(&table).unwrap();
    }

    #[test]
    fn category_membership_comes_from_table() {
        let table = KnowledgeTable::builtin();
        let rules = RuleSet::builtin();
        let infectious = &rules.compatibility[2];
        let members = infectious.members(&table);
        assert!(members.contains("malaria"));
        assert!(members.contains("tuberculosis"));
        assert!(members.contains("hepatitis_a"));
        assert!(!members.contains("appendicitis"));
        assert!(rules.compatibility[0].applies_to("pneumonia", &table));
        assert!(!rules.compatibility[0].applies_to("malaria", &table));
    }

    #[test]
    fn rejects_bad_penalty() {
        let mut rules = RuleSet::builtin();
        rules.incompatible_penalty = 1.5;
        assert!(matches!(
            rules.validate(),
            Err(RuleConfigError::InvalidPenalty { .. })
        ));
        rules.incompatible_penalty = 0.0;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_and_empty_categories() {
        let mut rules = RuleSet::builtin();
        rules.compatibility.push(rules.compatibility[0].clone());
        assert!(matches!(
            rules.validate(),
            Err(RuleConfigError::DuplicateCategory(_))
        ));

        let mut rules = RuleSet::builtin();
        rules.compatibility[0].category = None;
        assert!(matches!(rules.validate(), Err(RuleConfigError::EmptyCategory(_))));
    }

    #[test]
    fn empty_rule_set_is_fatal() {
        let mut rules = RuleSet::builtin();
        rules.compatibility.clear();
        rules.geographic.clear();
        assert!(matches!(rules.validate(), Err(RuleConfigError::Empty)));
    }

    #[test]
    fn unknown_disease_rejected_against_table() {
        let table = KnowledgeTable::builtin();
        let mut rules = RuleSet::builtin();
        rules.geographic.push(GeographicRule {
            disease: "dengue".into(),
            endemic_regions: BTreeSet::new(),
            risk_factors: Vec::new(),
            message: String::new(),
        });
        assert!(matches!(
            rules.validate_against(&table),
            Err(RuleConfigError::UnknownDisease(d)) if d == "dengue"
        ));
    }

    #[test]
    fn geographic_rule_needs_some_exposure_data() {
        let table = KnowledgeTable::builtin();
        let mut rules = RuleSet::builtin();
        rules.geographic.push(GeographicRule {
            disease: "mumps".into(),
            endemic_regions: BTreeSet::new(),
            risk_factors: Vec::new(),
            message: "n/a".into(),
        });
        assert!(matches!(
            rules.validate_against(&table),
            Err(RuleConfigError::EmptyGeographicRule(_))
        ));
    }

    #[test]
    fn load_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let json = serde_json::to_string_pretty(&RuleSet::builtin()).unwrap();
        std::fs::write(&path, json).unwrap();
        let loaded = RuleSet::load(&path).unwrap();
        assert_eq!(loaded, RuleSet::builtin());
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RuleSet::load(&path), Err(RuleConfigError::Parse(_))));
        assert!(matches!(
            RuleSet::load(&dir.path().join("missing.json")),
            Err(RuleConfigError::Load(..))
        ));
    }
}
