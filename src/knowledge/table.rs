use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::de::DeserializeOwned;

use super::types::{
    AgeRestriction, DiseaseCategory, DiseaseMetadata, KnowledgeError, SeverityTier,
    SymptomAssociation, SynonymGroup,
};

/// Static symptom → disease association table.
///
/// Built once at startup (bundled defaults or JSON files) and shared
/// read-only across requests. A refresh replaces the whole table.
#[derive(Debug, Clone)]
pub struct KnowledgeTable {
    diseases: BTreeMap<String, DiseaseMetadata>,
    /// symptom_id → [(disease_code, weight)], disease order as declared.
    associations: BTreeMap<String, Vec<(String, f64)>>,
    synonyms: Vec<SynonymGroup>,
}

impl KnowledgeTable {
    /// Build and validate a table from its three parts.
    pub fn new(
        diseases: Vec<DiseaseMetadata>,
        associations: Vec<SymptomAssociation>,
        synonyms: Vec<SynonymGroup>,
    ) -> Result<Self, KnowledgeError> {
        if diseases.is_empty() || associations.is_empty() {
            return Err(KnowledgeError::Empty);
        }

        let mut by_code = BTreeMap::new();
        for meta in diseases {
            let code = meta.code.clone();
            if by_code.insert(code.clone(), meta).is_some() {
                return Err(KnowledgeError::DuplicateDisease(code));
            }
        }

        let mut by_symptom: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for assoc in associations {
            if !(assoc.weight > 0.0 && assoc.weight <= 1.0) {
                return Err(KnowledgeError::InvalidWeight {
                    symptom: assoc.symptom_id,
                    disease: assoc.disease_code,
                    weight: assoc.weight,
                });
            }
            if !by_code.contains_key(&assoc.disease_code) {
                return Err(KnowledgeError::UnknownDisease(assoc.disease_code));
            }
            by_symptom
                .entry(assoc.symptom_id)
                .or_default()
                .push((assoc.disease_code, assoc.weight));
        }

        Ok(Self {
            diseases: by_code,
            associations: by_symptom,
            synonyms,
        })
    }

    /// Load the table from `diseases.json`, `associations.json` and
    /// `synonyms.json` inside `dir`.
    pub fn load(dir: &Path) -> Result<Self, KnowledgeError> {
        let diseases: Vec<DiseaseMetadata> = read_json(dir, "diseases.json")?;
        let associations: Vec<SymptomAssociation> = read_json(dir, "associations.json")?;
        let synonyms: Vec<SynonymGroup> = read_json(dir, "synonyms.json")?;

        let table = Self::new(diseases, associations, synonyms)?;
        tracing::info!(
            diseases = table.diseases.len(),
            symptoms = table.associations.len(),
            dir = %dir.display(),
            "Knowledge table loaded"
        );
        Ok(table)
    }

    /// Bundled reference table.
    pub fn builtin() -> Self {
        let diseases = BUILTIN_DISEASES
            .iter()
            .map(|d| DiseaseMetadata {
                code: d.code.to_string(),
                name: Some(d.name.to_string()),
                category: d.category,
                age_restriction: d.age,
                endemic_regions: d.endemic.iter().map(|r| r.to_string()).collect(),
                severity: d.severity,
                chronic: d.chronic,
            })
            .collect();

        let associations = BUILTIN_ASSOCIATIONS
            .iter()
            .flat_map(|(symptom, diseases)| {
                diseases.iter().map(move |(disease, weight)| SymptomAssociation {
                    symptom_id: symptom.to_string(),
                    disease_code: disease.to_string(),
                    weight: *weight,
                })
            })
            .collect();

        let synonyms = BUILTIN_SYNONYMS
            .iter()
            .map(|(canonical, syns)| SynonymGroup {
                canonical: canonical.to_string(),
                synonyms: syns.iter().map(|s| s.to_string()).collect(),
            })
            .collect();

        Self::new(diseases, associations, synonyms).expect("Invalid bundled knowledge table")
    }

    // ── Lookups ─────────────────────────────────────────────

    pub fn metadata(&self, code: &str) -> Option<&DiseaseMetadata> {
        self.diseases.get(code)
    }

    pub fn contains_disease(&self, code: &str) -> bool {
        self.diseases.contains_key(code)
    }

    pub fn contains_symptom(&self, symptom_id: &str) -> bool {
        self.associations.contains_key(symptom_id)
    }

    /// Diseases associated with a canonical symptom, with weights.
    pub fn associations_for(&self, symptom_id: &str) -> &[(String, f64)] {
        self.associations
            .get(symptom_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn weight(&self, symptom_id: &str, disease_code: &str) -> Option<f64> {
        self.associations_for(symptom_id)
            .iter()
            .find(|(d, _)| d == disease_code)
            .map(|(_, w)| *w)
    }

    /// Canonical symptom identifiers, sorted.
    pub fn symptom_ids(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }

    /// Disease codes, sorted.
    pub fn disease_codes(&self) -> impl Iterator<Item = &str> {
        self.diseases.keys().map(String::as_str)
    }

    pub fn diseases(&self) -> impl Iterator<Item = &DiseaseMetadata> {
        self.diseases.values()
    }

    pub fn synonyms(&self) -> &[SynonymGroup] {
        &self.synonyms
    }

    /// Canonical symptoms associated with a disease.
    pub fn symptoms_for(&self, disease_code: &str) -> Vec<&str> {
        self.associations
            .iter()
            .filter(|(_, ds)| ds.iter().any(|(d, _)| d == disease_code))
            .map(|(s, _)| s.as_str())
            .collect()
    }

    pub fn display_name(&self, code: &str) -> String {
        match self.diseases.get(code).and_then(|m| m.name.clone()) {
            Some(name) => name,
            None => title_case(code),
        }
    }

    /// Whether two diseases belong to the same relationship group:
    /// same organ-system category (respiratory or gastrointestinal),
    /// or both pediatric-only.
    pub fn are_related(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let (Some(ma), Some(mb)) = (self.diseases.get(a), self.diseases.get(b)) else {
            return false;
        };
        let same_system = ma.category == mb.category
            && matches!(
                ma.category,
                DiseaseCategory::Respiratory | DiseaseCategory::Gastrointestinal
            );
        let both_pediatric = ma.age_restriction == AgeRestriction::PediatricOnly
            && mb.age_restriction == AgeRestriction::PediatricOnly;
        same_system || both_pediatric
    }

    /// Diseases of one category.
    pub fn diseases_in(&self, category: DiseaseCategory) -> BTreeSet<&str> {
        self.diseases
            .values()
            .filter(|m| m.category == category)
            .map(|m| m.code.as_str())
            .collect()
    }
}

fn read_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T, KnowledgeError> {
    let path = dir.join(file);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| KnowledgeError::Load(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| KnowledgeError::Parse(file.into(), e.to_string()))
}

/// `lung_cancer` → `Lung Cancer`.
pub fn title_case(code: &str) -> String {
    code.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ═══════════════════════════════════════════════════════════
// Bundled reference data
// ═══════════════════════════════════════════════════════════

struct BuiltinDisease {
    code: &'static str,
    name: &'static str,
    category: DiseaseCategory,
    age: AgeRestriction,
    endemic: &'static [&'static str],
    severity: SeverityTier,
    chronic: bool,
}

const MALARIA_REGIONS: &[&str] = &["sub_saharan_africa", "southeast_asia", "south_america"];

#[rustfmt::skip]
const BUILTIN_DISEASES: &[BuiltinDisease] = &[
    BuiltinDisease { code: "malaria", name: "Malaria", category: DiseaseCategory::Infectious, age: AgeRestriction::None, endemic: MALARIA_REGIONS, severity: SeverityTier::Moderate, chronic: false },
    BuiltinDisease { code: "tuberculosis", name: "Tuberculosis", category: DiseaseCategory::Respiratory, age: AgeRestriction::ElderlyRisk, endemic: &[], severity: SeverityTier::Moderate, chronic: true },
    BuiltinDisease { code: "pneumonia", name: "Pneumonia", category: DiseaseCategory::Respiratory, age: AgeRestriction::ElderlyRisk, endemic: &[], severity: SeverityTier::High, chronic: false },
    BuiltinDisease { code: "lung_cancer", name: "Lung Cancer", category: DiseaseCategory::Respiratory, age: AgeRestriction::AdultPredominant, endemic: &[], severity: SeverityTier::High, chronic: true },
    BuiltinDisease { code: "rsv", name: "Respiratory Syncytial Virus", category: DiseaseCategory::Respiratory, age: AgeRestriction::PediatricOnly, endemic: &[], severity: SeverityTier::Moderate, chronic: false },
    BuiltinDisease { code: "whooping_cough", name: "Whooping Cough", category: DiseaseCategory::Respiratory, age: AgeRestriction::PediatricOnly, endemic: &[], severity: SeverityTier::Moderate, chronic: false },
    BuiltinDisease { code: "gastroenteritis", name: "Gastroenteritis", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::None, endemic: &[], severity: SeverityTier::Low, chronic: false },
    BuiltinDisease { code: "rotavirus", name: "Rotavirus Infection", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::PediatricOnly, endemic: &[], severity: SeverityTier::Low, chronic: false },
    BuiltinDisease { code: "appendicitis", name: "Appendicitis", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::None, endemic: &[], severity: SeverityTier::High, chronic: false },
    BuiltinDisease { code: "cholecystitis", name: "Cholecystitis", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::AdultPredominant, endemic: &[], severity: SeverityTier::High, chronic: false },
    BuiltinDisease { code: "peptic_ulcer", name: "Peptic Ulcer", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::AdultPredominant, endemic: &[], severity: SeverityTier::Moderate, chronic: false },
    BuiltinDisease { code: "ulcerative_colitis", name: "Ulcerative Colitis", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::None, endemic: &[], severity: SeverityTier::Moderate, chronic: true },
    BuiltinDisease { code: "hepatitis_a", name: "Hepatitis A", category: DiseaseCategory::Gastrointestinal, age: AgeRestriction::None, endemic: &[], severity: SeverityTier::Moderate, chronic: false },
    BuiltinDisease { code: "measles", name: "Measles", category: DiseaseCategory::Infectious, age: AgeRestriction::PediatricOnly, endemic: &[], severity: SeverityTier::Moderate, chronic: false },
    BuiltinDisease { code: "mumps", name: "Mumps", category: DiseaseCategory::Infectious, age: AgeRestriction::PediatricOnly, endemic: &[], severity: SeverityTier::Low, chronic: false },
    BuiltinDisease { code: "chickenpox", name: "Chickenpox", category: DiseaseCategory::Infectious, age: AgeRestriction::PediatricOnly, endemic: &[], severity: SeverityTier::Low, chronic: false },
];

type AssocRow = (&'static str, &'static [(&'static str, f64)]);

#[rustfmt::skip]
const BUILTIN_ASSOCIATIONS: &[AssocRow] = &[
    // Respiratory
    ("cough", &[("tuberculosis", 0.6), ("pneumonia", 0.7), ("lung_cancer", 0.5), ("whooping_cough", 0.8), ("rsv", 0.6), ("measles", 0.3)]),
    ("persistent_cough", &[("tuberculosis", 0.8), ("pneumonia", 0.7), ("lung_cancer", 0.6), ("whooping_cough", 0.9)]),
    ("hemoptysis", &[("tuberculosis", 0.9), ("lung_cancer", 0.8), ("pneumonia", 0.3)]),
    ("shortness_of_breath", &[("pneumonia", 0.8), ("tuberculosis", 0.6), ("rsv", 0.7), ("lung_cancer", 0.5)]),
    ("difficulty_breathing", &[("pneumonia", 0.8), ("rsv", 0.6)]),
    ("chest_pain", &[("pneumonia", 0.7), ("tuberculosis", 0.5), ("lung_cancer", 0.4)]),
    ("wheezing", &[("rsv", 0.8), ("pneumonia", 0.4), ("whooping_cough", 0.6)]),
    ("whooping_sound", &[("whooping_cough", 0.95)]),
    // Fever and systemic
    ("fever", &[("malaria", 0.9), ("pneumonia", 0.8), ("tuberculosis", 0.7), ("measles", 0.8), ("mumps", 0.7), ("chickenpox", 0.8), ("rsv", 0.7), ("gastroenteritis", 0.6), ("appendicitis", 0.7), ("cholecystitis", 0.6), ("hepatitis_a", 0.7), ("whooping_cough", 0.5)]),
    ("high_fever", &[("malaria", 0.8), ("pneumonia", 0.7), ("measles", 0.5)]),
    ("chills", &[("malaria", 0.9), ("pneumonia", 0.6), ("tuberculosis", 0.5)]),
    ("night_sweats", &[("tuberculosis", 0.8), ("malaria", 0.6), ("lung_cancer", 0.4)]),
    ("weight_loss", &[("tuberculosis", 0.8), ("lung_cancer", 0.7), ("ulcerative_colitis", 0.6)]),
    ("fatigue", &[("tuberculosis", 0.6), ("hepatitis_a", 0.8), ("malaria", 0.7), ("lung_cancer", 0.5)]),
    ("muscle_aches", &[("malaria", 0.5)]),
    // Gastrointestinal
    ("diarrhea", &[("gastroenteritis", 0.9), ("rotavirus", 0.8), ("ulcerative_colitis", 0.7)]),
    ("vomiting", &[("gastroenteritis", 0.8), ("rotavirus", 0.8), ("appendicitis", 0.6), ("cholecystitis", 0.5)]),
    ("nausea", &[("gastroenteritis", 0.7), ("appendicitis", 0.7), ("cholecystitis", 0.8), ("hepatitis_a", 0.6)]),
    ("abdominal_pain", &[("appendicitis", 0.9), ("gastroenteritis", 0.7), ("cholecystitis", 0.8), ("peptic_ulcer", 0.8), ("ulcerative_colitis", 0.7)]),
    ("severe_abdominal_pain", &[("appendicitis", 0.9), ("cholecystitis", 0.7)]),
    ("severe_pain", &[("appendicitis", 0.5), ("cholecystitis", 0.5)]),
    ("right_lower_quadrant_pain", &[("appendicitis", 0.95)]),
    ("right_upper_quadrant_pain", &[("cholecystitis", 0.9)]),
    ("epigastric_pain", &[("peptic_ulcer", 0.8), ("gastroenteritis", 0.4)]),
    ("bloody_stool", &[("ulcerative_colitis", 0.8), ("gastroenteritis", 0.3)]),
    ("jaundice", &[("hepatitis_a", 0.9), ("cholecystitis", 0.4)]),
    // Skin
    ("rash", &[("measles", 0.8), ("chickenpox", 0.9), ("mumps", 0.2)]),
    ("vesicular_rash", &[("chickenpox", 0.95)]),
    ("maculopapular_rash", &[("measles", 0.9)]),
    ("koplik_spots", &[("measles", 0.98)]),
    // Head and neck
    ("headache", &[("malaria", 0.7), ("measles", 0.5), ("mumps", 0.4)]),
    ("parotid_swelling", &[("mumps", 0.95)]),
    ("sore_throat", &[("measles", 0.4), ("mumps", 0.3)]),
    // Age-specific
    ("difficulty_feeding", &[("rsv", 0.7), ("rotavirus", 0.5)]),
    ("irritability", &[("rsv", 0.6), ("rotavirus", 0.5), ("measles", 0.4)]),
];

#[rustfmt::skip]
const BUILTIN_SYNONYMS: &[(&str, &[&str])] = &[
    ("cough", &["coughing", "chronic_cough"]),
    ("fever", &["high_temperature", "pyrexia", "febrile"]),
    ("diarrhea", &["loose_stools", "watery_stools", "frequent_bowel_movements", "diarrhoea"]),
    ("vomiting", &["throwing_up", "emesis", "nausea_and_vomiting"]),
    ("headache", &["head_pain", "cephalgia"]),
    ("rash", &["skin_rash", "eruption", "skin_lesions"]),
    ("abdominal_pain", &["stomach_pain", "belly_pain", "tummy_ache"]),
    ("shortness_of_breath", &["dyspnea", "breathlessness"]),
    ("difficulty_breathing", &["breathing_difficulty", "labored_breathing"]),
    ("chest_pain", &["thoracic_pain", "chest_discomfort"]),
    ("weight_loss", &["losing_weight", "unintentional_weight_loss"]),
    ("night_sweats", &["nocturnal_sweating", "night_time_sweating", "sweating", "sweats"]),
    ("hemoptysis", &["coughing_blood", "blood_in_sputum", "bloody_cough"]),
    ("muscle_aches", &["muscle_pain", "myalgia", "body_aches"]),
    ("fatigue", &["tiredness", "exhaustion", "lethargy"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let table = KnowledgeTable::builtin();
        assert_eq!(table.disease_codes().count(), BUILTIN_DISEASES.len());
        assert!(table.contains_symptom("fever"));
        assert!(table.contains_disease("malaria"));
    }

    #[test]
    fn weight_lookup() {
        let table = KnowledgeTable::builtin();
        assert_eq!(table.weight("koplik_spots", "measles"), Some(0.98));
        assert_eq!(table.weight("koplik_spots", "malaria"), None);
        assert!(table.associations_for("unknown_symptom").is_empty());
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let err = KnowledgeTable::new(
            vec![DiseaseMetadata {
                code: "flu".into(),
                name: None,
                category: DiseaseCategory::Respiratory,
                age_restriction: AgeRestriction::None,
                endemic_regions: BTreeSet::new(),
                severity: SeverityTier::Low,
                chronic: false,
            }],
            vec![SymptomAssociation {
                symptom_id: "fever".into(),
                disease_code: "flu".into(),
                weight: 1.5,
            }],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidWeight { .. }));
    }

    #[test]
    fn rejects_unknown_disease_reference() {
        let err = KnowledgeTable::new(
            vec![DiseaseMetadata {
                code: "flu".into(),
                name: None,
                category: DiseaseCategory::Respiratory,
                age_restriction: AgeRestriction::None,
                endemic_regions: BTreeSet::new(),
                severity: SeverityTier::Low,
                chronic: false,
            }],
            vec![SymptomAssociation {
                symptom_id: "fever".into(),
                disease_code: "ebola".into(),
                weight: 0.5,
            }],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, KnowledgeError::UnknownDisease(code) if code == "ebola"));
    }

    #[test]
    fn relatedness_by_system_and_pediatric_group() {
        let table = KnowledgeTable::builtin();
        assert!(table.are_related("pneumonia", "tuberculosis"));
        assert!(table.are_related("appendicitis", "cholecystitis"));
        assert!(table.are_related("measles", "rsv"));
        assert!(!table.are_related("malaria", "appendicitis"));
        assert!(!table.are_related("malaria", "unknown"));
    }

    #[test]
    fn display_name_falls_back_to_title_case() {
        let table = KnowledgeTable::builtin();
        assert_eq!(table.display_name("lung_cancer"), "Lung Cancer");
        assert_eq!(table.display_name("dengue_fever"), "Dengue Fever");
    }

    #[test]
    fn symptoms_for_disease() {
        let table = KnowledgeTable::builtin();
        let symptoms = table.symptoms_for("mumps");
        assert!(symptoms.contains(&"parotid_swelling"));
        assert!(!symptoms.contains(&"jaundice"));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("diseases.json"),
            r#"[{"code":"flu","category":"respiratory","severity":"moderate"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("associations.json"),
            r#"[{"symptom_id":"fever","disease_code":"flu","weight":0.7}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("synonyms.json"),
            r#"[{"canonical":"fever","synonyms":["pyrexia"]}]"#,
        )
        .unwrap();

        let table = KnowledgeTable::load(dir.path()).unwrap();
        assert_eq!(table.weight("fever", "flu"), Some(0.7));
        assert_eq!(table.synonyms().len(), 1);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = KnowledgeTable::load(dir.path()).unwrap_err();
        assert!(matches!(err, KnowledgeError::Load(..)));
    }
}
