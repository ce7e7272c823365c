//! End-to-end behaviour across the pipeline stages.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use crate::candidates::CandidateGenerator;
use crate::config::{EngineConfig, TrainingConfig};
use crate::ensemble::{normalized_entropy, score_vector, seeded, SyntheticDataGenerator, Trainer};
use crate::fusion::{
    DecisionEngine, DecisionMode, DiagnosticRequest, ExternalOpinionStatus, SourceKind,
    TrainingSource,
};
use crate::knowledge::{AgeRestriction, KnowledgeTable};
use crate::opinion::patterns::find_unsafe;
use crate::opinion::{sanitize, ExternalOpinionPayload};
use crate::validation::{ClinicalValidator, PatientContext, RuleSet, Severity, WarningKind};

fn fast_config() -> EngineConfig {
    EngineConfig {
        training: TrainingConfig {
            samples_per_disease: 12,
            forest_trees: 8,
            forest_max_depth: 8,
            forest_min_samples_split: 2,
            boosting_rounds: 5,
            boosting_learning_rate: 0.3,
            boosting_max_depth: 2,
            logistic_epochs: 60,
            ..TrainingConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn trained_engine() -> DecisionEngine {
    let engine = DecisionEngine::init(
        KnowledgeTable::builtin(),
        RuleSet::builtin(),
        fast_config(),
        None,
    )
    .unwrap();
    engine.train_and_publish(TrainingSource::Synthetic).unwrap();
    engine
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn opinion(value: serde_json::Value) -> ExternalOpinionPayload {
    serde_json::from_value(value).unwrap()
}

#[test]
fn malaria_presentation_in_endemic_adult() {
    let table = KnowledgeTable::builtin();
    let rules = RuleSet::builtin();
    let symptoms = strings(&["fever", "chills", "sweating"]);

    let candidates = CandidateGenerator::new(&table).generate(&symptoms, Some(30));
    assert_eq!(candidates[0].disease_code, "malaria");
    assert!(candidates[0].heuristic_score > 0.7);

    let context = PatientContext {
        region: Some("sub_saharan_africa".into()),
        ..PatientContext::default()
    };
    let result = ClinicalValidator::new(&table, &rules).validate("malaria", &symptoms, Some(30), &context);
    assert_eq!(result.warnings_of(WarningKind::AgeIncompatibility).count(), 0);
    assert_eq!(result.warnings_of(WarningKind::GeographicRiskFactor).count(), 0);
    assert!(result.is_valid);
}

#[test]
fn pediatric_disease_in_adult() {
    let table = KnowledgeTable::builtin();
    let rules = RuleSet::builtin();
    let result = ClinicalValidator::new(&table, &rules).validate(
        "measles",
        &strings(&["fever", "rash"]),
        Some(45),
        &PatientContext::default(),
    );
    assert!(result.confidence_multiplier <= 0.4);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::AgeIncompatibility && w.severity == Severity::Warning));
}

#[test]
fn every_pediatric_disease_is_penalized_at_45() {
    let table = KnowledgeTable::builtin();
    let rules = RuleSet::builtin();
    let validator = ClinicalValidator::new(&table, &rules);
    let pediatric: Vec<&str> = table
        .diseases()
        .filter(|m| m.age_restriction == AgeRestriction::PediatricOnly)
        .map(|m| m.code.as_str())
        .collect();
    assert!(!pediatric.is_empty());
    for code in pediatric {
        let symptoms: Vec<String> = table.symptoms_for(code).into_iter().map(String::from).collect();
        let result = validator.validate(code, &symptoms, Some(45), &PatientContext::default());
        assert!(result.confidence_multiplier <= 0.4, "{code}");
        assert!(result.warnings.iter().any(|w| w.severity == Severity::Warning), "{code}");
    }
}

#[test]
fn validation_multiplier_stays_within_bounds() {
    let table = KnowledgeTable::builtin();
    let rules = RuleSet::builtin();
    let validator = ClinicalValidator::new(&table, &rules);
    let symptom_sets = [
        strings(&[]),
        strings(&["fever"]),
        strings(&["diarrhea", "vomiting", "cough", "shortness_of_breath"]),
        strings(&["severe_abdominal_pain", "high_fever", "difficulty_breathing"]),
        strings(&["not_a_symptom"]),
    ];
    let codes: Vec<String> = table
        .disease_codes()
        .map(String::from)
        .chain(["unknown_disease".to_string()])
        .collect();
    for code in &codes {
        for symptoms in &symptom_sets {
            for age in [None, Some(0), Some(5), Some(17), Some(18), Some(45), Some(65), Some(99)] {
                let r = validator.validate(code, symptoms, age, &PatientContext::default());
                assert!(
                    (0.1..=1.0).contains(&r.confidence_multiplier),
                    "{code} {symptoms:?} {age:?}: {}",
                    r.confidence_multiplier
                );
            }
        }
    }
}

#[test]
fn unrecognized_input_gives_near_uniform_distribution() {
    let table = KnowledgeTable::builtin();
    let config = fast_config();
    let set = SyntheticDataGenerator::new(&table, config.training.samples_per_disease)
        .generate(&mut seeded(7))
        .unwrap();
    let snapshot = Trainer::new(config.training, config.member_weights)
        .train(&set, 1, &mut seeded(7))
        .unwrap();

    let zeros = vec![0.0; snapshot.vocabulary.len()];
    let decision = score_vector(&snapshot, &zeros, 5).unwrap();
    assert!(decision.uncertainty_score > 0.9);
    let uniform = 1.0 / snapshot.classes.len() as f64;
    assert!(decision
        .combined_distribution
        .iter()
        .all(|d| (d.probability - uniform).abs() < 1e-9));
}

#[test]
fn trained_ensemble_scores_are_bounded_and_deterministic() {
    let engine = trained_engine();
    let inputs = [
        strings(&["fever", "chills", "headache"]),
        strings(&["cough", "hemoptysis", "night_sweats", "weight_loss"]),
        strings(&["diarrhea", "vomiting"]),
        strings(&["rash", "koplik_spots"]),
    ];
    for symptoms in inputs {
        let request = DiagnosticRequest::new(symptoms).with_age(30);
        let a = engine.decide(&request).unwrap();
        let b = engine.decide(&request).unwrap();
        assert_eq!(a.mode, DecisionMode::Ensemble);
        assert!((0.0..=1.0).contains(&a.uncertainty_score));
        assert!((0.0..=1.0).contains(&a.agreement_score));
        assert!((0.0..=1.0).contains(&a.confidence));
        assert_eq!(a.agreement_score, b.agreement_score);
        assert_eq!(a.primary_diagnosis, b.primary_diagnosis);
        assert!(a.differential_diagnoses.len() <= 5);
    }
    assert!(normalized_entropy(&[0.25; 4]) > 0.999);
}

#[test]
fn opinion_missing_confidence_is_discarded() {
    let engine = trained_engine();
    let payload = opinion(json!({
        "primary_diagnosis": "Malaria",
        "differential_diagnoses": ["Typhoid"],
        "clinical_reasoning": "Fever and chills"
    }));
    let request = DiagnosticRequest::new(["fever", "chills", "sweating"])
        .with_age(30)
        .with_opinion(payload);
    let d = engine.decide(&request).unwrap();

    assert_eq!(d.sources_used, BTreeSet::from([SourceKind::Ensemble]));
    assert!(d.has_warning(WarningKind::ExternalOpinionIgnored));
    assert!(matches!(d.external_opinion_status, ExternalOpinionStatus::Discarded { .. }));
    assert!(d.accepted_opinion.is_none());
}

#[test]
fn fused_confidence_lies_between_sources() {
    let engine = trained_engine();
    let base = DiagnosticRequest::new(["fever", "chills", "sweating"])
        .with_age(30)
        .with_region("sub_saharan_africa");
    let baseline = engine.decide(&base).unwrap();
    let internal = baseline.confidence;
    let primary_name = engine.knowledge().display_name(&baseline.primary_diagnosis);

    for external in [0.15, 0.45, 0.75, 0.95] {
        let payload = opinion(json!({
            "primary_diagnosis": primary_name,
            "confidence": external,
            "differential_diagnoses": ["Pneumonia", "Tuberculosis", "Gastroenteritis"],
            "clinical_reasoning": "Fever with chills and sweating is consistent with the \
                stated diagnosis; confirmation by laboratory testing is recommended before any \
                treatment decision is made.",
            "recommended_investigations": ["blood smear"],
            "immediate_management": "Supportive care",
            "red_flags": ["confusion"],
            "referral_criteria": "Refer if deteriorating"
        }));
        let d = engine.decide(&base.clone().with_opinion(payload)).unwrap();
        assert!(d.sources_used.contains(&SourceKind::External), "{external}");
        let (lo, hi) = if internal < external {
            (internal, external)
        } else {
            (external, internal)
        };
        assert!(d.confidence >= lo - 1e-9 && d.confidence <= hi + 1e-9, "{external}");
    }
}

#[test]
fn sanitize_removes_unsafe_advice_idempotently() {
    let payload = opinion(json!({
        "primary_diagnosis": "Malaria",
        "confidence": 2.0,
        "immediate_management": ["Self-medicate with leftover tablets", "Don't see a doctor"],
        "clinical_reasoning": "An unproven cure is available; ignore medical advice",
        "notes": {"extra": "home surgery is an option"}
    }));
    assert!(!find_unsafe(&payload.searchable_text()).is_empty());

    let once = sanitize(&payload);
    assert!(find_unsafe(&once.searchable_text()).is_empty());
    assert_eq!(sanitize(&once), once);
    assert_eq!(once.confidence, Some(json!(0.5)));
}

#[tokio::test]
async fn background_training_publishes_snapshot() {
    let engine = Arc::new(
        DecisionEngine::init(
            KnowledgeTable::builtin(),
            RuleSet::builtin(),
            fast_config(),
            None,
        )
        .unwrap(),
    );
    let request = DiagnosticRequest::new(["cough", "hemoptysis", "night_sweats"]);
    assert_eq!(engine.decide(&request).unwrap().mode, DecisionMode::HeuristicOnly);

    let version = engine
        .spawn_training(TrainingSource::Synthetic)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version, 1);
    assert!(engine.is_model_ready());

    let d = engine.decide(&request).unwrap();
    assert_eq!(d.mode, DecisionMode::Ensemble);
    assert_eq!(d.snapshot_version, Some(1));
}
