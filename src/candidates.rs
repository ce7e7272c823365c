//! Heuristic candidate generation from symptom overlap.
//!
//! Pure function of the input symptoms, patient age and the knowledge
//! table. Unrecognized symptoms are ignored; no symptom matching yields an
//! empty candidate list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::knowledge::{AgeRestriction, KnowledgeTable, SymptomNormalizer};

/// Upper bound (exclusive) of the pediatric age bracket.
pub const PEDIATRIC_AGE_CEILING: u32 = 18;

/// Adult-predominant diseases are boosted above this age.
pub const ADULT_RISK_AGE: u32 = 40;

/// Elderly-risk diseases are boosted from this age.
pub const ELDERLY_AGE: u32 = 65;

const PEDIATRIC_MULTIPLIER: f64 = 1.5;
const ADULT_MULTIPLIER: f64 = 1.2;
const ELDERLY_MULTIPLIER: f64 = 1.3;

/// A disease hypothesis scored by symptom overlap alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub disease_code: String,
    /// In [0, 1]; the top candidate scores 1.0.
    pub heuristic_score: f64,
    /// Canonical symptoms that contributed to this candidate.
    pub matched_symptoms: Vec<String>,
}

pub struct CandidateGenerator<'a> {
    table: &'a KnowledgeTable,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(table: &'a KnowledgeTable) -> Self {
        Self { table }
    }

    /// Score every disease reachable from the given symptoms, ordered by
    /// descending score (ties by disease code).
    pub fn generate(&self, symptoms: &[String], age: Option<u32>) -> Vec<Candidate> {
        let canonical = SymptomNormalizer::new(self.table).normalize(symptoms);

        let mut scores: BTreeMap<&str, (f64, Vec<String>)> = BTreeMap::new();
        for symptom in &canonical {
            for (disease, weight) in self.table.associations_for(symptom) {
                let entry = scores.entry(disease.as_str()).or_insert((0.0, Vec::new()));
                entry.0 += weight;
                entry.1.push(symptom.clone());
            }
        }

        if let Some(age) = age {
            for (disease, (score, _)) in scores.iter_mut() {
                *score *= self.age_multiplier(disease, age);
            }
        }

        let max = scores.values().map(|(s, _)| *s).fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let mut candidates: Vec<Candidate> = scores
            .into_iter()
            .map(|(disease, (score, matched))| Candidate {
                disease_code: disease.to_string(),
                heuristic_score: (score / max).clamp(0.0, 1.0),
                matched_symptoms: matched,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.heuristic_score
                .total_cmp(&a.heuristic_score)
                .then_with(|| a.disease_code.cmp(&b.disease_code))
        });

        tracing::debug!(
            symptoms = canonical.len(),
            candidates = candidates.len(),
            top = candidates.first().map(|c| c.disease_code.as_str()).unwrap_or("none"),
            "Heuristic candidates generated"
        );

        candidates
    }

    /// Boost applied when the disease's age class matches the patient's bracket.
    fn age_multiplier(&self, disease: &str, age: u32) -> f64 {
        let Some(meta) = self.table.metadata(disease) else {
            return 1.0;
        };
        match meta.age_restriction {
            AgeRestriction::PediatricOnly if age < PEDIATRIC_AGE_CEILING => PEDIATRIC_MULTIPLIER,
            AgeRestriction::AdultPredominant if age > ADULT_RISK_AGE => ADULT_MULTIPLIER,
            AgeRestriction::ElderlyRisk if age >= ELDERLY_AGE => ELDERLY_MULTIPLIER,
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn malaria_tops_fever_chills_sweating() {
        let table = KnowledgeTable::builtin();
        let candidates = CandidateGenerator::new(&table)
            .generate(&strings(&["fever", "chills", "sweating"]), Some(30));
        let top = &candidates[0];
        assert_eq!(top.disease_code, "malaria");
        assert!(top.heuristic_score > 0.7);
        assert_eq!(top.matched_symptoms.len(), 3);
    }

    #[test]
    fn top_score_is_one_and_all_bounded() {
        let table = KnowledgeTable::builtin();
        let candidates = CandidateGenerator::new(&table)
            .generate(&strings(&["cough", "fever", "weight loss"]), None);
        assert!((candidates[0].heuristic_score - 1.0).abs() < 1e-12);
        assert!(candidates
            .iter()
            .all(|c| (0.0..=1.0).contains(&c.heuristic_score)));
        assert!(candidates
            .windows(2)
            .all(|w| w[0].heuristic_score >= w[1].heuristic_score));
    }

    #[test]
    fn unmatched_symptoms_yield_no_candidates() {
        let table = KnowledgeTable::builtin();
        let candidates = CandidateGenerator::new(&table).generate(&strings(&["xyzzy"]), Some(20));
        assert!(candidates.is_empty());
        assert!(CandidateGenerator::new(&table).generate(&[], None).is_empty());
    }

    #[test]
    fn pediatric_boost_changes_ranking() {
        let table = KnowledgeTable::builtin();
        let generator = CandidateGenerator::new(&table);
        let symptoms = strings(&["diarrhea", "vomiting"]);

        // gastroenteritis 1.7 vs rotavirus 1.6 for adults
        let adult = generator.generate(&symptoms, Some(30));
        assert_eq!(adult[0].disease_code, "gastroenteritis");

        // rotavirus 1.6 * 1.5 = 2.4 for children
        let child = generator.generate(&symptoms, Some(4));
        assert_eq!(child[0].disease_code, "rotavirus");
    }

    #[test]
    fn elderly_boost_applies_from_65() {
        let table = KnowledgeTable::builtin();
        let generator = CandidateGenerator::new(&table);
        let symptoms = strings(&["fever", "chills"]);

        let young = generator.generate(&symptoms, Some(30));
        let old = generator.generate(&symptoms, Some(65));
        let score = |cs: &[Candidate], code: &str| {
            cs.iter()
                .find(|c| c.disease_code == code)
                .map(|c| c.heuristic_score)
                .unwrap()
        };
        assert!(score(&old, "pneumonia") > score(&young, "pneumonia"));
    }
}
