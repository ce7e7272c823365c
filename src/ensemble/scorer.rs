//! Combination of member distributions into one ensemble decision.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::classifiers::uniform;
use super::snapshot::{EnsembleSnapshot, SnapshotStore};
use super::types::{EnsembleDecision, EnsembleError, MemberPrediction, RankedDiagnosis};

/// Added inside the logarithm so zero probabilities contribute nothing.
const ENTROPY_EPSILON: f64 = 1e-10;

pub struct EnsembleScorer {
    store: Arc<SnapshotStore>,
    top_k: usize,
}

impl EnsembleScorer {
    pub fn new(store: Arc<SnapshotStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    /// Score canonical symptom ids against the active snapshot.
    pub fn score(&self, canonical: &[String]) -> Result<EnsembleDecision, EnsembleError> {
        let snapshot = self.store.current()?;
        let vector = snapshot.vocabulary.encode(canonical);
        score_vector(&snapshot, &vector, self.top_k)
    }
}

/// Score an encoded feature vector against a snapshot.
///
/// Every member is consulted and reported. A vector with no non-zero entry
/// carries no evidence, so the combined distribution is uniform whatever
/// the members say; agreement still reflects their individual picks.
pub fn score_vector(
    snapshot: &EnsembleSnapshot,
    vector: &[f64],
    top_k: usize,
) -> Result<EnsembleDecision, EnsembleError> {
    let n_classes = snapshot.classes.len();
    if vector.len() != snapshot.vocabulary.len() {
        return Err(EnsembleError::DimensionMismatch {
            expected: snapshot.vocabulary.len(),
            got: vector.len(),
        });
    }

    let mut combined = vec![0.0; n_classes];
    let mut tops = Vec::with_capacity(snapshot.members.len());
    let mut member_predictions = Vec::with_capacity(snapshot.members.len());
    for member in &snapshot.members {
        let dist = normalize(member.model.predict_distribution(vector), n_classes);
        for (acc, p) in combined.iter_mut().zip(&dist) {
            *acc += member.weight * p;
        }
        let top = argmax(&dist);
        tops.push(top);
        member_predictions.push(MemberPrediction {
            kind: member.kind(),
            disease_code: snapshot.classes[top].clone(),
            probability: dist[top],
        });
    }

    if vector.iter().all(|v| *v == 0.0) {
        tracing::debug!(version = snapshot.version, "No symptom evidence, combined distribution is uniform");
        combined = uniform(n_classes);
    } else {
        let total_weight: f64 = snapshot.members.iter().map(|m| m.weight).sum();
        if total_weight > 0.0 {
            combined.iter_mut().for_each(|p| *p /= total_weight);
        }
    }
    let agreement_score = agreement(&tops, &combined);

    let primary = argmax(&combined);
    let uncertainty_score = normalized_entropy(&combined);

    let mut others: Vec<RankedDiagnosis> = combined
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != primary)
        .map(|(i, p)| RankedDiagnosis {
            disease_code: snapshot.classes[i].clone(),
            probability: *p,
        })
        .collect();
    others.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.disease_code.cmp(&b.disease_code))
    });
    others.truncate(top_k);

    tracing::debug!(
        version = snapshot.version,
        primary = %snapshot.classes[primary],
        probability = combined[primary],
        uncertainty = uncertainty_score,
        agreement = agreement_score,
        "Ensemble scored"
    );

    Ok(EnsembleDecision {
        combined_distribution: snapshot
            .classes
            .iter()
            .zip(&combined)
            .map(|(code, p)| RankedDiagnosis {
                disease_code: code.clone(),
                probability: *p,
            })
            .collect(),
        primary_disease_code: snapshot.classes[primary].clone(),
        primary_probability: combined[primary],
        differential: others,
        uncertainty_score,
        agreement_score,
        member_predictions,
        snapshot_version: snapshot.version,
    })
}

/// Clamp to non-negative and rescale to sum 1. Malformed member output
/// (wrong length, no mass) is treated as uniform.
fn normalize(dist: Vec<f64>, n_classes: usize) -> Vec<f64> {
    if dist.len() != n_classes {
        tracing::warn!(got = dist.len(), expected = n_classes, "Member distribution has wrong length");
        return uniform(n_classes);
    }
    let dist: Vec<f64> = dist
        .into_iter()
        .map(|p| if p.is_finite() { p.max(0.0) } else { 0.0 })
        .collect();
    let sum: f64 = dist.iter().sum();
    if sum <= 0.0 {
        return uniform(n_classes);
    }
    dist.into_iter().map(|p| p / sum).collect()
}

/// Index of the largest value; ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Shannon entropy divided by ln(N), in [0, 1].
pub fn normalized_entropy(dist: &[f64]) -> f64 {
    if dist.len() < 2 {
        return 0.0;
    }
    let h: f64 = -dist
        .iter()
        .map(|p| p * (p + ENTROPY_EPSILON).ln())
        .sum::<f64>();
    (h / (dist.len() as f64).ln()).clamp(0.0, 1.0)
}

/// Fraction of members whose top class is the majority top class.
/// Count ties go to the class with more combined probability, then the
/// lower index.
fn agreement(tops: &[usize], combined: &[f64]) -> f64 {
    if tops.is_empty() {
        return 0.0;
    }
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &top in tops {
        *counts.entry(top).or_default() += 1;
    }
    let majority = counts
        .iter()
        .max_by(|(a, ca), (b, cb)| {
            ca.cmp(cb)
                .then_with(|| combined[**a].total_cmp(&combined[**b]))
                .then_with(|| b.cmp(a))
        })
        .map(|(_, count)| *count)
        .unwrap_or(0);
    majority as f64 / tops.len() as f64
}
