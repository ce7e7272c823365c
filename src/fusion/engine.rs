use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::candidates::{Candidate, CandidateGenerator};
use crate::config::EngineConfig;
use crate::ensemble::{
    normalized_entropy, seeded, EnsembleDecision, EnsembleError, EnsembleScorer,
    EnsembleSnapshot, MemberPrediction, RankedDiagnosis, SnapshotStore, SyntheticDataGenerator,
    Trainer, TrainingSet,
};
use crate::knowledge::{KnowledgeTable, SymptomNormalizer};
use crate::opinion::{
    resolve_disease_code, sanitize, ExternalOpinionPayload, ExternalOpinionValidator,
    OpinionAssessment,
};
use crate::validation::{ClinicalValidator, RuleSet, Severity, ValidationWarning, WarningKind};

use super::reasoning::{clinical_reasoning, ReasoningInput};
use super::types::{
    CancelToken, DecisionMode, DiagnosisDecision, DiagnosticRequest, EngineError,
    ExternalOpinionStatus, FusionWeights, SourceKind,
};

/// Where a training pass takes its samples from.
#[derive(Debug)]
pub enum TrainingSource {
    /// Synthetic samples drawn from the knowledge table.
    Synthetic,
    Dataset(TrainingSet),
}

/// The engine's own diagnosis before fusion.
struct InternalDecision {
    primary: String,
    confidence: f64,
    differential: Vec<RankedDiagnosis>,
    uncertainty: f64,
    agreement: f64,
    member_predictions: Vec<MemberPrediction>,
    snapshot_version: Option<u64>,
    mode: DecisionMode,
    source: SourceKind,
}

impl InternalDecision {
    fn from_ensemble(d: EnsembleDecision) -> Self {
        Self {
            primary: d.primary_disease_code,
            confidence: d.primary_probability,
            differential: d.differential,
            uncertainty: d.uncertainty_score,
            agreement: d.agreement_score,
            member_predictions: d.member_predictions,
            snapshot_version: Some(d.snapshot_version),
            mode: DecisionMode::Ensemble,
            source: SourceKind::Ensemble,
        }
    }
}

/// Outcome of handling the external opinion.
struct FusionOutcome {
    confidence: f64,
    weights: FusionWeights,
    status: ExternalOpinionStatus,
    accepted: Option<ExternalOpinionPayload>,
    disagreement: bool,
}

/// Top-level orchestrator of the decision pipeline.
///
/// Holds the knowledge table and rule set (immutable) and the snapshot
/// store (swapped by training). Share it behind an `Arc`.
pub struct DecisionEngine {
    knowledge: Arc<KnowledgeTable>,
    rules: Arc<RuleSet>,
    config: EngineConfig,
    store: Arc<SnapshotStore>,
    shut_down: AtomicBool,
}

impl DecisionEngine {
    /// Validate configuration and rules, then publish the initial snapshot
    /// if one is given. Any failure here is fatal for startup.
    pub fn init(
        knowledge: KnowledgeTable,
        rules: RuleSet,
        config: EngineConfig,
        snapshot: Option<EnsembleSnapshot>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        rules.validate()?;
        rules.validate_against(&knowledge)?;

        let engine = Self {
            knowledge: Arc::new(knowledge),
            rules: Arc::new(rules),
            config,
            store: Arc::new(SnapshotStore::new()),
            shut_down: AtomicBool::new(false),
        };
        if let Some(snapshot) = snapshot {
            engine.store.publish(snapshot)?;
        }

        tracing::info!(
            diseases = engine.knowledge.disease_codes().count(),
            symptoms = engine.knowledge.symptom_ids().count(),
            rules_version = %engine.rules.version,
            model_ready = engine.store.is_ready(),
            "Decision engine initialized"
        );
        Ok(engine)
    }

    pub fn knowledge(&self) -> &KnowledgeTable {
        &self.knowledge
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_model_ready(&self) -> bool {
        self.store.is_ready()
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    // ── Snapshot lifecycle ──────────────────────────────────

    /// Swap in a new snapshot. Returns the replaced version, if any.
    pub fn publish_snapshot(&self, snapshot: EnsembleSnapshot) -> Result<Option<u64>, EngineError> {
        self.ensure_running()?;
        Ok(self.store.publish(snapshot)?)
    }

    /// Train a new snapshot and publish it. Fails fast with
    /// `TrainingInProgress` if another pass holds the training slot.
    /// Returns the published version.
    pub fn train_and_publish(&self, source: TrainingSource) -> Result<u64, EngineError> {
        self.ensure_running()?;
        let _slot = self.store.begin_training()?;
        let training = &self.config.training;
        let mut rng = seeded(training.seed);

        let set = match source {
            TrainingSource::Synthetic => {
                SyntheticDataGenerator::new(&self.knowledge, training.samples_per_disease)
                    .generate(&mut rng)?
            }
            TrainingSource::Dataset(set) => set,
        };

        let version = self.store.next_version();
        let snapshot = Trainer::new(training.clone(), self.config.member_weights.clone())
            .train(&set, version, &mut rng)?;
        self.store.publish(snapshot)?;
        Ok(version)
    }

    /// Run `train_and_publish` on tokio's blocking pool. Requests keep
    /// using the previous snapshot until the swap.
    pub fn spawn_training(
        self: &Arc<Self>,
        source: TrainingSource,
    ) -> tokio::task::JoinHandle<Result<u64, EngineError>> {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let result = engine.train_and_publish(source);
            if let Err(e) = &result {
                tracing::error!(error = %e, "Background training failed");
            }
            result
        })
    }

    /// Reject all further requests and drop the active snapshot.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear snapshot on shutdown");
        }
        tracing::info!("Decision engine shut down");
    }

    // ── Decisions ───────────────────────────────────────────

    pub fn decide(&self, request: &DiagnosticRequest) -> Result<DiagnosisDecision, EngineError> {
        self.decide_with_cancel(request, &CancelToken::new())
    }

    /// Run the pipeline, checking `cancel` between stages.
    pub fn decide_with_cancel(
        &self,
        request: &DiagnosticRequest,
        cancel: &CancelToken,
    ) -> Result<DiagnosisDecision, EngineError> {
        self.ensure_running()?;
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();
        let mut alternatives = BTreeSet::new();

        // 1. Symptoms and candidates
        let report = SymptomNormalizer::new(&self.knowledge).normalize_with_report(&request.symptoms);
        if report.is_empty() {
            tracing::debug!(unmatched = report.unmatched.len(), "No recognizable symptoms");
            return Err(EngineError::InvalidSymptomInput {
                unmatched: report.unmatched,
            });
        }
        if !report.unmatched.is_empty() {
            warnings.push(
                ValidationWarning::info(
                    WarningKind::UnrecognizedSymptoms,
                    format!("{} symptom(s) not recognized and ignored", report.unmatched.len()),
                )
                .with("symptoms", report.unmatched.clone()),
            );
        }
        let symptoms = report.canonical;
        let candidates = CandidateGenerator::new(&self.knowledge).generate(&symptoms, request.age);
        checkpoint(cancel, "candidates")?;

        // 2. Ensemble, or heuristic fallback
        let scorer = EnsembleScorer::new(Arc::clone(&self.store), self.config.differential_top_k);
        let internal = match scorer.score(&symptoms) {
            Ok(decision) => InternalDecision::from_ensemble(decision),
            Err(e) => {
                let message = match e {
                    EnsembleError::ModelNotReady => {
                        "Classifier ensemble not loaded; decision based on heuristic candidates"
                            .to_string()
                    }
                    other => {
                        tracing::warn!(error = %other, "Ensemble scoring failed, using heuristic candidates");
                        format!("Ensemble scoring failed ({other}); decision based on heuristic candidates")
                    }
                };
                warnings.push(ValidationWarning::info(WarningKind::HeuristicFallback, message));
                self.heuristic_decision(&candidates)
                    .ok_or_else(|| EngineError::InvalidSymptomInput { unmatched: Vec::new() })?
            }
        };
        checkpoint(cancel, "ensemble")?;

        // 3. Clinical validation
        let validation = ClinicalValidator::new(&self.knowledge, &self.rules)
            .with_thresholds(self.config.confidence_floor, self.config.validity_threshold)
            .validate(&internal.primary, &symptoms, request.age, &request.context);
        let internal_confidence =
            (internal.confidence * validation.confidence_multiplier).clamp(0.0, 1.0);
        let has_critical = validation.has_critical();
        warnings.extend(validation.warnings);
        recommendations.extend(validation.recommendations);
        alternatives.extend(validation.alternative_diagnoses);
        checkpoint(cancel, "validation")?;

        // 4. External opinion
        let mut differential = internal.differential;
        let mut sources = BTreeSet::from([internal.source]);
        let fusion = match &request.external_opinion {
            None => FusionOutcome {
                confidence: internal_confidence,
                weights: FusionWeights::internal_only(),
                status: ExternalOpinionStatus::NotProvided,
                accepted: None,
                disagreement: false,
            },
            Some(payload) => {
                let assessment = ExternalOpinionValidator::new(&self.knowledge)
                    .with_quality_threshold(self.config.opinion_quality_threshold)
                    .validate(payload, Some(&internal.primary), &symptoms, request.age);
                let outcome = self.fuse(
                    payload,
                    &assessment,
                    &internal.primary,
                    internal_confidence,
                    &mut differential,
                    &mut warnings,
                );
                if outcome.accepted.is_some() {
                    sources.insert(SourceKind::External);
                    warnings.extend(assessment.result.warnings);
                    recommendations.extend(assessment.result.recommendations);
                    alternatives.extend(assessment.result.alternative_diagnoses);
                } else {
                    warnings.extend(
                        assessment
                            .result
                            .warnings
                            .into_iter()
                            .filter(|w| w.kind.is_safety_concern()),
                    );
                }
                outcome
            }
        };
        checkpoint(cancel, "fusion")?;
        alternatives.remove(&internal.primary);
        dedup_in_place(&mut recommendations);

        // 5. Assemble
        let requires_specialist_review = fusion.confidence < self.config.specialist_review_threshold
            || has_critical
            || fusion.disagreement;
        if requires_specialist_review {
            let text = "Specialist review recommended".to_string();
            if !recommendations.contains(&text) {
                recommendations.push(text);
            }
        }

        let display_name = self.knowledge.display_name(&internal.primary);
        let top_alternative = differential
            .first()
            .map(|d| self.knowledge.display_name(&d.disease_code));
        let reasoning = clinical_reasoning(&ReasoningInput {
            display_name: &display_name,
            confidence: fusion.confidence,
            agreement: internal.agreement,
            mode: internal.mode,
            symptom_count: symptoms.len(),
            top_alternative: top_alternative.as_deref(),
            external_used: fusion.accepted.is_some(),
        });

        let decision = DiagnosisDecision {
            id: Uuid::new_v4(),
            decided_at: Utc::now(),
            primary_diagnosis: internal.primary,
            primary_display_name: display_name,
            confidence: fusion.confidence,
            differential_diagnoses: differential,
            uncertainty_score: internal.uncertainty,
            agreement_score: internal.agreement,
            warnings,
            recommendations,
            alternative_diagnoses: alternatives,
            sources_used: sources,
            fusion_weights: fusion.weights,
            mode: internal.mode,
            external_opinion_status: fusion.status,
            accepted_opinion: fusion.accepted,
            requires_specialist_review,
            clinical_reasoning: reasoning,
            canonical_symptoms: symptoms,
            member_predictions: internal.member_predictions,
            snapshot_version: internal.snapshot_version,
        };

        tracing::info!(
            decision_id = %decision.id,
            primary = %decision.primary_diagnosis,
            confidence = decision.confidence,
            uncertainty = decision.uncertainty_score,
            mode = ?decision.mode,
            sources = ?decision.sources_used,
            warnings = decision.warnings.len(),
            "Diagnosis decided"
        );
        Ok(decision)
    }

    /// Top candidate as primary with its heuristic score as confidence.
    fn heuristic_decision(&self, candidates: &[Candidate]) -> Option<InternalDecision> {
        let (top, rest) = candidates.split_first()?;
        let differential = rest
            .iter()
            .take(self.config.differential_top_k)
            .map(|c| RankedDiagnosis {
                disease_code: c.disease_code.clone(),
                probability: c.heuristic_score,
            })
            .collect();

        Some(InternalDecision {
            primary: top.disease_code.clone(),
            confidence: top.heuristic_score,
            differential,
            uncertainty: self.heuristic_uncertainty(candidates),
            agreement: 0.0,
            member_predictions: Vec::new(),
            snapshot_version: None,
            mode: DecisionMode::HeuristicOnly,
            source: SourceKind::Heuristic,
        })
    }

    /// Normalized entropy of the candidate scores spread over every known
    /// disease.
    fn heuristic_uncertainty(&self, candidates: &[Candidate]) -> f64 {
        let total: f64 = candidates.iter().map(|c| c.heuristic_score).sum();
        let n = self.knowledge.disease_codes().count().max(candidates.len());
        if n < 2 || total <= 0.0 {
            return 1.0;
        }
        let mut dist: Vec<f64> = candidates.iter().map(|c| c.heuristic_score / total).collect();
        dist.resize(n, 0.0);
        normalized_entropy(&dist)
    }

    /// Blend a validated opinion into the internal decision, or record why
    /// it was discarded.
    fn fuse(
        &self,
        payload: &ExternalOpinionPayload,
        assessment: &OpinionAssessment,
        internal_primary: &str,
        internal_confidence: f64,
        differential: &mut Vec<RankedDiagnosis>,
        warnings: &mut Vec<ValidationWarning>,
    ) -> FusionOutcome {
        let external_confidence = assessment.effective_confidence();
        let Some(external_confidence) = external_confidence.filter(|_| assessment.is_valid()) else {
            let mut reasons = assessment.errors.clone();
            reasons.extend(assessment.safety_flags.iter().cloned());
            if assessment.quality_score < self.config.opinion_quality_threshold {
                reasons.push(format!(
                    "Quality score {:.2} below threshold {:.2}",
                    assessment.quality_score, self.config.opinion_quality_threshold
                ));
            }
            tracing::info!(reasons = ?reasons, "External opinion discarded");
            warnings.push(
                ValidationWarning::warning(
                    WarningKind::ExternalOpinionIgnored,
                    "External opinion failed validation and was ignored",
                )
                .with("reasons", reasons.clone())
                .with("quality_score", assessment.quality_score),
            );
            return FusionOutcome {
                confidence: internal_confidence,
                weights: FusionWeights::internal_only(),
                status: ExternalOpinionStatus::Discarded { reasons },
                accepted: None,
                disagreement: false,
            };
        };

        let weights = FusionWeights::blend(self.config.fusion_alpha);
        let confidence = weights.apply(internal_confidence, external_confidence);

        let external_primary = assessment.resolved_primary.as_deref();
        let mut external_entries: Vec<RankedDiagnosis> = payload
            .differential_diagnoses
            .iter()
            .filter_map(|item| {
                resolve_disease_code(&self.knowledge, item.name()).map(|code| RankedDiagnosis {
                    disease_code: code,
                    probability: item.probability(),
                })
            })
            .collect();
        if let Some(code) = external_primary.filter(|code| *code != internal_primary) {
            external_entries.push(RankedDiagnosis {
                disease_code: code.to_string(),
                probability: external_confidence,
            });
        }
        merge_differential(
            differential,
            external_entries,
            internal_primary,
            self.config.differential_top_k,
        );

        let threshold = self.config.disagreement_threshold;
        let disagreement = external_primary != Some(internal_primary)
            && internal_confidence > threshold
            && external_confidence > threshold;
        if disagreement {
            tracing::info!(
                internal = internal_primary,
                external = ?external_primary,
                "Internal and external primary diagnoses disagree"
            );
            let external_name = payload
                .primary_diagnosis
                .as_ref()
                .map(|p| p.name().to_string())
                .unwrap_or_default();
            warnings.push(
                ValidationWarning::new(
                    WarningKind::FusionDisagreement,
                    Severity::Warning,
                    format!(
                        "External opinion ({external_name}) disagrees with internal diagnosis ({}); human review advised",
                        self.knowledge.display_name(internal_primary)
                    ),
                )
                .with("internal_confidence", internal_confidence)
                .with("external_confidence", external_confidence),
            );
        }

        FusionOutcome {
            confidence,
            weights,
            status: ExternalOpinionStatus::Accepted {
                quality_score: assessment.quality_score,
            },
            accepted: Some(sanitize(payload)),
            disagreement,
        }
    }
}

fn checkpoint(cancel: &CancelToken, stage: &str) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        tracing::debug!(stage, "Decision cancelled");
        return Err(EngineError::Cancelled);
    }
    Ok(())
}

/// Merge by disease code keeping the higher probability, drop the primary,
/// order by descending probability and keep the first `top_k`.
fn merge_differential(
    differential: &mut Vec<RankedDiagnosis>,
    incoming: Vec<RankedDiagnosis>,
    primary: &str,
    top_k: usize,
) {
    for entry in incoming {
        match differential.iter_mut().find(|d| d.disease_code == entry.disease_code) {
            Some(existing) => existing.probability = existing.probability.max(entry.probability),
            None => differential.push(entry),
        }
    }
    differential.retain(|d| d.disease_code != primary);
    differential.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.disease_code.cmp(&b.disease_code))
    });
    differential.truncate(top_k);
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
