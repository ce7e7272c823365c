use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};

use chrono::{DateTime, Utc};

use super::training::TrainingReport;
use super::types::{EnsembleError, EnsembleMember};
use super::vocabulary::FeatureVocabulary;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// An immutable, fully trained ensemble. Never mutated after publication.
#[derive(Debug)]
pub struct EnsembleSnapshot {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub vocabulary: FeatureVocabulary,
    /// Disease codes; index `i` is dimension `i` of every member distribution.
    pub classes: Vec<String>,
    pub members: Vec<EnsembleMember>,
    pub report: Option<TrainingReport>,
}

impl EnsembleSnapshot {
    pub fn new(
        version: u64,
        vocabulary: FeatureVocabulary,
        classes: Vec<String>,
        members: Vec<EnsembleMember>,
    ) -> Result<Self, EnsembleError> {
        if members.is_empty() {
            return Err(EnsembleError::InvalidSnapshot("no members".into()));
        }
        if classes.is_empty() {
            return Err(EnsembleError::InvalidSnapshot("no classes".into()));
        }
        if members.iter().any(|m| !m.weight.is_finite() || m.weight < 0.0) {
            return Err(EnsembleError::InvalidSnapshot("negative member weight".into()));
        }
        let total: f64 = members.iter().map(|m| m.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EnsembleError::InvalidSnapshot(format!(
                "member weights sum to {total}"
            )));
        }
        Ok(Self {
            version,
            trained_at: Utc::now(),
            vocabulary,
            classes,
            members,
            report: None,
        })
    }

    pub fn with_report(mut self, report: TrainingReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn class_index(&self, disease_code: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == disease_code)
    }
}

/// Holder of the active snapshot.
///
/// Readers clone the `Arc` and score against it without holding the lock;
/// publication swaps the pointer, so a request sees either the old or the
/// new snapshot in full. At most one training pass runs at a time.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    active: RwLock<Option<Arc<EnsembleSnapshot>>>,
    training: Mutex<()>,
    last_version: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active snapshot, or `ModelNotReady`.
    pub fn current(&self) -> Result<Arc<EnsembleSnapshot>, EnsembleError> {
        let guard = self.active.read().map_err(|_| EnsembleError::LockPoisoned)?;
        guard.clone().ok_or(EnsembleError::ModelNotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.active.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Atomically replace the active snapshot. Returns the previous version.
    pub fn publish(&self, snapshot: EnsembleSnapshot) -> Result<Option<u64>, EnsembleError> {
        let version = snapshot.version;
        let next = Arc::new(snapshot);
        let previous = {
            let mut guard = self.active.write().map_err(|_| EnsembleError::LockPoisoned)?;
            guard.replace(next)
        };
        self.last_version.fetch_max(version, Ordering::SeqCst);
        let previous = previous.map(|s| s.version);
        tracing::info!(version, ?previous, "Ensemble snapshot published");
        Ok(previous)
    }

    /// Drop the active snapshot. In-flight readers keep their `Arc`.
    pub fn clear(&self) -> Result<(), EnsembleError> {
        let mut guard = self.active.write().map_err(|_| EnsembleError::LockPoisoned)?;
        *guard = None;
        Ok(())
    }

    /// Version number for the next snapshot to be built.
    pub fn next_version(&self) -> u64 {
        self.last_version.load(Ordering::SeqCst) + 1
    }

    /// Claim the training slot. A second concurrent claim fails with
    /// `TrainingInProgress` rather than blocking.
    pub fn begin_training(&self) -> Result<MutexGuard<'_, ()>, EnsembleError> {
        match self.training.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(EnsembleError::TrainingInProgress),
            Err(TryLockError::Poisoned(_)) => Err(EnsembleError::LockPoisoned),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ensemble::types::{MemberKind, ProbabilisticClassifier};

    /// Member that always returns the same distribution.
    #[derive(Debug)]
    pub(crate) struct FixedMember {
        pub kind: MemberKind,
        pub dist: Vec<f64>,
    }

    impl ProbabilisticClassifier for FixedMember {
        fn kind(&self) -> MemberKind {
            self.kind
        }

        fn predict_distribution(&self, _features: &[f64]) -> Vec<f64> {
            self.dist.clone()
        }
    }

    pub(crate) fn fixed_snapshot(version: u64, members: Vec<(f64, Vec<f64>)>) -> EnsembleSnapshot {
        let kinds = [
            MemberKind::RandomForest,
            MemberKind::GradientBoosting,
            MemberKind::LogisticRegression,
        ];
        let n_classes = members[0].1.len();
        let classes = (0..n_classes).map(|i| format!("d{i}")).collect();
        let members = members
            .into_iter()
            .enumerate()
            .map(|(i, (weight, dist))| {
                EnsembleMember::new(
                    weight,
                    Box::new(FixedMember {
                        kind: kinds[i % kinds.len()],
                        dist,
                    }),
                )
            })
            .collect();
        EnsembleSnapshot::new(
            version,
            FeatureVocabulary::new(["s0", "s1", "s2"]),
            classes,
            members,
        )
        .unwrap()
    }

    #[test]
    fn empty_store_is_not_ready() {
        let store = SnapshotStore::new();
        assert!(!store.is_ready());
        assert!(matches!(store.current(), Err(EnsembleError::ModelNotReady)));
        assert_eq!(store.next_version(), 1);
    }

    #[test]
    fn publish_swaps_and_keeps_old_readers_valid() {
        let store = SnapshotStore::new();
        store.publish(fixed_snapshot(1, vec![(1.0, vec![1.0, 0.0])])).unwrap();
        let held = store.current().unwrap();

        let previous = store.publish(fixed_snapshot(2, vec![(1.0, vec![0.0, 1.0])])).unwrap();
        assert_eq!(previous, Some(1));
        assert_eq!(held.version, 1);
        assert_eq!(store.current().unwrap().version, 2);
        assert_eq!(store.next_version(), 3);
    }

    #[test]
    fn second_training_claim_is_rejected() {
        let store = SnapshotStore::new();
        let _guard = store.begin_training().unwrap();
        assert!(matches!(
            store.begin_training(),
            Err(EnsembleError::TrainingInProgress)
        ));
    }

    #[test]
    fn invalid_snapshots_rejected() {
        let vocab = FeatureVocabulary::new(["s0"]);
        let err = EnsembleSnapshot::new(1, vocab.clone(), vec!["a".into()], Vec::new()).unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidSnapshot(_)));

        let member = EnsembleMember::new(
            0.5,
            Box::new(FixedMember {
                kind: MemberKind::RandomForest,
                dist: vec![1.0],
            }),
        );
        let err = EnsembleSnapshot::new(1, vocab, vec!["a".into()], vec![member]).unwrap_err();
        assert!(err.to_string().contains("sum to 0.5"));
    }

    #[test]
    fn clear_drops_active_snapshot() {
        let store = SnapshotStore::new();
        store.publish(fixed_snapshot(1, vec![(1.0, vec![1.0])])).unwrap();
        store.clear().unwrap();
        assert!(!store.is_ready());
    }
}
