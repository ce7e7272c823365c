use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ensemble::MemberKind;

/// Application-level constants
pub const APP_NAME: &str = "dxengine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment prefix for configuration overrides.
const ENV_PREFIX: &str = "DXENGINE_";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "dxengine_lib=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Load(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Ensemble member weights sum to {0}, expected 1.0")]
    WeightsDoNotSum(f64),

    #[error("Ensemble has no members")]
    NoMembers,

    #[error("{0} must be within [0, 1], got {1}")]
    OutOfRange(&'static str, f64),

    #[error("differential_top_k must be at least 1")]
    ZeroTopK,
}

// ═══════════════════════════════════════════════════════════
// Training parameters
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Synthetic samples generated per disease.
    pub samples_per_disease: usize,
    /// Fraction of samples held out for validation.
    pub holdout_fraction: f64,
    pub seed: u64,
    pub forest_trees: usize,
    pub forest_max_depth: usize,
    pub forest_min_samples_split: usize,
    pub boosting_rounds: usize,
    pub boosting_learning_rate: f64,
    pub boosting_max_depth: usize,
    pub logistic_epochs: usize,
    pub logistic_learning_rate: f64,
    pub logistic_l2: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            samples_per_disease: 50,
            holdout_fraction: 0.2,
            seed: 42,
            forest_trees: 50,
            forest_max_depth: 10,
            forest_min_samples_split: 5,
            boosting_rounds: 30,
            boosting_learning_rate: 0.1,
            boosting_max_depth: 3,
            logistic_epochs: 300,
            logistic_learning_rate: 0.5,
            logistic_l2: 1e-3,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Engine configuration
// ═══════════════════════════════════════════════════════════

/// Every tunable of the decision pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum differential diagnoses returned.
    pub differential_top_k: usize,
    /// Weight of the internal decision when fusing with an external opinion.
    pub fusion_alpha: f64,
    /// Both sources above this confidence with different primaries is a disagreement.
    pub disagreement_threshold: f64,
    /// Floor for the compounded clinical-validation multiplier.
    pub confidence_floor: f64,
    /// Compounded multiplier below this makes a diagnosis invalid.
    pub validity_threshold: f64,
    /// Minimum quality for an external opinion to be used.
    pub opinion_quality_threshold: f64,
    /// Confidence below this flags the decision for specialist review.
    pub specialist_review_threshold: f64,
    /// Declared combination weight per member kind; must sum to 1.0.
    pub member_weights: Vec<(MemberKind, f64)>,
    pub training: TrainingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            differential_top_k: 5,
            fusion_alpha: 0.6,
            disagreement_threshold: 0.6,
            confidence_floor: 0.1,
            validity_threshold: 0.3,
            opinion_quality_threshold: 0.3,
            specialist_review_threshold: 0.7,
            member_weights: vec![
                (MemberKind::RandomForest, 0.4),
                (MemberKind::GradientBoosting, 0.4),
                (MemberKind::LogisticRegression, 0.2),
            ],
            training: TrainingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; absent fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(path.display().to_string(), e.to_string()))?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `DXENGINE_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TOP_K") {
            self.differential_top_k = parse_env("TOP_K", &v)?;
        }
        if let Some(v) = lookup("FUSION_ALPHA") {
            self.fusion_alpha = parse_env("FUSION_ALPHA", &v)?;
        }
        if let Some(v) = lookup("DISAGREEMENT_THRESHOLD") {
            self.disagreement_threshold = parse_env("DISAGREEMENT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("OPINION_QUALITY_THRESHOLD") {
            self.opinion_quality_threshold = parse_env("OPINION_QUALITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("TRAINING_SEED") {
            self.training.seed = parse_env("TRAINING_SEED", &v)?;
        }
        if let Some(v) = lookup("SAMPLES_PER_DISEASE") {
            self.training.samples_per_disease = parse_env("SAMPLES_PER_DISEASE", &v)?;
        }
        Ok(())
    }

    /// Startup validation. Any error here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.member_weights.is_empty() {
            return Err(ConfigError::NoMembers);
        }
        let sum: f64 = self.member_weights.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsDoNotSum(sum));
        }
        if self.differential_top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        for (name, value) in [
            ("fusion_alpha", self.fusion_alpha),
            ("disagreement_threshold", self.disagreement_threshold),
            ("confidence_floor", self.confidence_floor),
            ("validity_threshold", self.validity_threshold),
            ("opinion_quality_threshold", self.opinion_quality_threshold),
            ("specialist_review_threshold", self.specialist_review_threshold),
            ("training.holdout_fraction", self.training.holdout_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange(name, value));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.differential_top_k, 5);
        assert!((config.fusion_alpha - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let config = EngineConfig {
            member_weights: vec![(MemberKind::RandomForest, 0.5), (MemberKind::LogisticRegression, 0.2)],
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::WeightsDoNotSum(_))));
    }

    #[test]
    fn alpha_out_of_range_rejected() {
        let config = EngineConfig {
            fusion_alpha: 1.4,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange("fusion_alpha", _))
        ));
    }

    #[test]
    fn overrides_parse_and_reject_garbage() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| match key {
                "TOP_K" => Some("3".into()),
                "FUSION_ALPHA" => Some("0.75".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.differential_top_k, 3);
        assert!((config.fusion_alpha - 0.75).abs() < f64::EPSILON);

        let err = config
            .apply_overrides(|key| (key == "TOP_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn load_partial_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"differential_top_k": 3, "training": {"seed": 7}}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.differential_top_k, 3);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.samples_per_disease, 50);
    }

    #[test]
    fn app_name() {
        assert_eq!(APP_NAME, "dxengine");
    }
}
