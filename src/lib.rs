//! Clinical diagnostic decision engine.
//!
//! Given symptoms and minimal patient context, produces a ranked
//! differential diagnosis with calibrated confidence, entropy-based
//! uncertainty and clinical-safety warnings, optionally reconciled with an
//! externally supplied opinion. See [`fusion::DecisionEngine`].

pub mod candidates;
pub mod config;
pub mod ensemble;
pub mod fusion;
pub mod knowledge;
pub mod opinion;
pub mod validation;

#[cfg(test)]
mod scenarios;

use tracing_subscriber::EnvFilter;

pub use fusion::{DecisionEngine, DiagnosisDecision, DiagnosticRequest, EngineError};

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over the
/// crate's default filter. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
    tracing::info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);
}
