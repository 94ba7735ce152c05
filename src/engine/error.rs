use thiserror::Error;

use crate::domain::RuleType;

/// Failures that prevent a decision from being made.
///
/// Persistence failures after a decision are not represented here; they are
/// logged and counted by the recorder.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rules could not be listed. The engine never decides without rules.
    #[error("rule store unavailable")]
    RuleStoreUnavailable(#[source] anyhow::Error),

    /// A history or velocity lookup failed under the fail-closed policy.
    #[error("{rule_type} signal unavailable")]
    SignalUnavailable {
        rule_type: RuleType,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Short machine-readable kind, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::RuleStoreUnavailable(_) => "rule_store_unavailable",
            EngineError::SignalUnavailable { .. } => "signal_unavailable",
        }
    }
}
