use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Action, FraudStatus, RiskFactor};
use crate::engine::EvaluationOutcome;

/// Response from an evaluation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResponse {
    pub payment_intent_id: Uuid,
    pub fraud_score: u32,
    pub fraud_status: FraudStatus,
    pub action: Action,
    pub risk_factors: Vec<RiskFactor>,
    /// False only when the action is block
    pub allowed: bool,
}

impl From<EvaluationOutcome> for EvaluationResponse {
    fn from(outcome: EvaluationOutcome) -> Self {
        let result = outcome.result;
        EvaluationResponse {
            payment_intent_id: outcome.payment_intent_id,
            fraud_score: result.composite_score,
            fraud_status: result.status,
            allowed: result.allowed(),
            action: result.action,
            risk_factors: result.risk_factors,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub ready: bool,
    pub active_rules: usize,
}

/// Error response. Internal details are logged, never returned.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: &'static str,
    pub correlation_id: Uuid,
}

impl ErrorResponse {
    pub fn bad_request(correlation_id: Uuid) -> Self {
        ErrorResponse {
            error: "bad_request",
            correlation_id,
        }
    }

    pub fn server_error(correlation_id: Uuid) -> Self {
        ErrorResponse {
            error: "server_error",
            correlation_id,
        }
    }

    pub fn not_ready(correlation_id: Uuid) -> Self {
        ErrorResponse {
            error: "not_ready",
            correlation_id,
        }
    }
}
