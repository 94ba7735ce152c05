use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::context::{Geolocation, TransactionContext, UserId};
use super::factor::{EvaluationResult, RiskFactor};
use super::rule::{AlertType, Severity};
use super::{Action, FraudStatus};

/// Lifecycle state of a persisted payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    /// Awaiting the downstream payment flow
    Pending,
    /// Refused (blocked intents land here)
    Failed,
    /// Settled by the downstream payment flow
    Succeeded,
}

impl IntentStatus {
    /// Initial status for a freshly evaluated intent.
    pub fn for_action(action: Action) -> Self {
        if action == Action::Block {
            IntentStatus::Failed
        } else {
            IntentStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Failed => "failed",
            IntentStatus::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted transaction attempt together with its risk decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub status: IntentStatus,
    pub fraud_score: u32,
    pub fraud_status: FraudStatus,
    pub action: Action,
    pub risk_factors: Vec<RiskFactor>,
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub service_request_id: Option<String>,
    pub partner_id: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntentRecord {
    /// Build the audit record for an evaluated transaction.
    pub fn from_evaluation(
        id: Uuid,
        ctx: &TransactionContext,
        result: &EvaluationResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        PaymentIntentRecord {
            id,
            user_id: ctx.user_id.clone(),
            amount: ctx.amount,
            currency: ctx.currency.clone(),
            status: IntentStatus::for_action(result.action),
            fraud_score: result.composite_score,
            fraud_status: result.status,
            action: result.action,
            risk_factors: result.risk_factors.clone(),
            ip_address: ctx.ip_address.clone(),
            device_fingerprint: ctx.device_fingerprint.clone(),
            geolocation: ctx.geolocation.clone().filter(|g| g.is_valid()),
            service_request_id: ctx.service_request_id.clone(),
            partner_id: ctx.partner_id.clone(),
            description: ctx.description.clone(),
            metadata: ctx.request_metadata.clone(),
            created_at,
        }
    }
}

/// Alert raised for a high or critical risk factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub payment_intent_id: Uuid,
    pub user_id: UserId,
    pub alert_type: AlertType,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub score: u32,
    /// Final action taken on the transaction
    pub action_taken: Action,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn for_factor(
        payment_intent_id: Uuid,
        user_id: &UserId,
        factor: &RiskFactor,
        action_taken: Action,
        created_at: DateTime<Utc>,
    ) -> Self {
        AlertRecord {
            id: Uuid::new_v4(),
            payment_intent_id,
            user_id: user_id.clone(),
            alert_type: factor.alert_type,
            rule_id: factor.rule_id.clone(),
            rule_name: factor.rule_name.clone(),
            severity: factor.severity,
            score: factor.score,
            action_taken,
            details: factor.details.clone(),
            created_at,
        }
    }
}
