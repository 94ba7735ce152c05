use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::domain::{AlertRecord, EvaluationResult, PaymentIntentRecord, TransactionContext};
use crate::observability::MetricsRegistry;
use crate::storage::TransactionStore;
use crate::velocity::VelocityTracker;

/// What was durably written for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedOutcome {
    /// Generated before the write, so it is valid even if the write failed
    pub payment_intent_id: Uuid,
    pub intent_persisted: bool,
    pub alerts_written: usize,
    pub alert_failures: usize,
    pub velocity_updated: bool,
}

impl PersistedOutcome {
    /// Returns true if every side effect succeeded.
    pub fn is_complete(&self) -> bool {
        self.intent_persisted && self.alert_failures == 0 && self.velocity_updated
    }
}

/// Persists the audit trail and velocity counters after a decision.
///
/// Side-effect failures never change or fail the decision.
#[derive(Clone)]
pub struct DecisionRecorder {
    store: Arc<dyn TransactionStore>,
    velocity: VelocityTracker,
    metrics: Arc<MetricsRegistry>,
}

impl DecisionRecorder {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        velocity: VelocityTracker,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        DecisionRecorder {
            store,
            velocity,
            metrics,
        }
    }

    /// Write the intent, its alerts and the velocity increments.
    ///
    /// Velocity is incremented regardless of the decision so that blocked
    /// attempts still count toward later limits.
    pub async fn record(
        &self,
        ctx: &TransactionContext,
        result: &EvaluationResult,
        now: DateTime<Utc>,
        correlation_id: Uuid,
    ) -> PersistedOutcome {
        let payment_intent_id = Uuid::new_v4();
        let record = PaymentIntentRecord::from_evaluation(payment_intent_id, ctx, result, now);

        let intent_persisted = match self.store.insert_payment_intent(&record).await {
            Ok(_) => true,
            Err(e) => {
                self.metrics.record_persistence_failure();
                error!(
                    correlation_id = %correlation_id,
                    payment_intent_id = %payment_intent_id,
                    user_id = %ctx.user_id,
                    error = %e,
                    "Failed to persist payment intent"
                );
                false
            }
        };

        let mut alerts_written = 0;
        let mut alert_failures = 0;

        for factor in result.alerting_factors() {
            let alert = AlertRecord::for_factor(
                payment_intent_id,
                &ctx.user_id,
                factor,
                result.action,
                now,
            );

            match self.store.insert_alert(&alert).await {
                Ok(()) => alerts_written += 1,
                Err(e) => {
                    alert_failures += 1;
                    self.metrics.record_persistence_failure();
                    error!(
                        correlation_id = %correlation_id,
                        payment_intent_id = %payment_intent_id,
                        rule_id = %factor.rule_id,
                        error = %e,
                        "Failed to persist fraud alert"
                    );
                }
            }
        }
        self.metrics.record_alerts_written(alerts_written);

        let velocity_updated = match self
            .velocity
            .increment_counted(&ctx.user_id, ctx.amount, ctx.origin_id(), now)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_persistence_failure();
                error!(
                    correlation_id = %correlation_id,
                    user_id = %ctx.user_id,
                    error = %e,
                    "Failed to update velocity counters"
                );
                false
            }
        };

        debug!(
            correlation_id = %correlation_id,
            payment_intent_id = %payment_intent_id,
            intent_persisted,
            alerts_written,
            velocity_updated,
            "Decision recorded"
        );

        PersistedOutcome {
            payment_intent_id,
            intent_persisted,
            alerts_written,
            alert_failures,
            velocity_updated,
        }
    }
}

impl std::fmt::Debug for DecisionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRecorder")
            .field("velocity", &self.velocity)
            .finish_non_exhaustive()
    }
}
