pub mod aggregator;
pub mod error;
pub mod recorder;

pub use aggregator::ScoreAggregator;
pub use error::EngineError;
pub use recorder::{DecisionRecorder, PersistedOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::{EvaluationResult, RiskFactor, Rule, TransactionContext};
use crate::observability::{MetricsRegistry, TimingGuard};
use crate::rules::{default_evaluators, EvalDeps, RuleBook, RuleEvaluator};
use crate::storage::{RuleStore, TransactionStore};
use crate::velocity::VelocityTracker;

/// What to do when an evaluator cannot read its signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SignalFailurePolicy {
    /// The failing evaluator contributes no factors
    #[default]
    #[value(name = "fail_open")]
    FailOpen,
    /// The evaluation fails with `EngineError::SignalUnavailable`
    #[value(name = "fail_closed")]
    FailClosed,
}

impl SignalFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalFailurePolicy::FailOpen => "fail_open",
            SignalFailurePolicy::FailClosed => "fail_closed",
        }
    }
}

impl fmt::Display for SignalFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub signal_failure_policy: SignalFailurePolicy,
    /// Maximum prior locations compared by geolocation rules
    pub geo_lookback: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            signal_failure_policy: SignalFailurePolicy::FailOpen,
            geo_lookback: 5,
        }
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub correlation_id: Uuid,
    pub payment_intent_id: Uuid,
    pub result: EvaluationResult,
    pub persisted: PersistedOutcome,
}

/// Scores transactions against the active rules and records the outcome.
///
/// The engine holds no locks of its own. Same-user concurrency is resolved
/// by the store's atomic velocity upsert.
pub struct RiskEngine {
    rules: Arc<dyn RuleStore>,
    store: Arc<dyn TransactionStore>,
    velocity: VelocityTracker,
    evaluators: Vec<Arc<dyn RuleEvaluator>>,
    aggregator: ScoreAggregator,
    recorder: DecisionRecorder,
    metrics: Arc<MetricsRegistry>,
    options: EngineOptions,
}

impl RiskEngine {
    /// Create an engine with one evaluator per rule type.
    pub fn new(
        rules: Arc<dyn RuleStore>,
        store: Arc<dyn TransactionStore>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let velocity = VelocityTracker::new(store.clone());
        let recorder = DecisionRecorder::new(store.clone(), velocity.clone(), metrics.clone());

        RiskEngine {
            rules,
            store,
            velocity,
            evaluators: default_evaluators(),
            aggregator: ScoreAggregator::new(),
            recorder,
            metrics,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the evaluator set.
    pub fn with_evaluators(mut self, evaluators: Vec<Arc<dyn RuleEvaluator>>) -> Self {
        self.evaluators = evaluators;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Number of active rules, or an error while rules cannot be listed.
    pub async fn ready(&self) -> Result<usize, EngineError> {
        self.load_rules().await.map(|rules| rules.len())
    }

    async fn load_rules(&self) -> Result<Vec<Rule>, EngineError> {
        self.rules.list_active_rules().await.map_err(|e| {
            self.metrics.record_rule_store_failure();
            EngineError::RuleStoreUnavailable(e)
        })
    }

    /// Evaluate a transaction at the current instant.
    pub async fn evaluate(
        &self,
        ctx: &TransactionContext,
        correlation_id: Uuid,
    ) -> Result<EvaluationOutcome, EngineError> {
        self.evaluate_at(ctx, correlation_id, Utc::now()).await
    }

    /// Evaluate a transaction with every time-dependent rule pinned to `now`.
    pub async fn evaluate_at(
        &self,
        ctx: &TransactionContext,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, EngineError> {
        let _timer = TimingGuard::new(&self.metrics);

        let outcome = self.run(ctx, correlation_id, now).await;
        if let Err(e) = &outcome {
            self.metrics.record_evaluation_error();
            error!(
                correlation_id = %correlation_id,
                user_id = %ctx.user_id,
                kind = e.kind(),
                error = ?e,
                "Evaluation failed"
            );
        }

        outcome
    }

    async fn run(
        &self,
        ctx: &TransactionContext,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, EngineError> {
        let book = RuleBook::new(self.load_rules().await?);

        let factors = self.collect_factors(ctx, &book, correlation_id, now).await?;
        self.metrics.record_rules(book.len(), factors.len());

        let result = self.aggregator.aggregate(factors);
        let persisted = self.recorder.record(ctx, &result, now, correlation_id).await;

        self.metrics.record_action(result.action);
        info!(
            correlation_id = %correlation_id,
            payment_intent_id = %persisted.payment_intent_id,
            user_id = %ctx.user_id,
            score = result.composite_score,
            action = %result.action,
            factors = result.risk_factors.len(),
            "Transaction evaluated"
        );

        Ok(EvaluationOutcome {
            correlation_id,
            payment_intent_id: persisted.payment_intent_id,
            result,
            persisted,
        })
    }

    async fn collect_factors(
        &self,
        ctx: &TransactionContext,
        book: &RuleBook,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RiskFactor>, EngineError> {
        let deps = EvalDeps {
            velocity: &self.velocity,
            history: self.store.as_ref(),
            now,
            geo_lookback: self.options.geo_lookback,
        };

        let mut factors = Vec::new();

        for evaluator in &self.evaluators {
            let rule_type = evaluator.rule_type();
            let rules = book.rules_for(rule_type);
            if rules.is_empty() {
                continue;
            }

            match evaluator.evaluate(ctx, rules, &deps).await {
                Ok(found) => {
                    debug!(
                        correlation_id = %correlation_id,
                        rule_type = %rule_type,
                        rules = rules.len(),
                        matched = found.len(),
                        "Evaluator finished"
                    );
                    factors.extend(found);
                }
                Err(e) => {
                    self.metrics.record_signal_failure();
                    match self.options.signal_failure_policy {
                        SignalFailurePolicy::FailOpen => {
                            error!(
                                correlation_id = %correlation_id,
                                rule_type = %rule_type,
                                error = %e,
                                "Signal unavailable, evaluator skipped"
                            );
                        }
                        SignalFailurePolicy::FailClosed => {
                            return Err(EngineError::SignalUnavailable {
                                rule_type,
                                source: e,
                            });
                        }
                    }
                }
            }
        }

        Ok(factors)
    }
}

impl fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskEngine")
            .field("evaluators", &self.evaluators)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, FraudStatus, RuleDef, UserId};
    use crate::storage::{MemoryStorage, StorageOp};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn def(id: &str, rule_type: &str, condition: serde_json::Value, action: &str, severity: &str) -> RuleDef {
        RuleDef {
            id: id.to_string(),
            name: id.to_lowercase(),
            rule_type: rule_type.to_string(),
            condition,
            action: action.to_string(),
            severity: severity.to_string(),
            priority: 0,
            is_active: true,
            alert_type: None,
        }
    }

    fn engine(storage: &Arc<MemoryStorage>) -> RiskEngine {
        crate::observability::tracing::init_test_tracing();
        RiskEngine::new(storage.clone(), storage.clone(), Arc::new(MetricsRegistry::new()))
    }

    fn ctx(amount: i64) -> TransactionContext {
        TransactionContext::new(UserId::new("U1"), Decimal::new(amount, 0), "USD")
    }

    #[tokio::test]
    async fn test_no_rules_allows() {
        let storage = Arc::new(MemoryStorage::new());
        let outcome = engine(&storage).evaluate(&ctx(100), Uuid::new_v4()).await.unwrap();

        assert_eq!(outcome.result.composite_score, 0);
        assert_eq!(outcome.result.action, Action::Allow);
        assert!(outcome.persisted.is_complete());
        assert_eq!(storage.recorded_intents().len(), 1);
    }

    #[tokio::test]
    async fn test_rule_store_failure_is_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.fail_on(StorageOp::ListRules);
        let engine = engine(&storage);

        let err = engine.evaluate(&ctx(100), Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, EngineError::RuleStoreUnavailable(_)));
        assert!(storage.recorded_intents().is_empty());
        assert_eq!(engine.metrics().evaluation_errors.load(Ordering::Relaxed), 1);
        assert!(matches!(
            engine.ready().await,
            Err(EngineError::RuleStoreUnavailable(_))
        ));
        assert_eq!(engine.metrics().rule_store_failures_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_signal_failure_policies() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_rules(vec![
            def("A1", "amount", json!({"threshold": 50}), "review", "medium"),
            def("F1", "failure", json!({"period": "hour", "maxFailures": 1}), "block", "high"),
        ]);
        storage.fail_on(StorageOp::HistoryRead);

        let open = engine(&storage).evaluate(&ctx(100), Uuid::new_v4()).await.unwrap();
        assert_eq!(open.result.action, Action::Review);
        assert_eq!(open.result.risk_factors.len(), 1);
        assert_eq!(open.result.status, FraudStatus::Review);

        let closed = engine(&storage).with_options(EngineOptions {
            signal_failure_policy: SignalFailurePolicy::FailClosed,
            ..EngineOptions::default()
        });
        let err = closed.evaluate(&ctx(100), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::SignalUnavailable {
                rule_type: crate::domain::RuleType::Failure,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_outcome_ids_match() {
        let storage = Arc::new(MemoryStorage::new());
        let correlation_id = Uuid::new_v4();

        let outcome = engine(&storage).evaluate(&ctx(5), correlation_id).await.unwrap();

        assert_eq!(outcome.correlation_id, correlation_id);
        assert_eq!(outcome.payment_intent_id, outcome.persisted.payment_intent_id);
        assert_eq!(storage.recorded_intents()[0].id, outcome.payment_intent_id);
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(SignalFailurePolicy::default(), SignalFailurePolicy::FailOpen);
        assert_eq!(SignalFailurePolicy::FailClosed.to_string(), "fail_closed");
    }
}
