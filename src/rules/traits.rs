use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::domain::{RiskFactor, Rule, RuleType, TransactionContext};
use crate::storage::TransactionStore;
use crate::velocity::VelocityTracker;

/// Read-only collaborators available to evaluators during one evaluation.
pub struct EvalDeps<'a> {
    pub velocity: &'a VelocityTracker,
    pub history: &'a dyn TransactionStore,
    /// Instant the evaluation is pinned to
    pub now: DateTime<Utc>,
    /// Maximum prior locations compared by geolocation rules
    pub geo_lookback: usize,
}

/// Evaluates every active rule of one type against a transaction.
///
/// Implementations must not fail for missing optional context fields;
/// they return no factors instead. Errors are reserved for collaborator
/// failures, which the engine handles according to its signal policy.
#[async_trait]
pub trait RuleEvaluator: Send + Sync + Debug {
    /// The rule type this evaluator handles.
    fn rule_type(&self) -> RuleType;

    /// Evaluate the rules against a transaction, returning one factor per match.
    async fn evaluate(
        &self,
        ctx: &TransactionContext,
        rules: &[Rule],
        deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, AlertType, Severity, UserId};
    use crate::domain::rule::{AmountCondition, RuleCondition};
    use crate::storage::MemoryStorage;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[derive(Debug)]
    struct AlwaysMatch;

    #[async_trait]
    impl RuleEvaluator for AlwaysMatch {
        fn rule_type(&self) -> RuleType {
            RuleType::Amount
        }

        async fn evaluate(
            &self,
            _ctx: &TransactionContext,
            rules: &[Rule],
            _deps: &EvalDeps<'_>,
        ) -> anyhow::Result<Vec<RiskFactor>> {
            Ok(rules
                .iter()
                .map(|r| RiskFactor::from_rule(r, 10.0, "always"))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_evaluator_trait_object() {
        let storage = Arc::new(MemoryStorage::new());
        let velocity = VelocityTracker::new(storage.clone());
        let deps = EvalDeps {
            velocity: &velocity,
            history: storage.as_ref(),
            now: Utc::now(),
            geo_lookback: 5,
        };

        let rule = Rule {
            id: "T1".to_string(),
            name: "test".to_string(),
            condition: RuleCondition::Amount(AmountCondition {
                threshold: Decimal::ZERO,
            }),
            action: Action::Allow,
            severity: Severity::Medium,
            priority: 0,
            alert_type: AlertType::LargeAmount,
        };

        let evaluator: Box<dyn RuleEvaluator> = Box::new(AlwaysMatch);
        let ctx = TransactionContext::new(UserId::new("U1"), Decimal::ONE, "USD");
        let factors = evaluator.evaluate(&ctx, &[rule], &deps).await.unwrap();

        assert_eq!(evaluator.rule_type(), RuleType::Amount);
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].score, 10);
    }
}
