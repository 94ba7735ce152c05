use async_trait::async_trait;

use crate::domain::{RiskFactor, Rule, RuleCondition, RuleType, TransactionContext};
use crate::rules::traits::{EvalDeps, RuleEvaluator};

const BASE_SCORE: f64 = 35.0;

/// Repeated failed payments within a rolling window ending now.
#[derive(Debug, Default)]
pub struct FailureEvaluator;

#[async_trait]
impl RuleEvaluator for FailureEvaluator {
    fn rule_type(&self) -> RuleType {
        RuleType::Failure
    }

    async fn evaluate(
        &self,
        ctx: &TransactionContext,
        rules: &[Rule],
        deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>> {
        let mut factors = Vec::new();

        for rule in rules {
            let RuleCondition::Failure(cond) = &rule.condition else {
                continue;
            };

            let since = deps.now - cond.period.duration();
            let failures = deps
                .history
                .count_failed_transactions(&ctx.user_id, since)
                .await?;

            if failures >= cond.max_failures {
                factors.push(RiskFactor::from_rule(
                    rule,
                    BASE_SCORE,
                    format!(
                        "{} failed payments in the last {} >= limit {}",
                        failures, cond.period, cond.max_failures
                    ),
                ));
            }
        }

        Ok(factors)
    }
}
