use async_trait::async_trait;

use crate::domain::{RiskFactor, Rule, RuleCondition, RuleType, TransactionContext};
use crate::rules::traits::{EvalDeps, RuleEvaluator};

const BASE_SCORE: f64 = 20.0;

/// Single-transaction amount threshold.
#[derive(Debug, Default)]
pub struct AmountEvaluator;

#[async_trait]
impl RuleEvaluator for AmountEvaluator {
    fn rule_type(&self) -> RuleType {
        RuleType::Amount
    }

    async fn evaluate(
        &self,
        ctx: &TransactionContext,
        rules: &[Rule],
        _deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>> {
        let factors = rules
            .iter()
            .filter_map(|rule| match &rule.condition {
                RuleCondition::Amount(cond) if ctx.amount >= cond.threshold => {
                    Some(RiskFactor::from_rule(
                        rule,
                        BASE_SCORE,
                        format!(
                            "amount {} {} >= threshold {}",
                            ctx.amount, ctx.currency, cond.threshold
                        ),
                    ))
                }
                _ => None,
            })
            .collect();

        Ok(factors)
    }
}
