use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::{
    PeriodType, RiskFactor, Rule, RuleCondition, RuleType, TransactionContext, VelocityBucket,
};
use crate::rules::traits::{EvalDeps, RuleEvaluator};

const COUNT_BASE_SCORE: f64 = 25.0;
const AMOUNT_BASE_SCORE: f64 = 30.0;

/// Transaction count and amount per period.
///
/// Buckets are read before this transaction is counted, so a limit of N
/// matches once N prior transactions exist in the period. Count and amount
/// limits are checked independently and may both produce a factor.
#[derive(Debug, Default)]
pub struct VelocityEvaluator;

#[async_trait]
impl RuleEvaluator for VelocityEvaluator {
    fn rule_type(&self) -> RuleType {
        RuleType::Velocity
    }

    async fn evaluate(
        &self,
        ctx: &TransactionContext,
        rules: &[Rule],
        deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>> {
        let mut buckets: HashMap<PeriodType, VelocityBucket> = HashMap::new();
        let mut factors = Vec::new();

        for rule in rules {
            let RuleCondition::Velocity(cond) = &rule.condition else {
                continue;
            };

            if !buckets.contains_key(&cond.period) {
                let bucket = deps
                    .velocity
                    .get(&ctx.user_id, cond.period, deps.now)
                    .await?
                    .unwrap_or_else(|| {
                        VelocityBucket::empty(ctx.user_id.clone(), cond.period, deps.now)
                    });
                buckets.insert(cond.period, bucket);
            }
            let bucket = &buckets[&cond.period];

            if let Some(max) = cond.max_transactions {
                if bucket.transaction_count >= max {
                    factors.push(RiskFactor::from_rule(
                        rule,
                        COUNT_BASE_SCORE,
                        format!(
                            "{} transactions this {} >= limit {}",
                            bucket.transaction_count, cond.period, max
                        ),
                    ));
                }
            }

            if let Some(max) = cond.max_amount {
                if bucket.total_amount >= max {
                    factors.push(RiskFactor::from_rule(
                        rule,
                        AMOUNT_BASE_SCORE,
                        format!(
                            "total {} this {} >= limit {}",
                            bucket.total_amount, cond.period, max
                        ),
                    ));
                }
            }
        }

        Ok(factors)
    }
}
