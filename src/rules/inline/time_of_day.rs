use async_trait::async_trait;
use chrono::Timelike;

use crate::domain::{RiskFactor, Rule, RuleCondition, RuleType, TransactionContext};
use crate::rules::traits::{EvalDeps, RuleEvaluator};

const BASE_SCORE: f64 = 10.0;

/// Transactions made during a configured UTC hour window.
///
/// The rule's `thresholdMultiplier` scales the factor score itself.
#[derive(Debug, Default)]
pub struct TimeOfDayEvaluator;

#[async_trait]
impl RuleEvaluator for TimeOfDayEvaluator {
    fn rule_type(&self) -> RuleType {
        RuleType::Time
    }

    async fn evaluate(
        &self,
        _ctx: &TransactionContext,
        rules: &[Rule],
        deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>> {
        let hour = deps.now.hour();

        let factors = rules
            .iter()
            .filter_map(|rule| match &rule.condition {
                RuleCondition::Time(cond) if cond.contains_hour(hour) => Some(RiskFactor::from_rule(
                    rule,
                    BASE_SCORE * cond.threshold_multiplier,
                    format!(
                        "hour {:02} UTC within [{:02}, {:02})",
                        hour, cond.start_hour, cond.end_hour
                    ),
                )),
                _ => None,
            })
            .collect();

        Ok(factors)
    }
}
