use async_trait::async_trait;
use chrono::Duration;

use crate::domain::{RiskFactor, Rule, RuleCondition, RuleType, TransactionContext};
use crate::rules::traits::{EvalDeps, RuleEvaluator};

const BASE_SCORE: f64 = 40.0;

/// Implausible travel between recent transaction locations.
///
/// Compares the current location against the user's most recent located
/// transactions inside the rule's window. At most one factor is produced
/// per rule: the newest prior location beyond the distance limit.
#[derive(Debug, Default)]
pub struct GeolocationEvaluator;

#[async_trait]
impl RuleEvaluator for GeolocationEvaluator {
    fn rule_type(&self) -> RuleType {
        RuleType::Geolocation
    }

    async fn evaluate(
        &self,
        ctx: &TransactionContext,
        rules: &[Rule],
        deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>> {
        let Some(here) = ctx.geo_point() else {
            return Ok(Vec::new());
        };

        let mut factors = Vec::new();

        for rule in rules {
            let RuleCondition::Geolocation(cond) = &rule.condition else {
                continue;
            };

            let since = deps.now - Duration::minutes(cond.period_minutes as i64);
            let recent = deps
                .history
                .list_recent_geo_points(&ctx.user_id, since, deps.geo_lookback)
                .await?;

            let jump = recent
                .iter()
                .map(|prior| here.distance_km(prior))
                .find(|distance| *distance > cond.max_distance_km);

            if let Some(distance) = jump {
                factors.push(RiskFactor::from_rule(
                    rule,
                    BASE_SCORE,
                    format!(
                        "{:.0} km from a location used within {} minutes (limit {:.0} km)",
                        distance, cond.period_minutes, cond.max_distance_km
                    ),
                ));
            }
        }

        Ok(factors)
    }
}
