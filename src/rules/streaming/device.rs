use async_trait::async_trait;

use crate::domain::{RiskFactor, Rule, RuleCondition, RuleType, TransactionContext};
use crate::rules::traits::{EvalDeps, RuleEvaluator};

const BASE_SCORE: f64 = 15.0;

/// Large payments from a device with no successful payment history.
#[derive(Debug, Default)]
pub struct DeviceEvaluator;

#[async_trait]
impl RuleEvaluator for DeviceEvaluator {
    fn rule_type(&self) -> RuleType {
        RuleType::Device
    }

    async fn evaluate(
        &self,
        ctx: &TransactionContext,
        rules: &[Rule],
        deps: &EvalDeps<'_>,
    ) -> anyhow::Result<Vec<RiskFactor>> {
        let Some(fingerprint) = ctx.device_fingerprint.as_deref().filter(|f| !f.is_empty()) else {
            return Ok(Vec::new());
        };

        let mut known: Option<u32> = None;
        let mut factors = Vec::new();

        for rule in rules {
            let RuleCondition::Device(cond) = &rule.condition else {
                continue;
            };
            if ctx.amount < cond.new_device_threshold {
                continue;
            }

            let successes = match known {
                Some(n) => n,
                None => {
                    let n = deps
                        .history
                        .count_successful_by_device(&ctx.user_id, fingerprint)
                        .await?;
                    known = Some(n);
                    n
                }
            };

            if successes == 0 {
                factors.push(RiskFactor::from_rule(
                    rule,
                    BASE_SCORE,
                    format!(
                        "new device with amount {} >= threshold {}",
                        ctx.amount, cond.new_device_threshold
                    ),
                ));
            }
        }

        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::DeviceCondition;
    use crate::domain::{Action, IntentStatus, Severity};
    use crate::rules::testing::{ctx, rule, seed, Harness};
    use crate::storage::StorageOp;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn device_rule(threshold: i64) -> Rule {
        rule(
            "R_DEVICE",
            RuleCondition::Device(DeviceCondition {
                new_device_threshold: Decimal::new(threshold, 0),
            }),
            Action::Challenge,
            Severity::Medium,
        )
    }

    #[tokio::test]
    async fn test_new_device_large_amount() {
        let h = Harness::new();

        let factors = DeviceEvaluator
            .evaluate(&ctx(600).with_device("fp-new"), &[device_rule(500)], &h.deps(Utc::now()))
            .await
            .unwrap();

        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].score, 15);
        assert_eq!(factors[0].action, Action::Challenge);
    }

    #[tokio::test]
    async fn test_known_device() {
        let h = Harness::new();
        seed(&h.storage, IntentStatus::Succeeded, Duration::days(20), |r| {
            r.device_fingerprint = Some("fp-known".to_string());
        });

        let factors = DeviceEvaluator
            .evaluate(&ctx(600).with_device("fp-known"), &[device_rule(500)], &h.deps(Utc::now()))
            .await
            .unwrap();

        assert!(factors.is_empty());
    }

    #[tokio::test]
    async fn test_failed_history_does_not_count() {
        let h = Harness::new();
        seed(&h.storage, IntentStatus::Failed, Duration::days(1), |r| {
            r.device_fingerprint = Some("fp-1".to_string());
        });

        let factors = DeviceEvaluator
            .evaluate(&ctx(600).with_device("fp-1"), &[device_rule(500)], &h.deps(Utc::now()))
            .await
            .unwrap();

        assert_eq!(factors.len(), 1);
    }

    #[tokio::test]
    async fn test_small_amount_skips_lookup() {
        let h = Harness::new();
        h.storage.fail_on(StorageOp::HistoryRead);

        let factors = DeviceEvaluator
            .evaluate(&ctx(100).with_device("fp-new"), &[device_rule(500)], &h.deps(Utc::now()))
            .await
            .unwrap();

        assert!(factors.is_empty());
    }

    #[tokio::test]
    async fn test_no_fingerprint() {
        let h = Harness::new();

        let factors = DeviceEvaluator
            .evaluate(&ctx(10_000), &[device_rule(500)], &h.deps(Utc::now()))
            .await
            .unwrap();

        assert!(factors.is_empty());
    }
}
