use serde::{Deserialize, Serialize};

use super::rule::{AlertType, Rule, RuleType, Severity};
use super::{Action, FraudStatus};

/// One rule's positive match against a transaction.
///
/// Carries the originating rule's declared action and alert type so the
/// aggregate decision and alerting depend only on the factor set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub action: Action,
    pub alert_type: AlertType,
    /// Severity-weighted score contributed by this factor
    pub score: u32,
    /// Human-readable explanation of what matched
    pub details: String,
}

impl RiskFactor {
    /// Create a factor for `rule` from an unscaled base score.
    pub fn from_rule(rule: &Rule, base: f64, details: impl Into<String>) -> Self {
        RiskFactor {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type(),
            severity: rule.severity,
            action: rule.action,
            alert_type: rule.alert_type,
            score: rule.score(base),
            details: details.into(),
        }
    }

    #[inline]
    pub fn raises_alert(&self) -> bool {
        self.severity.raises_alert()
    }
}

/// Outcome of scoring one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Clamped to 0..=100
    pub composite_score: u32,
    pub status: FraudStatus,
    pub action: Action,
    pub risk_factors: Vec<RiskFactor>,
}

impl EvaluationResult {
    /// Result for a transaction with no matching rules.
    pub fn clean() -> Self {
        EvaluationResult {
            composite_score: 0,
            status: FraudStatus::Clean,
            action: Action::Allow,
            risk_factors: Vec::new(),
        }
    }

    #[inline]
    pub fn allowed(&self) -> bool {
        self.action.is_allowed()
    }

    /// Factors severe enough to be persisted as alerts.
    pub fn alerting_factors(&self) -> impl Iterator<Item = &RiskFactor> {
        self.risk_factors.iter().filter(|f| f.raises_alert())
    }
}

impl Default for EvaluationResult {
    fn default() -> Self {
        EvaluationResult::clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{AmountCondition, RuleCondition};
    use rust_decimal::Decimal;

    fn amount_rule(severity: Severity) -> Rule {
        Rule {
            id: "R_AMT".to_string(),
            name: "large_amount".to_string(),
            condition: RuleCondition::Amount(AmountCondition {
                threshold: Decimal::new(1000, 0),
            }),
            action: Action::Review,
            severity,
            priority: 0,
            alert_type: AlertType::LargeAmount,
        }
    }

    #[test]
    fn test_factor_from_rule() {
        let factor = RiskFactor::from_rule(&amount_rule(Severity::High), 20.0, "amount 5000 >= 1000");

        assert_eq!(factor.rule_id, "R_AMT");
        assert_eq!(factor.rule_type, RuleType::Amount);
        assert_eq!(factor.action, Action::Review);
        assert_eq!(factor.score, 30);
        assert!(factor.raises_alert());
    }

    #[test]
    fn test_low_severity_no_alert() {
        let factor = RiskFactor::from_rule(&amount_rule(Severity::Low), 20.0, "x");
        assert_eq!(factor.score, 10);
        assert!(!factor.raises_alert());
    }

    #[test]
    fn test_factor_serialization() {
        let factor = RiskFactor::from_rule(&amount_rule(Severity::Medium), 20.0, "x");
        let json = serde_json::to_value(&factor).unwrap();

        assert_eq!(json["ruleName"], "large_amount");
        assert_eq!(json["alertType"], "large_amount");
        assert_eq!(json["score"], 20);
    }

    #[test]
    fn test_clean_result() {
        let result = EvaluationResult::clean();
        assert!(result.allowed());
        assert_eq!(result.alerting_factors().count(), 0);
    }
}
