use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

use super::velocity::PeriodType;
use super::Action;

/// Rule type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Transaction count / amount per period
    Velocity,
    /// Single transaction amount threshold
    Amount,
    /// Recent failed attempts
    Failure,
    /// Impossible travel between transaction locations
    Geolocation,
    /// Large amount from a never-seen device
    Device,
    /// Transaction during a configured hour window
    Time,
}

impl RuleType {
    pub const ALL: [RuleType; 6] = [
        RuleType::Velocity,
        RuleType::Amount,
        RuleType::Failure,
        RuleType::Geolocation,
        RuleType::Device,
        RuleType::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Velocity => "velocity",
            RuleType::Amount => "amount",
            RuleType::Failure => "failure",
            RuleType::Geolocation => "geolocation",
            RuleType::Device => "device",
            RuleType::Time => "time",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "velocity" => Some(RuleType::Velocity),
            "amount" => Some(RuleType::Amount),
            "failure" => Some(RuleType::Failure),
            "geolocation" => Some(RuleType::Geolocation),
            "device" => Some(RuleType::Device),
            "time" => Some(RuleType::Time),
            _ => None,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule severity, which scales every base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn multiplier(&self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 1.0,
            Severity::High => 1.5,
            Severity::Critical => 2.0,
        }
    }

    /// Scale a base score, rounding half away from zero.
    pub fn scale(&self, base: f64) -> u32 {
        let scaled = (base * self.multiplier()).round();
        if scaled.is_finite() && scaled > 0.0 {
            scaled.min(u32::MAX as f64) as u32
        } else {
            0
        }
    }

    /// High and critical factors raise alerts.
    #[inline]
    pub fn raises_alert(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert classification, set explicitly when the rule is authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Velocity,
    LargeAmount,
    RepeatedFailures,
    GeoAnomaly,
    NewDevice,
    UnusualTime,
}

impl AlertType {
    /// Alert type used when a rule does not declare one.
    pub fn default_for(rule_type: RuleType) -> Self {
        match rule_type {
            RuleType::Velocity => AlertType::Velocity,
            RuleType::Amount => AlertType::LargeAmount,
            RuleType::Failure => AlertType::RepeatedFailures,
            RuleType::Geolocation => AlertType::GeoAnomaly,
            RuleType::Device => AlertType::NewDevice,
            RuleType::Time => AlertType::UnusualTime,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Velocity => "velocity",
            AlertType::LargeAmount => "large_amount",
            AlertType::RepeatedFailures => "repeated_failures",
            AlertType::GeoAnomaly => "geo_anomaly",
            AlertType::NewDevice => "new_device",
            AlertType::UnusualTime => "unusual_time",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "velocity" => Some(AlertType::Velocity),
            "large_amount" => Some(AlertType::LargeAmount),
            "repeated_failures" => Some(AlertType::RepeatedFailures),
            "geo_anomaly" => Some(AlertType::GeoAnomaly),
            "new_device" => Some(AlertType::NewDevice),
            "unusual_time" => Some(AlertType::UnusualTime),
            _ => None,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityCondition {
    pub period: PeriodType,
    #[serde(default)]
    pub max_transactions: Option<u64>,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountCondition {
    pub threshold: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCondition {
    pub period: PeriodType,
    pub max_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationCondition {
    pub max_distance_km: f64,
    pub period_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCondition {
    pub new_device_threshold: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCondition {
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f64,
}

fn default_threshold_multiplier() -> f64 {
    1.0
}

impl TimeCondition {
    /// Whether `hour` falls in `[start_hour, end_hour)`, wrapping past
    /// midnight when the start is after the end.
    pub fn contains_hour(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Typed rule condition, one variant per rule type.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    Velocity(VelocityCondition),
    Amount(AmountCondition),
    Failure(FailureCondition),
    Geolocation(GeolocationCondition),
    Device(DeviceCondition),
    Time(TimeCondition),
}

impl RuleCondition {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleCondition::Velocity(_) => RuleType::Velocity,
            RuleCondition::Amount(_) => RuleType::Amount,
            RuleCondition::Failure(_) => RuleType::Failure,
            RuleCondition::Geolocation(_) => RuleType::Geolocation,
            RuleCondition::Device(_) => RuleType::Device,
            RuleCondition::Time(_) => RuleType::Time,
        }
    }

    /// Parse the loose parameter bag for the given rule type.
    fn parse(rule_type: RuleType, bag: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let bag = bag.clone();
        Ok(match rule_type {
            RuleType::Velocity => RuleCondition::Velocity(serde_json::from_value(bag)?),
            RuleType::Amount => RuleCondition::Amount(serde_json::from_value(bag)?),
            RuleType::Failure => RuleCondition::Failure(serde_json::from_value(bag)?),
            RuleType::Geolocation => RuleCondition::Geolocation(serde_json::from_value(bag)?),
            RuleType::Device => RuleCondition::Device(serde_json::from_value(bag)?),
            RuleType::Time => RuleCondition::Time(serde_json::from_value(bag)?),
        })
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            RuleCondition::Velocity(c) => {
                if c.max_transactions.is_none() && c.max_amount.is_none() {
                    return Err("velocity rule needs maxTransactions or maxAmount".to_string());
                }
                if c.max_amount.is_some_and(|a| a.is_sign_negative()) {
                    return Err("maxAmount must not be negative".to_string());
                }
            }
            RuleCondition::Amount(c) => {
                if c.threshold.is_sign_negative() {
                    return Err("threshold must not be negative".to_string());
                }
            }
            RuleCondition::Failure(_) => {}
            RuleCondition::Geolocation(c) => {
                if !c.max_distance_km.is_finite() || c.max_distance_km < 0.0 {
                    return Err("maxDistanceKm must be a non-negative number".to_string());
                }
                if c.period_minutes == 0 {
                    return Err("periodMinutes must be positive".to_string());
                }
            }
            RuleCondition::Device(c) => {
                if c.new_device_threshold.is_sign_negative() {
                    return Err("newDeviceThreshold must not be negative".to_string());
                }
            }
            RuleCondition::Time(c) => {
                if c.start_hour > 23 || c.end_hour > 24 {
                    return Err(format!(
                        "hour window {}..{} out of range",
                        c.start_hour, c.end_hour
                    ));
                }
                if !c.threshold_multiplier.is_finite() || c.threshold_multiplier < 0.0 {
                    return Err("thresholdMultiplier must be a non-negative number".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Errors found while compiling a stored rule definition.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule {rule_id}: unknown rule type '{value}'")]
    UnknownType { rule_id: String, value: String },

    #[error("rule {rule_id}: unknown action '{value}'")]
    UnknownAction { rule_id: String, value: String },

    #[error("rule {rule_id}: unknown severity '{value}'")]
    UnknownSeverity { rule_id: String, value: String },

    #[error("rule {rule_id}: unknown alert type '{value}'")]
    UnknownAlertType { rule_id: String, value: String },

    #[error("rule {rule_id}: malformed condition: {source}")]
    MalformedCondition {
        rule_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule {rule_id}: invalid condition: {reason}")]
    InvalidCondition { rule_id: String, reason: String },
}

fn default_active() -> bool {
    true
}

/// Rule as stored: the condition is an untyped parameter bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub rule_type: String,

    #[serde(default)]
    pub condition: serde_json::Value,

    pub action: String,

    pub severity: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_active", alias = "active")]
    pub is_active: bool,

    #[serde(default)]
    pub alert_type: Option<String>,
}

impl RuleDef {
    /// Type-check the definition into an evaluable rule.
    pub fn compile(&self) -> Result<Rule, RuleError> {
        let rule_type = RuleType::from_str(&self.rule_type).ok_or_else(|| RuleError::UnknownType {
            rule_id: self.id.clone(),
            value: self.rule_type.clone(),
        })?;

        let mut action = Action::from_str(&self.action).ok_or_else(|| RuleError::UnknownAction {
            rule_id: self.id.clone(),
            value: self.action.clone(),
        })?;

        let severity =
            Severity::from_str(&self.severity).ok_or_else(|| RuleError::UnknownSeverity {
                rule_id: self.id.clone(),
                value: self.severity.clone(),
            })?;

        let alert_type = match &self.alert_type {
            Some(s) => AlertType::from_str(s).ok_or_else(|| RuleError::UnknownAlertType {
                rule_id: self.id.clone(),
                value: s.clone(),
            })?,
            None => AlertType::default_for(rule_type),
        };

        let condition = RuleCondition::parse(rule_type, &self.condition).map_err(|source| {
            RuleError::MalformedCondition {
                rule_id: self.id.clone(),
                source,
            }
        })?;

        condition
            .validate()
            .map_err(|reason| RuleError::InvalidCondition {
                rule_id: self.id.clone(),
                reason,
            })?;

        // A new device alone is never grounds for a hard block
        if rule_type == RuleType::Device && action == Action::Block {
            warn!(rule_id = %self.id, "Device rule declares block, downgrading to challenge");
            action = Action::Challenge;
        }

        Ok(Rule {
            id: self.id.clone(),
            name: self.name.clone(),
            condition,
            action,
            severity,
            priority: self.priority,
            alert_type,
        })
    }
}

/// A validated, active rule ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub condition: RuleCondition,
    pub action: Action,
    pub severity: Severity,
    pub priority: i32,
    pub alert_type: AlertType,
}

impl Rule {
    #[inline]
    pub fn rule_type(&self) -> RuleType {
        self.condition.rule_type()
    }

    /// Base score scaled by this rule's severity.
    #[inline]
    pub fn score(&self, base: f64) -> u32 {
        self.severity.scale(base)
    }
}

/// Compile stored definitions into active rules ordered by priority.
///
/// Inactive definitions are dropped; definitions that fail to compile are
/// skipped with a warning so one bad rule never blocks the rest.
pub fn compile_active<'a>(defs: impl IntoIterator<Item = &'a RuleDef>) -> Vec<Rule> {
    let mut rules: Vec<Rule> = defs
        .into_iter()
        .filter(|def| def.is_active)
        .filter_map(|def| match def.compile() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(rule_id = %def.id, error = %e, "Skipping malformed rule");
                None
            }
        })
        .collect();

    rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(id: &str, rule_type: &str, condition: serde_json::Value, action: &str) -> RuleDef {
        RuleDef {
            id: id.to_string(),
            name: format!("{}_name", id),
            rule_type: rule_type.to_string(),
            condition,
            action: action.to_string(),
            severity: "medium".to_string(),
            priority: 0,
            is_active: true,
            alert_type: None,
        }
    }

    #[test]
    fn test_severity_scaling() {
        assert_eq!(Severity::Low.scale(25.0), 13);
        assert_eq!(Severity::Medium.scale(25.0), 25);
        assert_eq!(Severity::High.scale(25.0), 38);
        assert_eq!(Severity::Critical.scale(40.0), 80);
        assert_eq!(Severity::Low.scale(15.0), 8);
    }

    #[test]
    fn test_compile_velocity() {
        let rule = def(
            "R1",
            "velocity",
            json!({"period": "hour", "maxTransactions": 5}),
            "block",
        )
        .compile()
        .unwrap();

        assert_eq!(rule.rule_type(), RuleType::Velocity);
        assert_eq!(rule.action, Action::Block);
        assert_eq!(rule.alert_type, AlertType::Velocity);
        match rule.condition {
            RuleCondition::Velocity(c) => {
                assert_eq!(c.period, PeriodType::Hour);
                assert_eq!(c.max_transactions, Some(5));
                assert_eq!(c.max_amount, None);
            }
            other => panic!("unexpected condition {:?}", other),
        }
    }

    #[test]
    fn test_condition_must_match_type() {
        // An amount bag attached to a geolocation rule is malformed
        let err = def("R2", "geolocation", json!({"threshold": 100}), "review")
            .compile()
            .unwrap_err();
        assert!(matches!(err, RuleError::MalformedCondition { .. }));
    }

    #[test]
    fn test_velocity_requires_a_limit() {
        let err = def("R3", "velocity", json!({"period": "day"}), "review")
            .compile()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidCondition { .. }));
    }

    #[test]
    fn test_unknown_type_and_action() {
        let err = def("R4", "biometric", json!({}), "review").compile().unwrap_err();
        assert!(matches!(err, RuleError::UnknownType { .. }));

        let err = def("R5", "amount", json!({"threshold": 1}), "freeze")
            .compile()
            .unwrap_err();
        assert!(matches!(err, RuleError::UnknownAction { .. }));
    }

    #[test]
    fn test_device_block_downgraded() {
        let rule = def(
            "R6",
            "device",
            json!({"newDeviceThreshold": 10000}),
            "block",
        )
        .compile()
        .unwrap();
        assert_eq!(rule.action, Action::Challenge);
    }

    #[test]
    fn test_explicit_alert_type() {
        let mut d = def("R7", "amount", json!({"threshold": "5000.00"}), "review");
        d.alert_type = Some("velocity".to_string());
        assert_eq!(d.compile().unwrap().alert_type, AlertType::Velocity);
    }

    #[test]
    fn test_time_window_wraps_midnight() {
        let c = TimeCondition {
            start_hour: 22,
            end_hour: 6,
            threshold_multiplier: 1.0,
        };
        assert!(c.contains_hour(23));
        assert!(c.contains_hour(0));
        assert!(c.contains_hour(5));
        assert!(!c.contains_hour(6));
        assert!(!c.contains_hour(12));

        let c = TimeCondition {
            start_hour: 1,
            end_hour: 5,
            threshold_multiplier: 1.0,
        };
        assert!(c.contains_hour(1));
        assert!(!c.contains_hour(5));
    }

    #[test]
    fn test_compile_active_filters_and_orders() {
        let mut inactive = def("A", "amount", json!({"threshold": 1}), "review");
        inactive.is_active = false;
        let mut late = def("B", "amount", json!({"threshold": 1}), "review");
        late.priority = 20;
        let mut early = def("C", "amount", json!({"threshold": 1}), "review");
        early.priority = 10;
        let broken = def("D", "amount", json!({"limit": 1}), "review");

        let rules = compile_active(&[inactive, late, early, broken]);
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
    }

    #[test]
    fn test_rule_def_yaml() {
        let yaml = r#"
id: R1_HOURLY
name: hourly_velocity
type: velocity
condition:
  period: hour
  maxTransactions: 5
  maxAmount: 10000
action: block
severity: high
priority: 1
active: true
"#;
        let d: RuleDef = serde_yaml::from_str(yaml).unwrap();
        assert!(d.is_active);
        let rule = d.compile().unwrap();
        assert_eq!(rule.severity, Severity::High);
    }
}
