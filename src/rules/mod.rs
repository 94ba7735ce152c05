pub mod inline;
pub mod streaming;
pub mod traits;

pub use inline::{AmountEvaluator, TimeOfDayEvaluator};
pub use streaming::{DeviceEvaluator, FailureEvaluator, GeolocationEvaluator, VelocityEvaluator};
pub use traits::{EvalDeps, RuleEvaluator};

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Rule, RuleType};

/// Active rules grouped by type, each group in priority order.
#[derive(Debug, Default)]
pub struct RuleBook {
    by_type: HashMap<RuleType, Vec<Rule>>,
    total: usize,
}

impl RuleBook {
    /// Group rules by type. Input order (priority ascending) is preserved
    /// within each group.
    pub fn new(rules: Vec<Rule>) -> Self {
        let total = rules.len();
        let mut by_type: HashMap<RuleType, Vec<Rule>> = HashMap::new();

        for rule in rules {
            by_type.entry(rule.rule_type()).or_default().push(rule);
        }

        RuleBook { by_type, total }
    }

    /// Rules of one type.
    pub fn rules_for(&self, rule_type: RuleType) -> &[Rule] {
        self.by_type
            .get(&rule_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// One evaluator per rule type.
pub fn default_evaluators() -> Vec<Arc<dyn RuleEvaluator>> {
    vec![
        Arc::new(VelocityEvaluator),
        Arc::new(AmountEvaluator),
        Arc::new(FailureEvaluator),
        Arc::new(GeolocationEvaluator),
        Arc::new(DeviceEvaluator),
        Arc::new(TimeOfDayEvaluator),
    ]
}
