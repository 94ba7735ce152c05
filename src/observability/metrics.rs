use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::Action;

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total evaluations that produced a decision
    pub evaluations_total: AtomicU64,

    /// Decisions by action
    pub actions_allow: AtomicU64,
    pub actions_challenge: AtomicU64,
    pub actions_review: AtomicU64,
    pub actions_block: AtomicU64,

    /// Evaluations that failed before a decision was made
    pub evaluation_errors: AtomicU64,

    /// Evaluation latency buckets
    pub latency_under_5ms: AtomicU64,
    pub latency_5_25ms: AtomicU64,
    pub latency_25_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,

    /// Rules evaluated and factors produced
    pub rules_evaluated_total: AtomicU64,
    pub factors_total: AtomicU64,

    /// Collaborator failures
    pub signal_failures_total: AtomicU64,
    pub rule_store_failures_total: AtomicU64,
    pub persistence_failures_total: AtomicU64,
    pub alerts_written_total: AtomicU64,

    /// Rule file reloads
    pub rule_reloads_total: AtomicU64,
    pub rule_reload_errors: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a decided action.
    pub fn record_action(&self, action: Action) {
        self.evaluations_total.fetch_add(1, Ordering::Relaxed);

        let counter = match action {
            Action::Allow => &self.actions_allow,
            Action::Challenge => &self.actions_challenge,
            Action::Review => &self.actions_review,
            Action::Block => &self.actions_block,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_error(&self) {
        self.evaluation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record evaluation latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        let bucket = if micros < 5_000 {
            &self.latency_under_5ms
        } else if micros < 25_000 {
            &self.latency_5_25ms
        } else if micros < 50_000 {
            &self.latency_25_50ms
        } else if micros < 100_000 {
            &self.latency_50_100ms
        } else {
            &self.latency_over_100ms
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one evaluation pass over `rules` rules producing `factors` factors.
    pub fn record_rules(&self, rules: usize, factors: usize) {
        self.rules_evaluated_total
            .fetch_add(rules as u64, Ordering::Relaxed);
        self.factors_total.fetch_add(factors as u64, Ordering::Relaxed);
    }

    pub fn record_signal_failure(&self) {
        self.signal_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rule_store_failure(&self) {
        self.rule_store_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alerts_written(&self, count: usize) {
        self.alerts_written_total
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a rule file reload.
    pub fn record_rule_reload(&self, success: bool) {
        self.rule_reloads_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.rule_reload_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        // Latency buckets are cumulative in the exposition format
        let l5 = load(&self.latency_under_5ms);
        let l25 = l5 + load(&self.latency_5_25ms);
        let l50 = l25 + load(&self.latency_25_50ms);
        let l100 = l50 + load(&self.latency_50_100ms);
        let linf = l100 + load(&self.latency_over_100ms);

        format!(
            r#"# HELP txrisk_evaluations_total Total number of completed evaluations
# TYPE txrisk_evaluations_total counter
txrisk_evaluations_total {}

# HELP txrisk_decisions Decisions by action
# TYPE txrisk_decisions counter
txrisk_decisions{{action="allow"}} {}
txrisk_decisions{{action="challenge"}} {}
txrisk_decisions{{action="review"}} {}
txrisk_decisions{{action="block"}} {}

# HELP txrisk_evaluation_errors_total Evaluations that returned an error
# TYPE txrisk_evaluation_errors_total counter
txrisk_evaluation_errors_total {}

# HELP txrisk_evaluation_latency_seconds_bucket Evaluation latency histogram
# TYPE txrisk_evaluation_latency_seconds_bucket counter
txrisk_evaluation_latency_seconds_bucket{{le="0.005"}} {}
txrisk_evaluation_latency_seconds_bucket{{le="0.025"}} {}
txrisk_evaluation_latency_seconds_bucket{{le="0.05"}} {}
txrisk_evaluation_latency_seconds_bucket{{le="0.1"}} {}
txrisk_evaluation_latency_seconds_bucket{{le="+Inf"}} {}

# HELP txrisk_rules_evaluated_total Total rule evaluations
# TYPE txrisk_rules_evaluated_total counter
txrisk_rules_evaluated_total {}

# HELP txrisk_risk_factors_total Total risk factors produced
# TYPE txrisk_risk_factors_total counter
txrisk_risk_factors_total {}

# HELP txrisk_signal_failures_total Evaluator collaborator failures
# TYPE txrisk_signal_failures_total counter
txrisk_signal_failures_total {}

# HELP txrisk_rule_store_failures_total Rule store read failures
# TYPE txrisk_rule_store_failures_total counter
txrisk_rule_store_failures_total {}

# HELP txrisk_persistence_failures_total Failed intent, alert or velocity writes
# TYPE txrisk_persistence_failures_total counter
txrisk_persistence_failures_total {}

# HELP txrisk_alerts_written_total Fraud alerts persisted
# TYPE txrisk_alerts_written_total counter
txrisk_alerts_written_total {}

# HELP txrisk_rule_reloads_total Rule file reload operations
# TYPE txrisk_rule_reloads_total counter
txrisk_rule_reloads_total {}

# HELP txrisk_rule_reload_errors_total Rule file reload errors
# TYPE txrisk_rule_reload_errors_total counter
txrisk_rule_reload_errors_total {}
"#,
            load(&self.evaluations_total),
            load(&self.actions_allow),
            load(&self.actions_challenge),
            load(&self.actions_review),
            load(&self.actions_block),
            load(&self.evaluation_errors),
            l5,
            l25,
            l50,
            l100,
            linf,
            load(&self.rules_evaluated_total),
            load(&self.factors_total),
            load(&self.signal_failures_total),
            load(&self.rule_store_failures_total),
            load(&self.persistence_failures_total),
            load(&self.alerts_written_total),
            load(&self.rule_reloads_total),
            load(&self.rule_reload_errors),
        )
    }
}

/// Records elapsed time into the latency buckets when dropped.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
