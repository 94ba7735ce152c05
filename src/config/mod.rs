use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::engine::{EngineOptions, SignalFailurePolicy};

/// Risk engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "txrisk")]
#[command(about = "Transaction risk-scoring engine")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "TXRISK_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Path to rules YAML file (used when no database is configured)
    #[arg(long, default_value = "rules.yaml", env = "TXRISK_RULES_PATH")]
    pub rules_path: PathBuf,

    /// Rule file reload check interval in seconds
    #[arg(long, default_value = "30", env = "TXRISK_RULES_RELOAD_SECS")]
    pub rules_reload_secs: u64,

    /// Postgres connection string. When set, rules, history and velocity
    /// counters are stored in Postgres instead of in memory.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Minimum pooled database connections
    #[arg(long, default_value = "1", env = "TXRISK_DB_MIN_CONNECTIONS")]
    pub db_min_connections: u32,

    /// Maximum pooled database connections
    #[arg(long, default_value = "10", env = "TXRISK_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Latency budget in milliseconds for the evaluate endpoint
    #[arg(long, default_value = "100", env = "TXRISK_LATENCY_BUDGET_MS")]
    pub latency_budget_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "TXRISK_LOG_JSON")]
    pub log_json: bool,

    /// Maximum prior locations compared by geolocation rules
    #[arg(long, default_value = "5", env = "TXRISK_GEO_LOOKBACK_LIMIT")]
    pub geo_lookback_limit: usize,

    /// Behaviour when a history or velocity lookup fails
    #[arg(
        long,
        value_enum,
        default_value = "fail_open",
        env = "TXRISK_SIGNAL_FAILURE_POLICY"
    )]
    pub signal_failure_policy: SignalFailurePolicy,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "TXRISK_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "TXRISK_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get rule file reload interval as Duration.
    pub fn rules_reload_interval(&self) -> Duration {
        Duration::from_secs(self.rules_reload_secs)
    }

    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            signal_failure_policy: self.signal_failure_policy,
            geo_lookback: self.geo_lookback_limit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            rules_path: PathBuf::from("rules.yaml"),
            rules_reload_secs: 30,
            database_url: None,
            db_min_connections: 1,
            db_max_connections: 10,
            latency_budget_ms: 100,
            log_level: "info".to_string(),
            log_json: false,
            geo_lookback_limit: 5,
            signal_failure_policy: SignalFailurePolicy::FailOpen,
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}
