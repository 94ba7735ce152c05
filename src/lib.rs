pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod geo;
pub mod observability;
pub mod policy;
pub mod rules;
pub mod storage;
pub mod velocity;

pub use config::Config;
pub use domain::{Action, EvaluationResult, FraudStatus, RiskFactor, TransactionContext};
pub use engine::{EngineError, EvaluationOutcome, RiskEngine, SignalFailurePolicy};
pub use geo::{haversine_km, GeoPoint};
pub use rules::RuleEvaluator;
