pub mod context;
pub mod decision;
pub mod factor;
pub mod record;
pub mod rule;
pub mod velocity;

pub use context::{Geolocation, TransactionContext, UserId};
pub use decision::{Action, FraudStatus};
pub use factor::{EvaluationResult, RiskFactor};
pub use record::{AlertRecord, IntentStatus, PaymentIntentRecord};
pub use rule::{AlertType, Rule, RuleCondition, RuleDef, RuleError, RuleType, Severity};
pub use velocity::{PeriodType, VelocityBucket};
