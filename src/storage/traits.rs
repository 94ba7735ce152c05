// src/storage/traits.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::domain::{AlertRecord, PaymentIntentRecord, PeriodType, Rule, UserId, VelocityBucket};
use crate::geo::GeoPoint;

/// Recent locations for a user, newest first. The look-back is small and bounded.
pub type GeoPoints = SmallVec<[GeoPoint; 8]>;

/// Aggregate of stored transaction history since some instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub transaction_count: u64,
    pub total_amount: Decimal,
    pub unique_origins: u64,
}

/// Read-only access to fraud rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active, validated rules ordered by priority ascending.
    async fn list_active_rules(&self) -> anyhow::Result<Vec<Rule>>;
}

/// Transaction history, velocity counters and audit persistence.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    // Velocity counters
    async fn get_velocity_bucket(
        &self,
        user_id: &UserId,
        period: PeriodType,
        period_start: DateTime<Utc>,
    ) -> anyhow::Result<Option<VelocityBucket>>;

    /// Create-or-increment as a single atomic operation.
    ///
    /// `origin` is counted toward `unique_origins` the first time it is
    /// seen in the bucket.
    async fn upsert_velocity_increment(
        &self,
        user_id: &UserId,
        period: PeriodType,
        period_start: DateTime<Utc>,
        amount: Decimal,
        origin: Option<&str>,
    ) -> anyhow::Result<()>;

    // History scans
    async fn summarize_history(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HistorySummary>;
    async fn count_failed_transactions(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u32>;
    async fn count_successful_by_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
    ) -> anyhow::Result<u32>;
    async fn list_recent_geo_points(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<GeoPoints>;

    // Audit trail
    async fn insert_payment_intent(&self, record: &PaymentIntentRecord) -> anyhow::Result<Uuid>;
    async fn insert_alert(&self, alert: &AlertRecord) -> anyhow::Result<()>;
}
