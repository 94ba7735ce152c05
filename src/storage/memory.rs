// src/storage/memory.rs
use ahash::{AHashMap, AHashSet, AHasher};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::domain::rule::compile_active;
use crate::domain::{
    AlertRecord, IntentStatus, PaymentIntentRecord, PeriodType, Rule, RuleDef, UserId,
    VelocityBucket,
};

use super::traits::{GeoPoints, HistorySummary, RuleStore, TransactionStore};

/// Number of user shards.
/// Must be a power of 2 for fast modulo via bitwise AND.
const NUM_SHARDS: usize = 16;

/// Days of history kept per user, relative to the user's newest intent.
/// Covers the longest window any rule reads, a calendar month.
pub const HISTORY_RETENTION_DAYS: i64 = 31;

/// Operations that can be made to fail, for exercising degraded paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    ListRules,
    VelocityRead,
    VelocityWrite,
    HistoryRead,
    InsertIntent,
    InsertAlert,
}

#[derive(Debug, Default)]
struct BucketState {
    transaction_count: u64,
    total_amount: Decimal,
    origins: AHashSet<String>,
}

/// Everything stored for one user.
#[derive(Debug, Default)]
struct UserState {
    buckets: AHashMap<(PeriodType, DateTime<Utc>), BucketState>,
    /// Oldest first
    intents: Vec<PaymentIntentRecord>,
    alerts: Vec<AlertRecord>,
}

impl UserState {
    fn intents_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl DoubleEndedIterator<Item = &PaymentIntentRecord> {
        self.intents.iter().filter(move |r| r.created_at >= since)
    }

    fn push_intent(&mut self, record: PaymentIntentRecord) {
        let at = self
            .intents
            .partition_point(|r| r.created_at <= record.created_at);
        self.intents.insert(at, record);

        if let Some(newest) = self.intents.last().map(|r| r.created_at) {
            let cutoff = newest - Duration::days(HISTORY_RETENTION_DAYS);
            self.intents.retain(|r| r.created_at >= cutoff);
            self.alerts.retain(|a| a.created_at >= cutoff);
        }
    }
}

type Shard = AHashMap<String, UserState>;

/// In-process storage backend.
///
/// State is sharded by user: all reads and writes for one user go through a
/// single shard lock while other users proceed. Velocity buckets from past
/// periods and history beyond [`HISTORY_RETENTION_DAYS`] are dropped as new data
/// arrives.
#[derive(Debug)]
pub struct MemoryStorage {
    shards: Vec<RwLock<Shard>>,
    rules: Mutex<Vec<RuleDef>>,
    failing: Mutex<HashSet<StorageOp>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        MemoryStorage {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(Shard::default())).collect(),
            rules: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored rule definitions.
    pub fn set_rules(&self, defs: Vec<RuleDef>) {
        *self.rules.lock() = defs;
    }

    /// Add a rule definition.
    pub fn add_rule(&self, def: RuleDef) {
        self.rules.lock().push(def);
    }

    /// Insert a historical intent directly (e.g. a settled payment).
    pub fn seed_intent(&self, record: PaymentIntentRecord) {
        self.shard(&record.user_id)
            .write()
            .entry(record.user_id.as_str().to_string())
            .or_default()
            .push_intent(record);
    }

    /// Make an operation fail.
    pub fn fail_on(&self, op: StorageOp) {
        self.failing.lock().insert(op);
    }

    #[cfg(test)]
    pub(crate) fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Get recorded intents, oldest first (for assertions).
    pub fn recorded_intents(&self) -> Vec<PaymentIntentRecord> {
        let mut intents: Vec<PaymentIntentRecord> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .values()
                    .flat_map(|user| user.intents.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        intents.sort_by_key(|r| r.created_at);
        intents
    }

    /// Get recorded alerts, oldest first (for assertions).
    pub fn recorded_alerts(&self) -> Vec<AlertRecord> {
        let mut alerts: Vec<AlertRecord> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .values()
                    .flat_map(|user| user.alerts.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    fn check(&self, op: StorageOp) -> anyhow::Result<()> {
        if self.failing.lock().contains(&op) {
            anyhow::bail!("storage operation {:?} unavailable", op);
        }
        Ok(())
    }

    #[inline]
    fn shard(&self, user_id: &UserId) -> &RwLock<Shard> {
        let mut hasher = AHasher::default();
        user_id.as_str().hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & (NUM_SHARDS - 1)]
    }

    /// Run `f` against a user's state under the shard read lock.
    fn read_user<T>(&self, user_id: &UserId, f: impl FnOnce(&UserState) -> T) -> Option<T> {
        self.shard(user_id).read().get(user_id.as_str()).map(f)
    }
}

#[async_trait]
impl RuleStore for MemoryStorage {
    async fn list_active_rules(&self) -> anyhow::Result<Vec<Rule>> {
        self.check(StorageOp::ListRules)?;
        Ok(compile_active(self.rules.lock().iter()))
    }
}

#[async_trait]
impl TransactionStore for MemoryStorage {
    async fn get_velocity_bucket(
        &self,
        user_id: &UserId,
        period: PeriodType,
        period_start: DateTime<Utc>,
    ) -> anyhow::Result<Option<VelocityBucket>> {
        self.check(StorageOp::VelocityRead)?;

        Ok(self
            .read_user(user_id, |user| {
                user.buckets
                    .get(&(period, period_start))
                    .map(|state| VelocityBucket {
                        user_id: user_id.clone(),
                        period_type: period,
                        period_start,
                        transaction_count: state.transaction_count,
                        total_amount: state.total_amount,
                        unique_origins: state.origins.len() as u64,
                    })
            })
            .flatten())
    }

    async fn upsert_velocity_increment(
        &self,
        user_id: &UserId,
        period: PeriodType,
        period_start: DateTime<Utc>,
        amount: Decimal,
        origin: Option<&str>,
    ) -> anyhow::Result<()> {
        self.check(StorageOp::VelocityWrite)?;

        // Create-or-increment happens entirely under the shard write lock
        let mut shard = self.shard(user_id).write();
        let user = shard.entry(user_id.as_str().to_string()).or_default();

        user.buckets
            .retain(|(p, start), _| *p != period || *start >= period_start);

        let state = user.buckets.entry((period, period_start)).or_default();
        let total = state.total_amount.checked_add(amount).ok_or_else(|| {
            anyhow::anyhow!(
                "velocity total overflow for user {} in {} bucket",
                user_id,
                period
            )
        })?;

        state.transaction_count += 1;
        state.total_amount = total;
        if let Some(origin) = origin {
            state.origins.insert(origin.to_string());
        }

        Ok(())
    }

    async fn summarize_history(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HistorySummary> {
        self.check(StorageOp::HistoryRead)?;

        self.read_user(user_id, |user| {
            let mut summary = HistorySummary::default();
            let mut origins = AHashSet::new();

            for record in user.intents_since(since) {
                summary.transaction_count += 1;
                summary.total_amount = summary
                    .total_amount
                    .checked_add(record.amount)
                    .ok_or_else(|| anyhow::anyhow!("history total overflow for user {}", user_id))?;
                if let Some(origin) = record
                    .ip_address
                    .as_deref()
                    .or(record.device_fingerprint.as_deref())
                {
                    origins.insert(origin);
                }
            }
            summary.unique_origins = origins.len() as u64;

            Ok(summary)
        })
        .unwrap_or_else(|| Ok(HistorySummary::default()))
    }

    async fn count_failed_transactions(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u32> {
        self.check(StorageOp::HistoryRead)?;

        Ok(self
            .read_user(user_id, |user| {
                user.intents_since(since)
                    .filter(|r| r.status == IntentStatus::Failed)
                    .count() as u32
            })
            .unwrap_or(0))
    }

    async fn count_successful_by_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
    ) -> anyhow::Result<u32> {
        self.check(StorageOp::HistoryRead)?;

        Ok(self
            .read_user(user_id, |user| {
                user.intents
                    .iter()
                    .filter(|r| {
                        r.status == IntentStatus::Succeeded
                            && r.device_fingerprint.as_deref() == Some(fingerprint)
                    })
                    .count() as u32
            })
            .unwrap_or(0))
    }

    async fn list_recent_geo_points(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<GeoPoints> {
        self.check(StorageOp::HistoryRead)?;

        Ok(self
            .read_user(user_id, |user| {
                // Intents are kept oldest first
                user.intents_since(since)
                    .rev()
                    .filter_map(|r| r.geolocation.as_ref().filter(|g| g.is_valid()))
                    .take(limit)
                    .map(|g| g.point())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_payment_intent(&self, record: &PaymentIntentRecord) -> anyhow::Result<Uuid> {
        self.check(StorageOp::InsertIntent)?;
        self.seed_intent(record.clone());
        Ok(record.id)
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> anyhow::Result<()> {
        self.check(StorageOp::InsertAlert)?;
        self.shard(&alert.user_id)
            .write()
            .entry(alert.user_id.as_str().to_string())
            .or_default()
            .alerts
            .push(alert.clone());
        Ok(())
    }
}
