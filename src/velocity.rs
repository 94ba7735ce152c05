use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{PeriodType, UserId, VelocityBucket};
use crate::storage::TransactionStore;

/// Per-user rolling transaction counters.
///
/// Hour and day buckets are running counters owned by the store and
/// updated through its atomic upsert. Week and month reads are answered by
/// summarizing stored history since the period start.
#[derive(Clone)]
pub struct VelocityTracker {
    store: Arc<dyn TransactionStore>,
}

impl VelocityTracker {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        VelocityTracker { store }
    }

    /// Current bucket for the period containing `now`, if any activity exists.
    pub async fn get(
        &self,
        user_id: &UserId,
        period: PeriodType,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<VelocityBucket>> {
        let period_start = period.bucket_start(now);

        if period.is_counted() {
            return self
                .store
                .get_velocity_bucket(user_id, period, period_start)
                .await;
        }

        let summary = self.store.summarize_history(user_id, period_start).await?;
        if summary.transaction_count == 0 {
            return Ok(None);
        }

        Ok(Some(VelocityBucket {
            user_id: user_id.clone(),
            period_type: period,
            period_start,
            transaction_count: summary.transaction_count,
            total_amount: summary.total_amount,
            unique_origins: summary.unique_origins,
        }))
    }

    /// Count one transaction toward the bucket containing `now`.
    ///
    /// Returns false without touching the store for periods that are not
    /// maintained as counters.
    pub async fn increment(
        &self,
        user_id: &UserId,
        period: PeriodType,
        amount: Decimal,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        if !period.is_counted() {
            debug!(user_id = %user_id, period = %period, "Skipping increment for uncounted period");
            return Ok(false);
        }

        self.store
            .upsert_velocity_increment(user_id, period, period.bucket_start(now), amount, origin)
            .await?;

        Ok(true)
    }

    /// Count one transaction toward every counted period.
    ///
    /// All periods are attempted; the first failure is returned after the
    /// rest have been tried.
    pub async fn increment_counted(
        &self,
        user_id: &UserId,
        amount: Decimal,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut first_err = None;

        for period in PeriodType::COUNTED {
            if let Err(e) = self.increment(user_id, period, amount, origin, now).await {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for VelocityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelocityTracker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvaluationResult, PaymentIntentRecord, TransactionContext};
    use crate::storage::MemoryStorage;
    use chrono::Duration;
    use uuid::Uuid;

    fn tracker() -> (Arc<MemoryStorage>, VelocityTracker) {
        let storage = Arc::new(MemoryStorage::new());
        let tracker = VelocityTracker::new(storage.clone());
        (storage, tracker)
    }

    #[tokio::test]
    async fn test_sequential_increments_monotonic() {
        let (_storage, tracker) = tracker();
        let user = UserId::new("U1");
        let now = Utc::now();

        for expected in 1..=3u64 {
            tracker
                .increment(&user, PeriodType::Hour, Decimal::new(10, 0), Some("1.2.3.4"), now)
                .await
                .unwrap();
            let bucket = tracker.get(&user, PeriodType::Hour, now).await.unwrap().unwrap();
            assert_eq!(bucket.transaction_count, expected);
            assert_eq!(bucket.period_start, PeriodType::Hour.bucket_start(now));
        }
    }

    #[tokio::test]
    async fn test_new_hour_starts_new_bucket() {
        let (_storage, tracker) = tracker();
        let user = UserId::new("U1");
        let now = Utc::now();

        tracker
            .increment(&user, PeriodType::Hour, Decimal::ONE, None, now)
            .await
            .unwrap();

        let next_hour = now + Duration::hours(1);
        assert!(tracker.get(&user, PeriodType::Hour, next_hour).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_counted_touches_hour_and_day() {
        let (_storage, tracker) = tracker();
        let user = UserId::new("U1");
        let now = Utc::now();

        tracker
            .increment_counted(&user, Decimal::new(25, 0), Some("1.2.3.4"), now)
            .await
            .unwrap();

        for period in PeriodType::COUNTED {
            let bucket = tracker.get(&user, period, now).await.unwrap().unwrap();
            assert_eq!(bucket.transaction_count, 1);
            assert_eq!(bucket.total_amount, Decimal::new(25, 0));
            assert_eq!(bucket.unique_origins, 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_increment_counted_loses_nothing() {
        let (_storage, tracker) = tracker();
        let user = UserId::new("U-par");
        let now = Utc::now();
        let tasks = 40;
        let barrier = Arc::new(tokio::sync::Barrier::new(tasks));

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let tracker = tracker.clone();
                let user = user.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    tracker
                        .increment_counted(&user, Decimal::new(5, 0), None, now)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for period in PeriodType::COUNTED {
            let bucket = tracker.get(&user, period, now).await.unwrap().unwrap();
            assert_eq!(bucket.transaction_count, tasks as u64);
            assert_eq!(bucket.total_amount, Decimal::new(5 * tasks as i64, 0));
        }
    }

    #[tokio::test]
    async fn test_week_not_incremented() {
        let (_storage, tracker) = tracker();
        let user = UserId::new("U1");

        let counted = tracker
            .increment(&user, PeriodType::Week, Decimal::ONE, None, Utc::now())
            .await
            .unwrap();
        assert!(!counted);
    }

    #[tokio::test]
    async fn test_month_read_from_history() {
        let (storage, tracker) = tracker();
        let user = UserId::new("U1");
        let now = Utc::now();

        assert!(tracker.get(&user, PeriodType::Month, now).await.unwrap().is_none());

        let ctx = TransactionContext::new(user.clone(), Decimal::new(700, 0), "USD").with_ip("9.9.9.9");
        storage.seed_intent(PaymentIntentRecord::from_evaluation(
            Uuid::new_v4(),
            &ctx,
            &EvaluationResult::clean(),
            now,
        ));

        let bucket = tracker.get(&user, PeriodType::Month, now).await.unwrap().unwrap();
        assert_eq!(bucket.transaction_count, 1);
        assert_eq!(bucket.total_amount, Decimal::new(700, 0));
        assert_eq!(bucket.unique_origins, 1);
    }
}
