use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::UserId;

/// Velocity window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hour,
    Day,
    Week,
    Month,
}

impl PeriodType {
    /// Periods maintained as running counters. Longer periods are
    /// summarized from stored transaction history on read.
    pub const COUNTED: [PeriodType; 2] = [PeriodType::Hour, PeriodType::Day];

    /// Returns true if buckets of this period are incremented after evaluation.
    #[inline]
    pub fn is_counted(&self) -> bool {
        matches!(self, PeriodType::Hour | PeriodType::Day)
    }

    /// Floor an instant to the start of its bucket (UTC).
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let midnight = date.and_time(NaiveTime::MIN).and_utc();

        match self {
            PeriodType::Hour => midnight + Duration::hours(at.hour() as i64),
            PeriodType::Day => midnight,
            PeriodType::Week => {
                midnight - Duration::days(at.weekday().num_days_from_monday() as i64)
            }
            PeriodType::Month => date
                .with_day(1)
                .unwrap_or(date)
                .and_time(NaiveTime::MIN)
                .and_utc(),
        }
    }

    /// Nominal length of the period, used for rolling look-backs.
    pub fn duration(&self) -> Duration {
        match self {
            PeriodType::Hour => Duration::hours(1),
            PeriodType::Day => Duration::days(1),
            PeriodType::Week => Duration::days(7),
            PeriodType::Month => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hour => "hour",
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hour" => Some(PeriodType::Hour),
            "day" => Some(PeriodType::Day),
            "week" => Some(PeriodType::Week),
            "month" => Some(PeriodType::Month),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling per-user counters for one period bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityBucket {
    pub user_id: UserId,
    pub period_type: PeriodType,
    /// Always floored to the bucket boundary
    pub period_start: DateTime<Utc>,
    pub transaction_count: u64,
    pub total_amount: Decimal,
    pub unique_origins: u64,
}

impl VelocityBucket {
    /// Create an empty bucket for the period containing `at`.
    pub fn empty(user_id: UserId, period_type: PeriodType, at: DateTime<Utc>) -> Self {
        VelocityBucket {
            user_id,
            period_type,
            period_start: period_type.bucket_start(at),
            transaction_count: 0,
            total_amount: Decimal::ZERO,
            unique_origins: 0,
        }
    }
}
