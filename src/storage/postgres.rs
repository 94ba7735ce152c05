// src/storage/postgres.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::rule::compile_active;
use crate::domain::{AlertRecord, PaymentIntentRecord, PeriodType, Rule, RuleDef, UserId, VelocityBucket};
use crate::geo::GeoPoint;

use super::traits::{GeoPoints, HistorySummary, RuleStore, TransactionStore};

/// PostgreSQL implementation of the storage traits.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a new PostgresStorage instance with a connection pool.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RuleStore for PostgresStorage {
    async fn list_active_rules(&self) -> anyhow::Result<Vec<Rule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, rule_type, condition, action, severity, priority, is_active, alert_type
            FROM fraud_rules
            WHERE is_active = true
            ORDER BY priority ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let defs: Vec<RuleDef> = rows
            .into_iter()
            .map(|row| RuleDef {
                id: row.get("id"),
                name: row.get("name"),
                rule_type: row.get("rule_type"),
                condition: row.get("condition"),
                action: row.get("action"),
                severity: row.get("severity"),
                priority: row.get("priority"),
                is_active: row.get("is_active"),
                alert_type: row.get("alert_type"),
            })
            .collect();

        Ok(compile_active(&defs))
    }
}

#[async_trait]
impl TransactionStore for PostgresStorage {
    async fn get_velocity_bucket(
        &self,
        user_id: &UserId,
        period: PeriodType,
        period_start: DateTime<Utc>,
    ) -> anyhow::Result<Option<VelocityBucket>> {
        let row = sqlx::query(
            r#"
            SELECT transaction_count, total_amount, unique_origins
            FROM velocity_buckets
            WHERE user_id = $1 AND period_type = $2 AND period_start = $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(period.as_str())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let transaction_count: i64 = row.get("transaction_count");
        let unique_origins: i64 = row.get("unique_origins");

        Ok(Some(VelocityBucket {
            user_id: user_id.clone(),
            period_type: period,
            period_start,
            transaction_count: transaction_count.max(0) as u64,
            total_amount: row.get("total_amount"),
            unique_origins: unique_origins.max(0) as u64,
        }))
    }

    async fn upsert_velocity_increment(
        &self,
        user_id: &UserId,
        period: PeriodType,
        period_start: DateTime<Utc>,
        amount: Decimal,
        origin: Option<&str>,
    ) -> anyhow::Result<()> {
        // One statement: the origin insert and the counter upsert commit together,
        // and ON CONFLICT serializes concurrent increments on the bucket row.
        sqlx::query(
            r#"
            WITH new_origin AS (
                INSERT INTO velocity_bucket_origins (user_id, period_type, period_start, origin_id)
                SELECT $1, $2, $3, $5::text
                WHERE $5::text IS NOT NULL
                ON CONFLICT DO NOTHING
                RETURNING 1
            )
            INSERT INTO velocity_buckets (
                user_id, period_type, period_start,
                transaction_count, total_amount, unique_origins, updated_at
            )
            VALUES ($1, $2, $3, 1, $4, (SELECT COUNT(*) FROM new_origin), now())
            ON CONFLICT (user_id, period_type, period_start)
            DO UPDATE SET
                transaction_count = velocity_buckets.transaction_count + 1,
                total_amount = velocity_buckets.total_amount + EXCLUDED.total_amount,
                unique_origins = velocity_buckets.unique_origins + EXCLUDED.unique_origins,
                updated_at = now()
            "#,
        )
        .bind(user_id.as_str())
        .bind(period.as_str())
        .bind(period_start)
        .bind(amount)
        .bind(origin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn summarize_history(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HistorySummary> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS transaction_count,
                COALESCE(SUM(amount), 0) AS total_amount,
                COUNT(DISTINCT COALESCE(ip_address, device_fingerprint)) AS unique_origins
            FROM payment_intents
            WHERE user_id = $1 AND created_at >= $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let transaction_count: i64 = row.get("transaction_count");
        let unique_origins: i64 = row.get("unique_origins");

        Ok(HistorySummary {
            transaction_count: transaction_count.max(0) as u64,
            total_amount: row.get("total_amount"),
            unique_origins: unique_origins.max(0) as u64,
        })
    }

    async fn count_failed_transactions(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM payment_intents
            WHERE user_id = $1
              AND status = 'failed'
              AND created_at >= $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    async fn count_successful_by_device(
        &self,
        user_id: &UserId,
        fingerprint: &str,
    ) -> anyhow::Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM payment_intents
            WHERE user_id = $1
              AND status = 'succeeded'
              AND device_fingerprint = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    async fn list_recent_geo_points(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<GeoPoints> {
        let rows = sqlx::query(
            r#"
            SELECT geo_lat, geo_lon
            FROM payment_intents
            WHERE user_id = $1
              AND created_at >= $2
              AND geo_lat BETWEEN -90 AND 90
              AND geo_lon BETWEEN -180 AND 180
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| GeoPoint::new(row.get("geo_lat"), row.get("geo_lon")))
            .collect())
    }

    async fn insert_payment_intent(&self, record: &PaymentIntentRecord) -> anyhow::Result<Uuid> {
        let risk_factors = serde_json::to_value(&record.risk_factors)?;
        let geo = record.geolocation.as_ref();

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO payment_intents (
                id, user_id, amount, currency, status,
                fraud_score, fraud_status, fraud_action, risk_factors,
                ip_address, device_fingerprint,
                geo_lat, geo_lon, geo_country, geo_city,
                service_request_id, partner_id, description, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING id
            "#,
        )
        .bind(record.id)
        .bind(record.user_id.as_str())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(record.fraud_score as i32)
        .bind(record.fraud_status.as_str())
        .bind(record.action.as_str())
        .bind(risk_factors)
        .bind(&record.ip_address)
        .bind(&record.device_fingerprint)
        .bind(geo.map(|g| g.lat))
        .bind(geo.map(|g| g.lon))
        .bind(geo.and_then(|g| g.country.clone()))
        .bind(geo.and_then(|g| g.city.clone()))
        .bind(&record.service_request_id)
        .bind(&record.partner_id)
        .bind(&record.description)
        .bind(&record.metadata)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fraud_alerts (
                id, payment_intent_id, user_id, alert_type, rule_id, rule_name,
                severity, score, action_taken, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(alert.id)
        .bind(alert.payment_intent_id)
        .bind(alert.user_id.as_str())
        .bind(alert.alert_type.as_str())
        .bind(&alert.rule_id)
        .bind(&alert.rule_name)
        .bind(alert.severity.as_str())
        .bind(alert.score as i32)
        .bind(alert.action_taken.as_str())
        .bind(&alert.details)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
