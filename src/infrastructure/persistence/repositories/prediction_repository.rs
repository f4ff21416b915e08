use crate::domain::ml::prediction::{PredictionRecord, ValueKind, record_time};
use crate::domain::ports::PredictionSink;
use crate::domain::repositories::PredictionRepository;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqlitePredictionRepository {
    pool: SqlitePool,
}

impl SqlitePredictionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<PredictionRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let time: i64 = row.try_get("time")?;
            let kind: String = row.try_get("value_kind")?;
            let horizon: i64 = row.try_get("target_hours")?;
            records.push(PredictionRecord {
                time: DateTime::from_timestamp(time, 0)
                    .ok_or_else(|| anyhow!("Invalid prediction time {}", time))?,
                model_name: row.try_get("model_name")?,
                horizon: u32::try_from(horizon)?,
                value_kind: ValueKind::from_str(&kind)?,
                value: row.try_get("prediction_value")?,
                ci_low: row.try_get("ci_low")?,
                ci_high: row.try_get("ci_high")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl PredictionSink for SqlitePredictionRepository {
    async fn upsert_prediction(&self, record: &PredictionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (
                time, model_name, target_hours, value_kind,
                prediction_value, ci_low, ci_high, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(time, model_name, target_hours) DO UPDATE SET
                value_kind = excluded.value_kind,
                prediction_value = excluded.prediction_value,
                ci_low = excluded.ci_low,
                ci_high = excluded.ci_high,
                created_at = excluded.created_at
            "#,
        )
        .bind(record_time(record.time).timestamp())
        .bind(&record.model_name)
        .bind(i64::from(record.horizon))
        .bind(record.value_kind.to_string())
        .bind(record.value)
        .bind(record.ci_low)
        .bind(record.ci_high)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert prediction")?;

        debug!(
            "Persisted prediction {} {}h @ {}",
            record.model_name, record.horizon, record.time
        );
        Ok(())
    }
}

#[async_trait]
impl PredictionRepository for SqlitePredictionRepository {
    async fn find(
        &self,
        time: DateTime<Utc>,
        model_name: &str,
        horizon: u32,
    ) -> Result<Option<PredictionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions WHERE time = ? AND model_name = ? AND target_hours = ?",
        )
        .bind(record_time(time).timestamp())
        .bind(model_name)
        .bind(i64::from(horizon))
        .fetch_all(&self.pool)
        .await?;
        Ok(Self::map_rows(rows)?.into_iter().next())
    }

    async fn find_latest(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM predictions ORDER BY time DESC, model_name DESC, target_hours DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Self::map_rows(rows)
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM predictions")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM predictions WHERE time < ?")
            .bind(record_time(cutoff).timestamp())
            .execute(&self.pool)
            .await?;

        info!(
            "Deleted {} prediction(s) older than {}",
            result.rows_affected(),
            cutoff
        );
        Ok(result.rows_affected())
    }
}
