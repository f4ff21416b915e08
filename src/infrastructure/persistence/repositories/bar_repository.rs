use crate::domain::market::bar::Bar;
use crate::domain::ports::BarStore;
use crate::domain::repositories::BarRepository;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

pub struct SqliteBarRepository {
    pool: SqlitePool,
}

impl SqliteBarRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Bar> {
        let ts: i64 = row.try_get("timestamp")?;
        let decimal = |column: &str| -> Result<Decimal> {
            let raw: String = row.try_get(column)?;
            Decimal::from_str(&raw).with_context(|| format!("Invalid {} '{}'", column, raw))
        };
        Ok(Bar {
            symbol: row.try_get("symbol")?,
            timestamp: DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| anyhow!("Invalid bar timestamp {}", ts))?,
            open: decimal("open")?,
            high: decimal("high")?,
            low: decimal("low")?,
            close: decimal("close")?,
            volume: decimal("volume")?,
        })
    }
}

#[async_trait]
impl BarStore for SqliteBarRepository {
    async fn get_bars(
        &self,
        symbol: &str,
        up_to: DateTime<Utc>,
        min_count: usize,
    ) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM raw_bars
            WHERE symbol = ? AND timestamp <= ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(up_to.timestamp())
        .bind(min_count as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query raw_bars")?;

        let mut bars = rows.iter().map(Self::map_row).collect::<Result<Vec<_>>>()?;
        bars.reverse();
        debug!("Loaded {} bar(s) for {} up to {}", bars.len(), symbol, up_to);
        Ok(bars)
    }
}

#[async_trait]
impl BarRepository for SqliteBarRepository {
    async fn save_bars(&self, bars: &[Bar]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO raw_bars (symbol, timestamp, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol, timestamp) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(&bar.symbol)
            .bind(bar.timestamp.timestamp())
            .bind(bar.open.to_string())
            .bind(bar.high.to_string())
            .bind(bar.low.to_string())
            .bind(bar.close.to_string())
            .bind(bar.volume.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to save bar")?;
        }
        tx.commit().await?;
        Ok(())
    }
}
