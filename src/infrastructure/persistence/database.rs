use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite pool with the forecasting schema applied.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str, max_connections: u32) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// In-memory database for tests. Single connection, since every
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:", 1).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Raw hourly bars deposited by the feed
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raw_bars (
                symbol TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (symbol, timestamp)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create raw_bars table")?;

        // 2. Model registry
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ml_models (
                name TEXT PRIMARY KEY,
                model_type TEXT NOT NULL,
                supported_horizons_json TEXT NOT NULL,
                artifact_location TEXT NOT NULL,
                feature_config_json TEXT NOT NULL,
                metrics_json TEXT NOT NULL DEFAULT '{}',
                is_active BOOLEAN DEFAULT 1,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create ml_models table")?;

        // 3. Predictions, one row per (base time, model, horizon)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                time INTEGER NOT NULL,
                model_name TEXT NOT NULL,
                target_hours INTEGER NOT NULL,
                value_kind TEXT NOT NULL,
                prediction_value REAL NOT NULL,
                ci_low REAL NOT NULL,
                ci_high REAL NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (time, model_name, target_hours)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create predictions table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_model_time
            ON predictions (model_name, time);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create predictions index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
