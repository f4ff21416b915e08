//! Persistence configuration parsing from environment variables.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use std::env;

/// Oldest `predicted_time` kept when retaining `hours` of predictions.
pub fn retention_cutoff(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    if hours <= 0 {
        bail!("retention must be a positive number of hours, got {}", hours);
    }
    Duration::try_hours(hours)
        .and_then(|keep| now.checked_sub_signed(keep))
        .with_context(|| format!("retention of {} hours is out of range", hours))
}

/// Database and retention settings
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceEnvConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Predictions older than this are removed by `cleanup`.
    pub prediction_retention_hours: i64,
}

impl Default for PersistenceEnvConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/criptify.db".to_string(),
            max_connections: 5,
            prediction_retention_hours: 48,
        }
    }
}

impl PersistenceEnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .context("Failed to parse DB_MAX_CONNECTIONS")?,
            None => defaults.max_connections,
        };
        if max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }

        let prediction_retention_hours = match lookup("PREDICTION_RETENTION_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .context("Failed to parse PREDICTION_RETENTION_HOURS")?,
            None => defaults.prediction_retention_hours,
        };
        retention_cutoff(Utc::now(), prediction_retention_hours)
            .context("Invalid PREDICTION_RETENTION_HOURS")?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections,
            prediction_retention_hours,
        })
    }
}
