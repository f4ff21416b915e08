use crate::domain::market::bar::Bar;
use crate::domain::ml::prediction::PredictionRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read side of the bar feed.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Returns up to `min_count` of the most recent bars for `symbol` with
    /// `timestamp <= up_to`, oldest first.
    ///
    /// Returning fewer bars than requested is not an error here; the caller
    /// decides whether the window is long enough.
    async fn get_bars(
        &self,
        symbol: &str,
        up_to: DateTime<Utc>,
        min_count: usize,
    ) -> Result<Vec<Bar>>;
}

/// Write side for predictions. Upsert keyed by `(time, model_name, horizon)`.
#[async_trait]
pub trait PredictionSink: Send + Sync {
    async fn upsert_prediction(&self, record: &PredictionRecord) -> Result<()>;
}
