//! Repository Pattern Abstractions
//!
//! Storage-facing traits for the three durable collections of the system:
//! - `BarRepository`: hourly bars deposited by the feed, read back as a `BarStore`
//! - `ModelRepository`: the durable side of the model registry
//! - `PredictionRepository`: persisted forecasts, written through `PredictionSink`
//!
//! SQLite implementations live in `infrastructure::persistence`, in-memory
//! ones in `infrastructure::repositories`.

use crate::domain::market::bar::Bar;
use crate::domain::ml::model_descriptor::ModelDescriptor;
use crate::domain::ml::prediction::PredictionRecord;
use crate::domain::ports::{BarStore, PredictionSink};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait BarRepository: BarStore {
    /// Inserts or replaces bars keyed by `(symbol, timestamp)`.
    async fn save_bars(&self, bars: &[Bar]) -> Result<()>;
}

#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Insert or overwrite by name.
    async fn save(&self, descriptor: &ModelDescriptor) -> Result<()>;

    /// All descriptors, active or not.
    async fn get_all(&self) -> Result<Vec<ModelDescriptor>>;
}

#[async_trait]
pub trait PredictionRepository: PredictionSink {
    async fn find(
        &self,
        time: DateTime<Utc>,
        model_name: &str,
        horizon: u32,
    ) -> Result<Option<PredictionRecord>>;

    /// Most recent predictions by base time, newest first.
    async fn find_latest(&self, limit: usize) -> Result<Vec<PredictionRecord>>;

    async fn count(&self) -> Result<usize>;

    /// Deletes predictions whose base time is before `cutoff`. Returns rows removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
