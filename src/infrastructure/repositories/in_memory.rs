//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the repository traits defined
//! in `domain::repositories`.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Testing**: Ideal for unit tests and development
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - No persistence across multiple instances
//!
//! For durable storage use the SQLite repositories in
//! `infrastructure::persistence`.

use crate::domain::market::bar::Bar;
use crate::domain::ml::model_descriptor::ModelDescriptor;
use crate::domain::ml::prediction::{PredictionRecord, record_time};
use crate::domain::ports::{BarStore, PredictionSink};
use crate::domain::repositories::{BarRepository, ModelRepository, PredictionRepository};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type BarSeries = BTreeMap<DateTime<Utc>, Bar>;

/// Bars per symbol, ordered by timestamp.
pub struct InMemoryBarStore {
    bars: Arc<RwLock<HashMap<String, BarSeries>>>,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self {
            bars: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self, symbol: &str) -> usize {
        self.bars.read().await.get(symbol).map_or(0, BTreeMap::len)
    }
}

impl Default for InMemoryBarStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarStore for InMemoryBarStore {
    async fn get_bars(
        &self,
        symbol: &str,
        up_to: DateTime<Utc>,
        min_count: usize,
    ) -> Result<Vec<Bar>> {
        let bars = self.bars.read().await;
        let Some(series) = bars.get(symbol) else {
            return Ok(Vec::new());
        };
        let mut window: Vec<Bar> = series
            .range(..=up_to)
            .rev()
            .take(min_count)
            .map(|(_, b)| b.clone())
            .collect();
        window.reverse();
        Ok(window)
    }
}

#[async_trait]
impl BarRepository for InMemoryBarStore {
    async fn save_bars(&self, bars: &[Bar]) -> Result<()> {
        let mut store = self.bars.write().await;
        for bar in bars {
            store
                .entry(bar.symbol.clone())
                .or_default()
                .insert(bar.timestamp, bar.clone());
        }
        Ok(())
    }
}

/// Descriptors keyed by name.
pub struct InMemoryModelRepository {
    models: Arc<RwLock<BTreeMap<String, ModelDescriptor>>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryModelRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRepository for InMemoryModelRepository {
    async fn save(&self, descriptor: &ModelDescriptor) -> Result<()> {
        self.models
            .write()
            .await
            .insert(descriptor.name.clone(), descriptor.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(self.models.read().await.values().cloned().collect())
    }
}

type PredictionKey = (DateTime<Utc>, String, u32);

/// Predictions keyed by `(time, model_name, horizon)`.
pub struct InMemoryPredictionRepository {
    predictions: Arc<RwLock<BTreeMap<PredictionKey, PredictionRecord>>>,
}

impl InMemoryPredictionRepository {
    pub fn new() -> Self {
        Self {
            predictions: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryPredictionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PredictionSink for InMemoryPredictionRepository {
    async fn upsert_prediction(&self, record: &PredictionRecord) -> Result<()> {
        let stored = PredictionRecord {
            time: record_time(record.time),
            ..record.clone()
        };
        self.predictions.write().await.insert(stored.key(), stored);
        Ok(())
    }
}

#[async_trait]
impl PredictionRepository for InMemoryPredictionRepository {
    async fn find(
        &self,
        time: DateTime<Utc>,
        model_name: &str,
        horizon: u32,
    ) -> Result<Option<PredictionRecord>> {
        let predictions = self.predictions.read().await;
        Ok(predictions
            .get(&(record_time(time), model_name.to_string(), horizon))
            .cloned())
    }

    async fn find_latest(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let predictions = self.predictions.read().await;
        Ok(predictions.values().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.predictions.read().await.len())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut predictions = self.predictions.write().await;
        let before = predictions.len();
        let cutoff = record_time(cutoff);
        predictions.retain(|(time, _, _), _| *time >= cutoff);
        Ok((before - predictions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::prediction::ValueKind;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn create_test_bar(symbol: &str, hour: i64) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            timestamp: t0() + Duration::hours(hour),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100) + rust_decimal::Decimal::from(hour),
            volume: dec!(5),
        }
    }

    fn create_test_record(hour: i64, model: &str, horizon: u32, value: f64) -> PredictionRecord {
        PredictionRecord {
            time: t0() + Duration::hours(hour),
            model_name: model.to_string(),
            horizon,
            value_kind: ValueKind::LogReturn,
            value,
            ci_low: value - 0.01,
            ci_high: value + 0.01,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bar_store_returns_latest_window_ascending() {
        let store = InMemoryBarStore::new();
        let bars: Vec<Bar> = (0..10).map(|h| create_test_bar("BTCUSDT", h)).collect();
        store.save_bars(&bars).await.unwrap();
        store
            .save_bars(&[create_test_bar("ETHUSDT", 3)])
            .await
            .unwrap();

        let window = store
            .get_bars("BTCUSDT", t0() + Duration::hours(6), 3)
            .await
            .unwrap();
        let hours: Vec<i64> = window
            .iter()
            .map(|b| (b.timestamp - t0()).num_hours())
            .collect();
        assert_eq!(hours, vec![4, 5, 6]);

        // Fewer than requested is not an error
        let short = store.get_bars("BTCUSDT", t0(), 5).await.unwrap();
        assert_eq!(short.len(), 1);
        assert!(store.get_bars("XRPUSDT", t0(), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_bars_replaces_same_timestamp() {
        let store = InMemoryBarStore::new();
        store.save_bars(&[create_test_bar("BTCUSDT", 1)]).await.unwrap();
        let mut corrected = create_test_bar("BTCUSDT", 1);
        corrected.close = dec!(42);
        store.save_bars(&[corrected]).await.unwrap();

        assert_eq!(store.len("BTCUSDT").await, 1);
        let window = store
            .get_bars("BTCUSDT", t0() + Duration::hours(1), 1)
            .await
            .unwrap();
        assert_eq!(window[0].close, dec!(42));
    }

    #[tokio::test]
    async fn test_prediction_upsert_is_idempotent() {
        let repo = InMemoryPredictionRepository::new();
        repo.upsert_prediction(&create_test_record(0, "xgb", 6, 0.01))
            .await
            .unwrap();
        repo.upsert_prediction(&create_test_record(0, "xgb", 6, 0.02))
            .await
            .unwrap();
        repo.upsert_prediction(&create_test_record(0, "xgb", 12, 0.03))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        let stored = repo.find(t0(), "xgb", 6).await.unwrap().unwrap();
        assert_eq!(stored.value, 0.02);
    }

    #[tokio::test]
    async fn test_prediction_latest_and_cleanup() {
        let repo = InMemoryPredictionRepository::new();
        for h in 0..5 {
            repo.upsert_prediction(&create_test_record(h, "lr", 3, h as f64))
                .await
                .unwrap();
        }

        let latest = repo.find_latest(2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].value, 4.0);
        assert_eq!(latest[1].value, 3.0);

        let removed = repo
            .delete_older_than(t0() + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_model_repository_overwrites_by_name() {
        use crate::domain::ml::model_descriptor::FeatureConfig;

        let repo = InMemoryModelRepository::new();
        let mut d = ModelDescriptor::new("lr", "LinearRegression", [3], "lr.json", FeatureConfig::new(["lag_1h"]));
        repo.save(&d).await.unwrap();
        d.is_active = false;
        repo.save(&d).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].is_active);
    }
}
