#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use criptify::application::ml::artifact::{ArtifactLoader, parse_artifact};
use criptify::application::ml::predictor::ForecastModel;
use criptify::application::ml::{EngineSettings, ModelCache, ModelRegistry, PredictionEngine};
use criptify::domain::market::bar::Bar;
use criptify::domain::ml::model_descriptor::{FeatureConfig, ModelDescriptor};
use criptify::domain::ml::prediction::PredictionRecord;
use criptify::domain::ports::PredictionSink;
use criptify::domain::repositories::BarRepository;
use criptify::infrastructure::{InMemoryBarStore, InMemoryPredictionRepository};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

pub const SYMBOL: &str = "BTCUSDT";

/// Anchor of the generated series: the newest bar sits exactly here.
pub fn t_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// `count` hourly bars ending at `t_end()`, seeded random walk around 50k.
pub fn hourly_bars(count: usize, seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 50_000.0f64;
    let start = t_end() - Duration::hours(count as i64 - 1);

    (0..count)
        .map(|i| {
            price *= (rng.random_range(-0.005..0.005f64)).exp();
            let spread = price * rng.random_range(0.001..0.004f64);
            let close = Decimal::from_f64(price).unwrap().round_dp(2);
            Bar {
                symbol: SYMBOL.to_string(),
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: Decimal::from_f64(price + spread).unwrap().round_dp(2),
                low: Decimal::from_f64(price - spread).unwrap().round_dp(2),
                close,
                volume: Decimal::from_f64(rng.random_range(10.0..100.0f64))
                    .unwrap()
                    .round_dp(4),
            }
        })
        .collect()
}

/// One head of a generated linear artifact.
pub struct HeadSpec {
    pub horizon: u32,
    pub width: usize,
    pub rmse: Option<f64>,
}

pub fn head(horizon: u32, width: usize, rmse: Option<f64>) -> HeadSpec {
    HeadSpec {
        horizon,
        width,
        rmse,
    }
}

/// Linear artifact whose heads average their inputs and shift by a small
/// horizon-dependent intercept. With `log_return` targets the inputs are
/// standardized so the output stays near zero.
pub fn linear_artifact(target: &str, heads: &[HeadSpec]) -> Value {
    let width = heads.first().map_or(1, |h| h.width);
    let heads: Vec<Value> = heads
        .iter()
        .map(|h| {
            let mut head = json!({
                "horizon": h.horizon,
                "estimator": {
                    "weights": vec![1.0 / h.width as f64; h.width],
                    "intercept": 0.0001 * h.horizon as f64,
                },
            });
            if let Some(rmse) = h.rmse {
                head["residuals"] = json!({ "rmse": rmse });
            }
            head
        })
        .collect();

    let mut doc = json!({ "family": "linear", "target": target, "heads": heads });
    if target == "log_return" {
        doc["input_scaler"] = json!({
            "mean": vec![50_000.0; width],
            "scale": vec![1.0e7; width],
        });
    }
    doc
}

/// Artifact documents held in memory, with a load counter.
///
/// `delay` keeps each load busy long enough for concurrent callers to pile up.
pub struct CountingLoader {
    docs: RwLock<HashMap<String, String>>,
    loads: AtomicUsize,
    delay: std::time::Duration,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::with_delay(std::time::Duration::ZERO)
    }

    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn put(&self, location: &str, doc: &Value) {
        self.docs
            .write()
            .unwrap()
            .insert(location.to_string(), doc.to_string());
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ArtifactLoader for CountingLoader {
    fn exists(&self, location: &str) -> bool {
        self.docs.read().unwrap().contains_key(location)
    }

    fn load(&self, location: &str) -> Result<Arc<dyn ForecastModel>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let doc = self
            .docs
            .read()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| format!("no artifact at {}", location))?;
        parse_artifact(doc.as_bytes())
    }
}

/// Sink that rejects every write.
pub struct FailingSink;

#[async_trait]
impl PredictionSink for FailingSink {
    async fn upsert_prediction(&self, _record: &PredictionRecord) -> Result<()> {
        bail!("database is locked")
    }
}

pub fn descriptor(
    name: &str,
    horizons: &[u32],
    location: &str,
    columns: &[&str],
) -> ModelDescriptor {
    ModelDescriptor::new(
        name,
        "LinearRegression",
        horizons.iter().copied(),
        location,
        FeatureConfig::new(columns.iter().copied()),
    )
}

/// Engine wired to in-memory collaborators.
pub struct Harness {
    pub engine: Arc<PredictionEngine>,
    pub loader: Arc<CountingLoader>,
    pub cache: Arc<ModelCache>,
    pub bars: Arc<InMemoryBarStore>,
    pub predictions: Arc<InMemoryPredictionRepository>,
}

impl Harness {
    pub async fn new(bar_count: usize) -> Self {
        Self::with_loader(bar_count, Arc::new(CountingLoader::new())).await
    }

    pub async fn with_loader(bar_count: usize, loader: Arc<CountingLoader>) -> Self {
        let bars = Arc::new(InMemoryBarStore::new());
        bars.save_bars(&hourly_bars(bar_count, 42)).await.unwrap();

        let predictions = Arc::new(InMemoryPredictionRepository::new());
        let registry = Arc::new(ModelRegistry::new(loader.clone()));
        let cache = Arc::new(ModelCache::new(loader.clone()));
        let engine = PredictionEngine::new(
            registry,
            cache.clone(),
            bars.clone(),
            EngineSettings::default(),
        )
        .with_sink(predictions.clone());

        Self {
            engine: Arc::new(engine),
            loader,
            cache,
            bars,
            predictions,
        }
    }

    /// Stores `doc` at `<name>.json` and registers `descriptor` against it.
    pub async fn install(&self, mut descriptor: ModelDescriptor, doc: &Value) -> ModelDescriptor {
        if descriptor.artifact_location.is_empty() {
            descriptor.artifact_location = format!("{}.json", descriptor.name);
        }
        self.loader.put(&descriptor.artifact_location, doc);
        self.engine.register_model(descriptor).await.unwrap()
    }
}
