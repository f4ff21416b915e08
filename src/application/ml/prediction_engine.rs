//! Prediction orchestration.
//!
//! One request walks: resolve model, validate horizon, load artifact, build
//! features, infer, derive target time, and optionally persist. Every step
//! before persistence is terminal on failure.

use crate::application::ml::feature_engine::FeatureEngine;
use crate::application::ml::model_cache::ModelCache;
use crate::application::ml::model_registry::ModelRegistry;
use crate::application::ml::predictor::ResidualStats;
use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::ml::model_descriptor::ModelDescriptor;
use crate::domain::ml::prediction::{
    ConfidenceBand, Persistence, PredictionOutcome, PredictionResult, Uncertainty,
};
use crate::domain::ports::{BarStore, PredictionSink};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub model_name: String,
    pub horizon: u32,
    #[serde(default)]
    pub save_to_db: bool,
    /// Anchor cutoff. `None` means now.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

impl PredictionRequest {
    pub fn new(model_name: impl Into<String>, horizon: u32) -> Self {
        Self {
            model_name: model_name.into(),
            horizon,
            save_to_db: false,
            as_of: None,
        }
    }

    pub fn persisted(mut self) -> Self {
        self.save_to_db = true;
        self
    }

    pub fn as_of(mut self, cutoff: DateTime<Utc>) -> Self {
        self.as_of = Some(cutoff);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Symbol requested from the bar store.
    pub symbol: String,
    /// Multiplier applied to residual RMSE for the band half-width.
    pub z_score: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            z_score: 1.96,
        }
    }
}

pub struct PredictionEngine {
    registry: Arc<ModelRegistry>,
    cache: Arc<ModelCache>,
    features: FeatureEngine,
    bars: Arc<dyn BarStore>,
    sink: Option<Arc<dyn PredictionSink>>,
    settings: EngineSettings,
}

impl PredictionEngine {
    pub fn new(
        registry: Arc<ModelRegistry>,
        cache: Arc<ModelCache>,
        bars: Arc<dyn BarStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            features: FeatureEngine::new(),
            bars,
            sink: None,
            settings,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PredictionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_feature_engine(mut self, features: FeatureEngine) -> Self {
        self.features = features;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn predict(&self, request: &PredictionRequest) -> ForecastResult<PredictionOutcome> {
        let outcome = self.run(request).await;
        if let Err(e) = &outcome {
            if e.is_client_error() || e.is_recoverable() {
                warn!("PredictionEngine: rejected {}h request: {}", request.horizon, e);
            } else {
                error!("PredictionEngine: {}h request failed: {}", request.horizon, e);
            }
        }
        outcome
    }

    async fn run(&self, request: &PredictionRequest) -> ForecastResult<PredictionOutcome> {
        let name = request.model_name.as_str();
        let horizon = request.horizon;

        let descriptor = self.registry.get(name).await?;
        if !descriptor.supports(horizon) {
            return Err(ForecastError::UnsupportedHorizon {
                model: descriptor.name.clone(),
                horizon,
                supported: descriptor.horizons(),
            });
        }

        let artifact = self.cache.load(&descriptor).await?;
        let columns = artifact.feature_config.columns_for(horizon);
        let steps = artifact.feature_config.steps();

        let cutoff = request.as_of.unwrap_or_else(Utc::now);
        let required = self
            .features
            .required_sequence_history(columns, horizon, steps)?;
        let bars = self
            .bars
            .get_bars(&self.settings.symbol, cutoff, required)
            .await
            .map_err(|e| ForecastError::BarStore {
                reason: e.to_string(),
            })?;
        let features = self
            .features
            .build_sequence(&bars, cutoff, horizon, columns, steps)?;
        debug!(
            "PredictionEngine: '{}' {}h features at {}: {:?}",
            name, horizon, features.base_timestamp, features.values
        );

        let value = artifact
            .model
            .predict(horizon, features.as_slice())
            .map_err(|reason| ForecastError::InferenceFailed {
                model: name.to_string(),
                horizon,
                reason,
            })?;
        let (confidence, uncertainty) =
            band(value, artifact.model.residuals(horizon), self.settings.z_score);

        let result = PredictionResult {
            model_name: descriptor.name.clone(),
            model_type: descriptor.model_type.clone(),
            horizon,
            base_timestamp: features.base_timestamp,
            predicted_time: features.base_timestamp + Duration::hours(i64::from(horizon)),
            value_kind: artifact.model.target(),
            predicted_value: value,
            confidence,
            uncertainty,
            base_price: features.base_price,
        };

        let persistence = if request.save_to_db {
            self.persist(&result).await
        } else {
            Persistence::NotRequested
        };

        info!(
            "PredictionEngine: {} {}h @ {} -> {} {:.6} [{:.6}, {:.6}]",
            result.model_name,
            horizon,
            result.base_timestamp,
            result.value_kind,
            result.predicted_value,
            result.confidence.low,
            result.confidence.high
        );

        Ok(PredictionOutcome {
            result,
            persistence,
        })
    }

    async fn persist(&self, result: &PredictionResult) -> Persistence {
        let failed = |reason: String| {
            let err = ForecastError::Persist {
                model: result.model_name.clone(),
                horizon: result.horizon,
                reason,
            };
            warn!("PredictionEngine: {}", err);
            Persistence::Failed(err.to_string())
        };

        let Some(sink) = &self.sink else {
            return failed("no prediction sink configured".to_string());
        };
        match sink.upsert_prediction(&result.to_record(Utc::now())).await {
            Ok(()) => Persistence::Persisted,
            Err(e) => failed(e.to_string()),
        }
    }

    /// Runs `predict` for every supported horizon of `model_name`.
    ///
    /// Only an unknown model fails the whole call; per-horizon failures are
    /// reported next to their horizon.
    pub async fn predict_all_horizons(
        &self,
        model_name: &str,
        save_to_db: bool,
        as_of: Option<DateTime<Utc>>,
    ) -> ForecastResult<Vec<(u32, ForecastResult<PredictionOutcome>)>> {
        let descriptor = self.registry.get(model_name).await?;
        // Pin the cutoff so every horizon shares one base timestamp
        let cutoff = as_of.unwrap_or_else(Utc::now);

        let mut results = Vec::with_capacity(descriptor.supported_horizons.len());
        for horizon in descriptor.horizons() {
            let request = PredictionRequest {
                model_name: model_name.to_string(),
                horizon,
                save_to_db,
                as_of: Some(cutoff),
            };
            results.push((horizon, self.predict(&request).await));
        }
        Ok(results)
    }

    /// Registers or replaces a model. The artifact is loaded and every head
    /// checked against `feature_config` before the descriptor is committed; a
    /// rejected registration leaves any previous version in place.
    pub async fn register_model(&self, descriptor: ModelDescriptor) -> ForecastResult<ModelDescriptor> {
        descriptor.validate()?;
        self.registry.ensure_reachable(&descriptor)?;
        let model = self.cache.verify(&descriptor).await.inspect_err(|e| {
            warn!("PredictionEngine: rejected registration of '{}': {}", descriptor.name, e)
        })?;

        let registered = self.registry.register(descriptor).await?;
        if registered.is_active {
            self.cache.insert(&registered, model).await;
        } else {
            self.cache.invalidate(&registered.name).await;
        }
        Ok(registered)
    }

    pub async fn list_models(&self, include_inactive: bool) -> Vec<ModelDescriptor> {
        self.registry.list(include_inactive).await
    }

    pub async fn deactivate_model(&self, name: &str) -> ForecastResult<ModelDescriptor> {
        let deactivated = self.registry.deactivate(name).await?;
        self.cache.invalidate(name).await;
        Ok(deactivated)
    }
}

/// Residual band `center ± z·rmse` with `center = value + mean_error`.
fn band(value: f64, residuals: Option<ResidualStats>, z_score: f64) -> (ConfidenceBand, Uncertainty) {
    match residuals {
        Some(r) => {
            let center = value + r.mean_error;
            let half = z_score * r.rmse;
            (
                ConfidenceBand {
                    low: center - half,
                    high: center + half,
                },
                Uncertainty::Residual {
                    rmse: r.rmse,
                    z_score,
                },
            )
        }
        None => (ConfidenceBand::point(value), Uncertainty::Unavailable),
    }
}
