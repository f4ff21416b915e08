//! Serialized artifact format.
//!
//! An artifact is one JSON document tagged by `family`:
//!
//! ```json
//! {
//!   "family": "linear",
//!   "target": "log_return",
//!   "input_scaler": { "mean": [...], "scale": [...] },
//!   "heads": [
//!     {
//!       "horizon": 6,
//!       "estimator": { "weights": [...], "intercept": 0.0 },
//!       "target_scaler": { "mean": 0.000001, "scale": 0.005 },
//!       "residuals": { "rmse": 0.0041 }
//!     }
//!   ]
//! }
//! ```
//!
//! Each head is an independent estimator for one horizon. `input_scaler` is
//! shared by all heads and applied before the estimator; `target_scaler` is
//! inverse-applied to the raw output of its head.

use super::boosted_predictor::BoostedHead;
use super::linear_predictor::LinearHead;
use super::predictor::{Estimator, ForecastModel, ModelFamily, ResidualStats};
use super::recurrent_predictor::RecurrentHead;
use super::smartcore_predictor::ForestHead;
use crate::domain::ml::prediction::ValueKind;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolves and deserializes artifacts by location.
///
/// `load` may block on I/O and decoding; callers run it off the async executor.
pub trait ArtifactLoader: Send + Sync {
    /// Cheap reachability check used at registration.
    fn exists(&self, location: &str) -> bool;

    fn load(&self, location: &str) -> Result<Arc<dyn ForecastModel>, String>;
}

/// Per-feature standard scaling: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    fn validate(&self, width: usize) -> Result<(), String> {
        if self.mean.len() != width || self.scale.len() != width {
            return Err(format!(
                "input_scaler has {}/{} entries, heads expect {} features",
                self.mean.len(),
                self.scale.len(),
                width
            ));
        }
        if self.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err("input_scaler contains a zero or non-finite scale".to_string());
        }
        Ok(())
    }

    fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

/// Inverse of the scaling applied to training targets.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TargetScaler {
    pub mean: f64,
    pub scale: f64,
}

impl TargetScaler {
    fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.scale + self.mean
    }
}

#[derive(Deserialize)]
struct HorizonHead<E> {
    horizon: u32,
    estimator: E,
    #[serde(default)]
    target_scaler: Option<TargetScaler>,
    #[serde(default)]
    residuals: Option<ResidualStats>,
}

#[derive(Deserialize)]
struct HeadSet<E> {
    target: ValueKind,
    #[serde(default)]
    input_scaler: Option<StandardScaler>,
    heads: Vec<HorizonHead<E>>,
}

#[derive(Deserialize)]
struct ArtifactHeader {
    family: ModelFamily,
}

struct Head<E> {
    estimator: E,
    target_scaler: Option<TargetScaler>,
    residuals: Option<ResidualStats>,
}

/// A deserialized artifact: one estimator per supported horizon.
pub struct ArtifactModel<E: Estimator> {
    family: ModelFamily,
    target: ValueKind,
    input_scaler: Option<StandardScaler>,
    heads: BTreeMap<u32, Head<E>>,
}

impl<E: Estimator> ArtifactModel<E> {
    fn from_head_set(family: ModelFamily, set: HeadSet<E>) -> Result<Self, String> {
        if set.heads.is_empty() {
            return Err("artifact declares no heads".to_string());
        }

        let mut heads = BTreeMap::new();
        for head in set.heads {
            if head.horizon == 0 {
                return Err("head horizon must be positive".to_string());
            }
            head.estimator
                .validate()
                .map_err(|e| format!("head {}h: {}", head.horizon, e))?;
            if let Some(scaler) = &set.input_scaler {
                scaler.validate(head.estimator.input_width())?;
            }
            if let Some(r) = head.residuals
                && (!r.rmse.is_finite() || r.rmse < 0.0 || !r.mean_error.is_finite())
            {
                return Err(format!("head {}h: invalid residual statistics", head.horizon));
            }
            if let Some(ts) = head.target_scaler
                && (!ts.scale.is_finite() || !ts.mean.is_finite())
            {
                return Err(format!("head {}h: invalid target scaler", head.horizon));
            }

            let horizon = head.horizon;
            let previous = heads.insert(
                horizon,
                Head {
                    estimator: head.estimator,
                    target_scaler: head.target_scaler,
                    residuals: head.residuals,
                },
            );
            if previous.is_some() {
                return Err(format!("duplicate head for horizon {}h", horizon));
            }
        }

        Ok(Self {
            family,
            target: set.target,
            input_scaler: set.input_scaler,
            heads,
        })
    }
}

impl<E: Estimator> ForecastModel for ArtifactModel<E> {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn target(&self) -> ValueKind {
        self.target
    }

    fn horizons(&self) -> Vec<u32> {
        self.heads.keys().copied().collect()
    }

    fn input_width(&self, horizon: u32) -> Option<usize> {
        self.heads.get(&horizon).map(|h| h.estimator.input_width())
    }

    fn predict(&self, horizon: u32, features: &[f64]) -> Result<f64, String> {
        let head = self
            .heads
            .get(&horizon)
            .ok_or_else(|| format!("no head for horizon {}h", horizon))?;

        let width = head.estimator.input_width();
        if features.len() != width {
            return Err(format!("expected {} features, got {}", width, features.len()));
        }

        let raw = match &self.input_scaler {
            Some(scaler) => head.estimator.estimate(&scaler.transform(features))?,
            None => head.estimator.estimate(features)?,
        };
        let value = match head.target_scaler {
            Some(ts) => ts.inverse(raw),
            None => raw,
        };

        if !value.is_finite() {
            return Err(format!("non-finite output {}", value));
        }
        Ok(value)
    }

    fn residuals(&self, horizon: u32) -> Option<ResidualStats> {
        self.heads.get(&horizon).and_then(|h| h.residuals)
    }
}

fn build<E>(family: ModelFamily, document: serde_json::Value) -> Result<Arc<dyn ForecastModel>, String>
where
    E: Estimator + DeserializeOwned + 'static,
{
    let set: HeadSet<E> = serde_json::from_value(document)
        .map_err(|e| format!("malformed {} artifact: {}", family, e))?;
    Ok(Arc::new(ArtifactModel::from_head_set(family, set)?))
}

/// Decodes an artifact document into a ready-to-use model.
pub fn parse_artifact(bytes: &[u8]) -> Result<Arc<dyn ForecastModel>, String> {
    let document: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| format!("artifact is not valid JSON: {}", e))?;
    let header: ArtifactHeader = serde_json::from_value(document.clone())
        .map_err(|e| format!("artifact header: {}", e))?;

    match header.family {
        ModelFamily::Linear => build::<LinearHead>(header.family, document),
        ModelFamily::GradientBoosted => build::<BoostedHead>(header.family, document),
        ModelFamily::Recurrent => build::<RecurrentHead>(header.family, document),
        ModelFamily::RandomForest => build::<ForestHead>(header.family, document),
    }
}
