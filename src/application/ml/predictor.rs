use crate::domain::ml::prediction::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algorithm family of a loaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Linear,
    GradientBoosted,
    Recurrent,
    RandomForest,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelFamily::Linear => "linear",
            ModelFamily::GradientBoosted => "gradient_boosted",
            ModelFamily::Recurrent => "recurrent",
            ModelFamily::RandomForest => "random_forest",
        };
        write!(f, "{}", s)
    }
}

/// Out-of-sample residual statistics recorded at training time for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualStats {
    pub rmse: f64,
    /// Mean of (actual - predicted). Shifts the band center.
    #[serde(default)]
    pub mean_error: f64,
}

/// Interface for a loaded, trained model.
///
/// Accepts an ordered numeric feature vector for a horizon and returns a
/// scalar. The prediction engine depends on nothing else.
pub trait ForecastModel: Send + Sync {
    fn family(&self) -> ModelFamily;

    /// Whether outputs are prices or log returns.
    fn target(&self) -> ValueKind;

    /// Horizons this artifact has a trained head for, ascending.
    fn horizons(&self) -> Vec<u32>;

    /// Number of inputs the head for `horizon` consumes.
    fn input_width(&self, horizon: u32) -> Option<usize>;

    fn predict(&self, horizon: u32, features: &[f64]) -> Result<f64, String>;

    fn residuals(&self, horizon: u32) -> Option<ResidualStats>;
}

/// A single-output estimator for one horizon.
pub trait Estimator: Send + Sync {
    fn input_width(&self) -> usize;

    fn estimate(&self, features: &[f64]) -> Result<f64, String>;

    /// Structural checks run once at load time.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
