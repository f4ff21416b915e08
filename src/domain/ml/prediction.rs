use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the primary predicted value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Absolute price at the target time.
    Price,
    /// ln(future price / base price).
    LogReturn,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Price => write!(f, "price"),
            ValueKind::LogReturn => write!(f, "log_return"),
        }
    }
}

impl FromStr for ValueKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(ValueKind::Price),
            "log_return" => Ok(ValueKind::LogReturn),
            _ => anyhow::bail!("Unknown value kind: {}", s),
        }
    }
}

/// Where the confidence band came from.
///
/// `Unavailable` means the artifact carries no residual statistics for the
/// horizon: the band collapses to the point value and must not be read as
/// high confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Uncertainty {
    Residual { rmse: f64, z_score: f64 },
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub low: f64,
    pub high: f64,
}

impl ConfidenceBand {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn point(value: f64) -> Self {
        Self {
            low: value,
            high: value,
        }
    }
}

/// Absolute-price rendering of a forecast, for presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceForecast {
    pub price: f64,
    pub low: f64,
    pub high: f64,
}

/// One forecast as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub model_name: String,
    pub model_type: String,
    pub horizon: u32,
    pub base_timestamp: DateTime<Utc>,
    pub predicted_time: DateTime<Utc>,
    pub value_kind: ValueKind,
    pub predicted_value: f64,
    pub confidence: ConfidenceBand,
    pub uncertainty: Uncertainty,
    /// Close of the anchor bar.
    pub base_price: f64,
}

impl PredictionResult {
    pub fn has_uncertainty_model(&self) -> bool {
        !matches!(self.uncertainty, Uncertainty::Unavailable)
    }

    /// Converts to absolute price. Log-return forecasts are exponentiated
    /// against the base price; price forecasts pass through unchanged.
    pub fn implied_price(&self) -> PriceForecast {
        match self.value_kind {
            ValueKind::Price => PriceForecast {
                price: self.predicted_value,
                low: self.confidence.low,
                high: self.confidence.high,
            },
            ValueKind::LogReturn => PriceForecast {
                price: self.base_price * self.predicted_value.exp(),
                low: self.base_price * self.confidence.low.exp(),
                high: self.base_price * self.confidence.high.exp(),
            },
        }
    }

    pub fn to_record(&self, created_at: DateTime<Utc>) -> PredictionRecord {
        PredictionRecord {
            time: record_time(self.base_timestamp),
            model_name: self.model_name.clone(),
            horizon: self.horizon,
            value_kind: self.value_kind,
            value: self.predicted_value,
            ci_low: self.confidence.low,
            ci_high: self.confidence.high,
            created_at,
        }
    }
}

/// Prediction rows are keyed at whole-second resolution.
pub fn record_time(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(0)
}

/// Persisted shape of a prediction, keyed by `(time, model_name, horizon)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub time: DateTime<Utc>,
    pub model_name: String,
    pub horizon: u32,
    pub value_kind: ValueKind,
    pub value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn key(&self) -> (DateTime<Utc>, String, u32) {
        (record_time(self.time), self.model_name.clone(), self.horizon)
    }
}

/// Outcome of the optional persistence step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Persistence {
    NotRequested,
    Persisted,
    /// The prediction is still valid; only the write failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutcome {
    pub result: PredictionResult,
    pub persistence: Persistence,
}

impl PredictionOutcome {
    pub fn persist_warning(&self) -> Option<&str> {
        match &self.persistence {
            Persistence::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
