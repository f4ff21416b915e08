use thiserror::Error;

/// Errors produced by the forecasting core.
///
/// Every failure of the prediction pipeline surfaces as one of these kinds.
/// Nothing in the core substitutes a fallback value for an error.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Model not found: {name}")]
    ModelNotFound { name: String },

    #[error("Horizon {horizon}h not supported by model '{model}'. Supported horizons: {supported:?}")]
    UnsupportedHorizon {
        model: String,
        horizon: u32,
        supported: Vec<u32>,
    },

    #[error("Failed to load artifact for model '{model}' from {location}: {reason}")]
    ArtifactLoad {
        model: String,
        location: String,
        reason: String,
    },

    #[error("Insufficient history: need {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Feature config mismatch at horizon {horizon}h: {reason}")]
    FeatureConfigMismatch { horizon: u32, reason: String },

    #[error("Inference failed for model '{model}' at horizon {horizon}h: {reason}")]
    InferenceFailed {
        model: String,
        horizon: u32,
        reason: String,
    },

    #[error("Invalid model descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("Bar store error: {reason}")]
    BarStore { reason: String },

    #[error("Registry storage error: {reason}")]
    RegistryStorage { reason: String },

    #[error("Failed to persist prediction for '{model}' at {horizon}h: {reason}")]
    Persist {
        model: String,
        horizon: u32,
        reason: String,
    },
}

impl ForecastError {
    /// True for errors caused by the request itself (unknown model, bad horizon,
    /// invalid descriptor). These are never retried by the core.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::ModelNotFound { .. }
                | ForecastError::UnsupportedHorizon { .. }
                | ForecastError::InvalidDescriptor { .. }
        )
    }

    /// True when waiting for more bars may resolve the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ForecastError::InsufficientHistory { .. })
    }
}

pub type ForecastResult<T> = Result<T, ForecastError>;
