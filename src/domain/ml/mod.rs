pub mod feature_registry;
pub mod feature_vector;
pub mod model_descriptor;
pub mod prediction;

pub use feature_vector::FeatureVector;
pub use model_descriptor::{FeatureConfig, ModelDescriptor};
pub use prediction::{
    ConfidenceBand, Persistence, PredictionOutcome, PredictionRecord, PredictionResult,
    PriceForecast, Uncertainty, ValueKind,
};
