pub mod artifact;
pub mod boosted_predictor;
pub mod feature_engine;
pub mod linear_predictor;
pub mod model_cache;
pub mod model_registry;
pub mod prediction_engine;
pub mod predictor;
pub mod recurrent_predictor;
pub mod smartcore_predictor;

pub use artifact::{ArtifactLoader, parse_artifact};
pub use feature_engine::FeatureEngine;
pub use model_cache::{CachedArtifact, ModelCache};
pub use model_registry::ModelRegistry;
pub use prediction_engine::{EngineSettings, PredictionEngine, PredictionRequest};
pub use predictor::{ForecastModel, ModelFamily, ResidualStats};
