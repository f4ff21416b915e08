// Forecasting pipeline: features, registry, artifact cache, prediction engine
pub mod ml;
