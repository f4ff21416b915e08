//! Configuration module for Criptify.
//!
//! Structured configuration loading from environment variables, organized by
//! concern: Persistence and Inference.

mod inference_config;
mod persistence_config;

pub use inference_config::InferenceEnvConfig;
pub use persistence_config::{PersistenceEnvConfig, retention_cutoff};

use crate::application::ml::prediction_engine::EngineSettings;
use anyhow::{Context, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub persistence: PersistenceEnvConfig,
    pub inference: InferenceEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let persistence =
            PersistenceEnvConfig::from_env().context("Failed to load persistence config")?;
        let inference = InferenceEnvConfig::from_env().context("Failed to load inference config")?;
        Ok(Self {
            persistence,
            inference,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            symbol: self.inference.symbol.clone(),
            z_score: self.inference.confidence_z_score,
        }
    }
}
