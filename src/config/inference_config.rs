//! Inference configuration parsing from environment variables.
//!
//! Covers where artifacts live, which symbol the bar store is queried for,
//! and how wide residual confidence bands are.

use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceEnvConfig {
    /// Base directory for relative artifact locations.
    pub model_dir: PathBuf,
    pub symbol: String,
    pub confidence_z_score: f64,
}

impl Default for InferenceEnvConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./trained_models"),
            symbol: "BTCUSDT".to_string(),
            confidence_z_score: 1.96,
        }
    }
}

impl InferenceEnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let confidence_z_score = match lookup("CONFIDENCE_Z_SCORE") {
            Some(raw) => raw
                .parse::<f64>()
                .context("Failed to parse CONFIDENCE_Z_SCORE")?,
            None => defaults.confidence_z_score,
        };
        if !confidence_z_score.is_finite() || confidence_z_score < 0.0 {
            bail!(
                "CONFIDENCE_Z_SCORE must be finite and non-negative, got {}",
                confidence_z_score
            );
        }

        let symbol = lookup("SYMBOL")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or(defaults.symbol);
        if symbol.is_empty() {
            bail!("SYMBOL must not be empty");
        }

        Ok(Self {
            model_dir: lookup("MODEL_DIR").map(PathBuf::from).unwrap_or(defaults.model_dir),
            symbol,
            confidence_z_score,
        })
    }
}
