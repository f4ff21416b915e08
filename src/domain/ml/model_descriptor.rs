use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::ml::feature_registry::{FEATURE_TIERS, lookup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered feature columns an artifact expects.
///
/// `columns` is the default list. `horizon_columns` overrides it for specific
/// horizons, for artifacts whose longer-horizon heads were trained on the
/// extra long-memory tiers. `sequence_length` is set for sequence models that
/// read the columns at each of their last N anchors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub horizon_columns: BTreeMap<u32, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_length: Option<usize>,
}

impl FeatureConfig {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            horizon_columns: BTreeMap::new(),
            sequence_length: None,
        }
    }

    pub fn with_sequence_length(mut self, steps: usize) -> Self {
        self.sequence_length = Some(steps);
        self
    }

    /// Rows per model input; 1 for non-sequence models.
    pub fn steps(&self) -> usize {
        self.sequence_length.unwrap_or(1)
    }

    /// Flattened input width at `horizon`.
    pub fn input_width(&self, horizon: u32) -> usize {
        self.columns_for(horizon).len() * self.steps()
    }

    pub fn with_horizon<I, S>(mut self, horizon: u32, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.horizon_columns
            .insert(horizon, columns.into_iter().map(Into::into).collect());
        self
    }

    /// Columns expected at `horizon`.
    pub fn columns_for(&self, horizon: u32) -> &[String] {
        self.horizon_columns
            .get(&horizon)
            .map(Vec::as_slice)
            .unwrap_or(&self.columns)
    }
}

fn default_active() -> bool {
    true
}

/// Identity and capability declaration for a trained artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Free-form algorithm family tag, e.g. "LinearRegression", "XGBoost", "LSTM".
    pub model_type: String,
    pub supported_horizons: BTreeSet<u32>,
    pub artifact_location: String,
    pub feature_config: FeatureConfig,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ModelDescriptor {
    pub fn new(
        name: impl Into<String>,
        model_type: impl Into<String>,
        supported_horizons: impl IntoIterator<Item = u32>,
        artifact_location: impl Into<String>,
        feature_config: FeatureConfig,
    ) -> Self {
        Self {
            name: name.into(),
            model_type: model_type.into(),
            supported_horizons: supported_horizons.into_iter().collect(),
            artifact_location: artifact_location.into(),
            feature_config,
            metrics: BTreeMap::new(),
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn supports(&self, horizon: u32) -> bool {
        self.supported_horizons.contains(&horizon)
    }

    pub fn horizons(&self) -> Vec<u32> {
        self.supported_horizons.iter().copied().collect()
    }

    /// Structural checks that do not touch the artifact itself.
    pub fn validate(&self) -> ForecastResult<()> {
        let invalid = |reason: String| ForecastError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if self.supported_horizons.is_empty() {
            return Err(invalid("supported_horizons must not be empty".to_string()));
        }
        if self.supported_horizons.contains(&0) {
            return Err(invalid("horizons must be positive".to_string()));
        }
        if self.artifact_location.trim().is_empty() {
            return Err(invalid("artifact_location must not be empty".to_string()));
        }
        if self.feature_config.sequence_length == Some(0) {
            return Err(invalid("sequence_length must be positive".to_string()));
        }
        for h in &self.supported_horizons {
            let columns = self.feature_config.columns_for(*h);
            if columns.is_empty() {
                return Err(invalid(format!("no feature columns declared for horizon {}h", h)));
            }
            if let Some(unknown) = columns.iter().find(|c| lookup(FEATURE_TIERS, c).is_none()) {
                return Err(invalid(format!("unknown feature column '{}'", unknown)));
            }
        }
        Ok(())
    }
}
