use super::predictor::Estimator;
use serde::Deserialize;

/// Ordinary least squares head: `w · x + intercept`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearHead {
    #[serde(alias = "coefficients")]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl Estimator for LinearHead {
    fn input_width(&self) -> usize {
        self.weights.len()
    }

    fn estimate(&self, features: &[f64]) -> Result<f64, String> {
        let dot: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum();
        Ok(dot + self.intercept)
    }

    fn validate(&self) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err("linear head has no weights".to_string());
        }
        if self.weights.iter().any(|w| !w.is_finite()) || !self.intercept.is_finite() {
            return Err("linear head contains non-finite coefficients".to_string());
        }
        Ok(())
    }
}
