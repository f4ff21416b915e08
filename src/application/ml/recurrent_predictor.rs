use super::predictor::Estimator;
use serde::Deserialize;

/// Elman recurrent cell with a linear read-out.
///
/// The flat feature vector is consumed as `sequence_length` steps of
/// `input_size` values, oldest step first:
///
/// `h_t = tanh(W_in · x_t + W_h · h_{t-1} + b)`, output `w_out · h_T + b_out`.
#[derive(Debug, Clone, Deserialize)]
pub struct RecurrentHead {
    pub input_size: usize,
    pub hidden_size: usize,
    pub sequence_length: usize,
    /// hidden_size x input_size
    pub w_input: Vec<Vec<f64>>,
    /// hidden_size x hidden_size
    pub w_hidden: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub w_output: Vec<f64>,
    #[serde(default)]
    pub bias_output: f64,
}

impl RecurrentHead {
    fn step(&self, hidden: &[f64], input: &[f64]) -> Vec<f64> {
        (0..self.hidden_size)
            .map(|j| {
                let from_input: f64 = self.w_input[j].iter().zip(input).map(|(w, x)| w * x).sum();
                let from_hidden: f64 = self.w_hidden[j].iter().zip(hidden).map(|(w, h)| w * h).sum();
                (from_input + from_hidden + self.bias[j]).tanh()
            })
            .collect()
    }
}

impl Estimator for RecurrentHead {
    fn input_width(&self) -> usize {
        self.input_size * self.sequence_length
    }

    fn estimate(&self, features: &[f64]) -> Result<f64, String> {
        let mut hidden = vec![0.0; self.hidden_size];
        for input in features.chunks(self.input_size) {
            hidden = self.step(&hidden, input);
        }
        let out: f64 = self.w_output.iter().zip(&hidden).map(|(w, h)| w * h).sum();
        Ok(out + self.bias_output)
    }

    fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 || self.hidden_size == 0 || self.sequence_length == 0 {
            return Err("input_size, hidden_size and sequence_length must be positive".to_string());
        }
        let rows_ok = |m: &[Vec<f64>], cols: usize| {
            m.len() == self.hidden_size && m.iter().all(|row| row.len() == cols)
        };
        if !rows_ok(&self.w_input, self.input_size) {
            return Err(format!(
                "w_input must be {}x{}",
                self.hidden_size, self.input_size
            ));
        }
        if !rows_ok(&self.w_hidden, self.hidden_size) {
            return Err(format!(
                "w_hidden must be {}x{}",
                self.hidden_size, self.hidden_size
            ));
        }
        if self.bias.len() != self.hidden_size || self.w_output.len() != self.hidden_size {
            return Err(format!("bias and w_output must have {} entries", self.hidden_size));
        }
        let all_finite = self
            .w_input
            .iter()
            .chain(&self.w_hidden)
            .flatten()
            .chain(&self.bias)
            .chain(&self.w_output)
            .all(|v| v.is_finite());
        if !all_finite || !self.bias_output.is_finite() {
            return Err("recurrent head contains non-finite weights".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> RecurrentHead {
        RecurrentHead {
            input_size: 1,
            hidden_size: 1,
            sequence_length: 3,
            w_input: vec![vec![1.0]],
            w_hidden: vec![vec![0.5]],
            bias: vec![0.0],
            w_output: vec![2.0],
            bias_output: 0.1,
        }
    }

    #[test]
    fn test_recurrent_estimate_matches_manual_unroll() {
        let head = cell();
        head.validate().unwrap();
        assert_eq!(head.input_width(), 3);

        let xs = [0.2, -0.1, 0.3];
        let mut h = 0.0f64;
        for x in xs {
            h = (x + 0.5 * h).tanh();
        }
        let expected = 2.0 * h + 0.1;

        assert!((head.estimate(&xs).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_order_matters() {
        let head = cell();
        let a = head.estimate(&[0.9, 0.0, 0.0]).unwrap();
        let b = head.estimate(&[0.0, 0.0, 0.9]).unwrap();
        assert!((a - b).abs() > 1e-6);
    }

    #[test]
    fn test_validate_shape() {
        let mut head = cell();
        head.w_hidden = vec![vec![0.5, 0.1]];
        assert!(head.validate().is_err());

        let mut head = cell();
        head.sequence_length = 0;
        assert!(head.validate().is_err());
    }
}
