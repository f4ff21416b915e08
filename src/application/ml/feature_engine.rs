//! Horizon-aware feature construction.
//!
//! Turns a bar window into the exact column vector a model was trained on.
//! Only bars at or before the cutoff are ever read. Sequence models get the
//! same columns computed at each of their last `steps` anchors.

use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::market::bar::{Bar, BarValues, first_unordered};
use crate::domain::ml::feature_registry::{
    FEATURE_TIERS, FeatureKind, FeatureSpec, FeatureTier, MACD_FAST, MACD_SIGNAL, MACD_SLOW,
    MacdOutput, lookup,
};
use crate::domain::ml::feature_vector::FeatureVector;
use chrono::{DateTime, Timelike, Utc};
use statrs::statistics::{Data, Distribution};
use std::collections::HashSet;
use std::f64::consts::PI;
use ta::Next;
use ta::indicators::{AverageTrueRange, MovingAverageConvergenceDivergence, RelativeStrengthIndex};

#[derive(Debug, Clone, Copy)]
pub struct FeatureEngine {
    tiers: &'static [FeatureTier],
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEngine {
    pub fn new() -> Self {
        Self::with_tiers(FEATURE_TIERS)
    }

    pub fn with_tiers(tiers: &'static [FeatureTier]) -> Self {
        Self { tiers }
    }

    /// Maps configured column names to feature specs, enforcing horizon gating.
    pub fn resolve(&self, columns: &[String], horizon: u32) -> ForecastResult<Vec<FeatureSpec>> {
        let mismatch = |reason: String| ForecastError::FeatureConfigMismatch { horizon, reason };

        if columns.is_empty() {
            return Err(mismatch("no feature columns configured".to_string()));
        }

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(columns.len());
        for column in columns {
            if !seen.insert(column.as_str()) {
                return Err(mismatch(format!("column '{}' is listed twice", column)));
            }
            let (spec, min_horizon) = lookup(self.tiers, column)
                .ok_or_else(|| mismatch(format!("unknown feature column '{}'", column)))?;
            if horizon < min_horizon {
                return Err(mismatch(format!(
                    "column '{}' is only available from {}h",
                    column, min_horizon
                )));
            }
            specs.push(spec);
        }
        Ok(specs)
    }

    /// Number of bars (anchor included) needed to compute `columns`.
    pub fn required_history(&self, columns: &[String], horizon: u32) -> ForecastResult<usize> {
        self.required_sequence_history(columns, horizon, 1)
    }

    /// Bars needed for `steps` consecutive rows of `columns`.
    pub fn required_sequence_history(
        &self,
        columns: &[String],
        horizon: u32,
        steps: usize,
    ) -> ForecastResult<usize> {
        let specs = self.resolve(columns, horizon)?;
        Ok(row_lookback(&specs) + steps.saturating_sub(1))
    }

    /// Builds the feature vector anchored at the newest bar with
    /// `timestamp <= cutoff`.
    ///
    /// `bars` must be strictly ascending. Bars after the cutoff are ignored.
    pub fn build(
        &self,
        bars: &[Bar],
        cutoff: DateTime<Utc>,
        horizon: u32,
        columns: &[String],
    ) -> ForecastResult<FeatureVector> {
        self.build_sequence(bars, cutoff, horizon, columns, 1)
    }

    /// Builds `steps` rows of `columns`, one per consecutive anchor, oldest
    /// first and flattened row-major. The last row is the one `build` returns.
    pub fn build_sequence(
        &self,
        bars: &[Bar],
        cutoff: DateTime<Utc>,
        horizon: u32,
        columns: &[String],
        steps: usize,
    ) -> ForecastResult<FeatureVector> {
        if steps == 0 {
            return Err(ForecastError::FeatureConfigMismatch {
                horizon,
                reason: "sequence_length must be positive".to_string(),
            });
        }
        let specs = self.resolve(columns, horizon)?;
        let lookback = row_lookback(&specs);
        let required = lookback + steps - 1;

        if let Some(idx) = first_unordered(bars) {
            return Err(ForecastError::BarStore {
                reason: format!(
                    "bar window is not strictly ascending at index {} ({})",
                    idx, bars[idx].timestamp
                ),
            });
        }

        let visible = bars.partition_point(|b| b.timestamp <= cutoff);
        let window = &bars[..visible];
        if window.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                available: window.len(),
            });
        }
        let window = &window[window.len() - required..];
        let values = bar_values(window)?;

        let mut features = Vec::with_capacity(specs.len() * steps);
        for step in 0..steps {
            let end = step + lookback;
            let series = Series::new(&values[step..end]);
            let anchor_time = window[end - 1].timestamp;
            for spec in &specs {
                let value = series
                    .compute(spec.kind, anchor_time)
                    .and_then(|v| {
                        if v.is_finite() {
                            Ok(v)
                        } else {
                            Err(format!("not finite ({})", v))
                        }
                    })
                    .map_err(|reason| ForecastError::BarStore {
                        reason: format!("feature '{}' at {}: {}", spec.name, anchor_time, reason),
                    })?;
                features.push(value);
            }
        }

        let anchor = &window[window.len() - 1];
        Ok(FeatureVector {
            base_timestamp: anchor.timestamp,
            horizon,
            columns: columns.to_vec(),
            steps,
            values: features,
            base_price: values[values.len() - 1].close,
        })
    }
}

fn row_lookback(specs: &[FeatureSpec]) -> usize {
    specs.iter().map(|s| s.kind.lookback()).max().unwrap_or(1)
}

fn bar_values(window: &[Bar]) -> ForecastResult<Vec<BarValues>> {
    window
        .iter()
        .map(|bar| {
            bar.values().ok_or_else(|| ForecastError::BarStore {
                reason: format!("bar at {} has values outside f64 range", bar.timestamp),
            })
        })
        .collect()
}

/// One row's bars, oldest first; the last bar is the anchor.
struct Series<'a> {
    bars: &'a [BarValues],
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl<'a> Series<'a> {
    fn new(bars: &'a [BarValues]) -> Self {
        Self {
            bars,
            close: bars.iter().map(|b| b.close).collect(),
            volume: bars.iter().map(|b| b.volume).collect(),
        }
    }

    fn anchor(&self) -> &BarValues {
        &self.bars[self.bars.len() - 1]
    }

    fn last_close(&self) -> f64 {
        self.anchor().close
    }

    fn close_back(&self, k: usize) -> f64 {
        self.close[self.close.len() - 1 - k]
    }

    fn tail<T>(values: &[T], k: usize) -> &[T] {
        &values[values.len() - k..]
    }

    /// The `k` bars immediately before the anchor.
    fn prior(&self, k: usize) -> &[BarValues] {
        let before = &self.bars[..self.bars.len() - 1];
        Self::tail(before, k)
    }

    fn compute(&self, kind: FeatureKind, anchor_time: DateTime<Utc>) -> Result<f64, String> {
        let value = match kind {
            FeatureKind::Lag(k) => self.close_back(k),
            FeatureKind::Sma(k) => mean(Self::tail(&self.close, k)),
            FeatureKind::PriceChange(k) => self.last_close() - self.close_back(k),
            FeatureKind::LogReturn => (self.last_close() / self.close_back(1)).ln(),
            FeatureKind::PriceRange => {
                let a = self.anchor();
                (a.high - a.low) / a.close
            }
            FeatureKind::Volatility(k) => {
                let closes = Self::tail(&self.close, k + 1);
                let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
                Data::new(returns).std_dev().unwrap_or(f64::NAN)
            }
            FeatureKind::VolumeMa(k) => mean(Self::tail(&self.volume, k)),
            FeatureKind::VolumeZScore(k) => {
                let data = Data::new(Self::tail(&self.volume, k).to_vec());
                let (Some(mu), Some(sigma)) = (data.mean(), data.std_dev()) else {
                    return Ok(f64::NAN);
                };
                if sigma == 0.0 {
                    0.0
                } else {
                    (self.anchor().volume - mu) / sigma
                }
            }
            FeatureKind::HourSin => hour_angle(anchor_time).sin(),
            FeatureKind::HourCos => hour_angle(anchor_time).cos(),
            FeatureKind::Macd(output) => {
                let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
                    .map_err(|e| format!("MACD: {:?}", e))?;
                let mut last = None;
                for bar in self.prior(kind.lookback() - 1) {
                    last = Some(macd.next(bar.close));
                }
                let out = last.ok_or("MACD has no input bars")?;
                match output {
                    MacdOutput::Line => out.macd,
                    MacdOutput::Signal => out.signal,
                    MacdOutput::Histogram => out.histogram,
                }
            }
            FeatureKind::Rsi(k) => {
                let mut rsi = RelativeStrengthIndex::new(k).map_err(|e| format!("RSI: {:?}", e))?;
                self.prior(kind.lookback() - 1)
                    .iter()
                    .fold(f64::NAN, |_, bar| rsi.next(bar.close))
            }
            FeatureKind::AtrNorm(k) => {
                let mut atr = AverageTrueRange::new(k).map_err(|e| format!("ATR: {:?}", e))?;
                let prior = self.prior(kind.lookback() - 1);
                let mut value = f64::NAN;
                for bar in prior {
                    let item = ta::DataItem::builder()
                        .open(bar.open)
                        .high(bar.high)
                        .low(bar.low)
                        .close(bar.close)
                        .volume(bar.volume)
                        .build()
                        .map_err(|e| format!("inconsistent OHLC bar for ATR: {:?}", e))?;
                    value = atr.next(&item);
                }
                let prev_close = prior.last().map_or(f64::NAN, |b| b.close);
                value / prev_close
            }
        };
        Ok(value)
    }
}

fn mean(values: &[f64]) -> f64 {
    Data::new(values.to_vec()).mean().unwrap_or(f64::NAN)
}

fn hour_angle(ts: DateTime<Utc>) -> f64 {
    2.0 * PI * ts.hour() as f64 / 24.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let close = Decimal::from_f64(*c).unwrap();
                Bar {
                    symbol: "BTCUSDT".to_string(),
                    timestamp: t0() + Duration::hours(i as i64),
                    open: close,
                    high: close + Decimal::from(2),
                    low: close - Decimal::from(2),
                    close,
                    volume: Decimal::from(10 + (i % 3) as i64),
                }
            })
            .collect()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ramp(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        bars_from_closes(&closes)
    }

    #[test]
    fn test_baseline_features() {
        let bars = ramp(30);
        let engine = FeatureEngine::new();
        let columns = cols(&["lag_1h", "lag_2h", "lag_24h", "sma_10h", "price_change_1h"]);

        let fv = engine
            .build(&bars, t0() + Duration::hours(100), 3, &columns)
            .unwrap();

        // Anchor is bar 29, close 129
        assert_eq!(fv.base_timestamp, t0() + Duration::hours(29));
        assert_eq!(fv.base_price, 129.0);
        assert_eq!(fv.values, vec![128.0, 127.0, 105.0, 124.5, 1.0]);
        assert_eq!(fv.columns, columns);
    }

    #[test]
    fn test_output_order_follows_config() {
        let bars = ramp(30);
        let engine = FeatureEngine::new();

        let fv = engine
            .build(&bars, t0() + Duration::hours(29), 3, &cols(&["price_change_1h", "lag_1h"]))
            .unwrap();
        assert_eq!(fv.values, vec![1.0, 128.0]);
        assert_eq!(fv.get("lag_1h"), Some(128.0));
    }

    #[test]
    fn test_cutoff_excludes_future_bars() {
        let mut bars = ramp(30);
        // A spike after the cutoff must not leak into any feature
        bars.push(Bar {
            close: Decimal::from(1_000_000),
            high: Decimal::from(1_000_001),
            ..bars_from_closes(&[0.0; 31])[30].clone()
        });
        let engine = FeatureEngine::new();
        let columns = cols(&["lag_1h", "sma_10h", "volume_ma_5h"]);

        let cutoff = t0() + Duration::hours(29);
        let with_future = engine.build(&bars, cutoff, 3, &columns).unwrap();
        let without = engine.build(&bars[..30], cutoff, 3, &columns).unwrap();

        assert_eq!(with_future, without);
        assert_eq!(with_future.base_timestamp, cutoff);
    }

    #[test]
    fn test_cutoff_between_bars_anchors_on_previous_bar() {
        let bars = ramp(30);
        let engine = FeatureEngine::new();
        let cutoff = t0() + Duration::hours(20) + Duration::minutes(30);

        let fv = engine.build(&bars, cutoff, 3, &cols(&["lag_1h"])).unwrap();
        assert_eq!(fv.base_timestamp, t0() + Duration::hours(20));
        assert_eq!(fv.values, vec![119.0]);
    }

    #[test]
    fn test_insufficient_history() {
        let bars = ramp(40);
        let engine = FeatureEngine::new();
        let err = engine
            .build(&bars, t0() + Duration::hours(100), 24, &cols(&["lag_1h", "lag_48h"]))
            .unwrap_err();

        match err {
            ForecastError::InsufficientHistory {
                required,
                available,
            } => {
                assert_eq!(required, 49);
                assert_eq!(available, 40);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_gated_column_below_threshold_is_mismatch() {
        let bars = ramp(200);
        let engine = FeatureEngine::new();

        let err = engine
            .build(&bars, t0() + Duration::hours(300), 3, &cols(&["lag_1h", "lag_48h"]))
            .unwrap_err();
        assert!(matches!(err, ForecastError::FeatureConfigMismatch { horizon: 3, .. }));

        let ok = engine.build(&bars, t0() + Duration::hours(300), 24, &cols(&["lag_1h", "lag_48h"]));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_and_duplicate_columns() {
        let engine = FeatureEngine::new();
        assert!(matches!(
            engine.resolve(&cols(&["rsi_14"]), 3),
            Err(ForecastError::FeatureConfigMismatch { .. })
        ));
        assert!(matches!(
            engine.resolve(&cols(&["lag_1h", "lag_1h"]), 3),
            Err(ForecastError::FeatureConfigMismatch { .. })
        ));
    }

    #[test]
    fn test_required_history_tracks_longest_lookback() {
        let engine = FeatureEngine::new();
        assert_eq!(engine.required_history(&cols(&["lag_1h", "sma_10h"]), 3).unwrap(), 10);
        assert_eq!(engine.required_history(&cols(&["lag_24h"]), 3).unwrap(), 25);
        assert_eq!(engine.required_history(&cols(&["sma_168h", "lag_168h"]), 168).unwrap(), 169);
    }

    #[test]
    fn test_statistical_features() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * (1.01f64).powi(i)).collect();
        let bars = bars_from_closes(&closes);
        let engine = FeatureEngine::new();
        let cutoff = t0() + Duration::hours(29);

        let fv = engine
            .build(
                &bars,
                cutoff,
                3,
                &cols(&["log_return_1h", "volatility_5h", "price_range", "hour_sin", "hour_cos"]),
            )
            .unwrap();

        assert!((fv.values[0] - 1.01f64.ln()).abs() < 1e-9);
        // Constant growth means zero dispersion of returns
        assert!(fv.values[1].abs() < 1e-9);
        assert!((fv.values[2] - 4.0 / closes[29]).abs() < 1e-9);
        // Anchor hour is 05:00
        let angle = 2.0 * PI * 5.0 / 24.0;
        assert!((fv.values[3] - angle.sin()).abs() < 1e-12);
        assert!((fv.values[4] - angle.cos()).abs() < 1e-12);
    }

    #[test]
    fn test_volume_zscore_flat_volume_is_zero() {
        let mut bars = ramp(30);
        for b in &mut bars {
            b.volume = Decimal::from(7);
        }
        let engine = FeatureEngine::new();
        let fv = engine
            .build(&bars, t0() + Duration::hours(29), 3, &cols(&["volume_zscore_24h"]))
            .unwrap();
        assert_eq!(fv.values, vec![0.0]);
    }

    #[test]
    fn test_unordered_window_rejected() {
        let mut bars = ramp(12);
        bars.swap(4, 5);
        let engine = FeatureEngine::new();
        let err = engine
            .build(&bars, t0() + Duration::hours(20), 3, &cols(&["lag_1h"]))
            .unwrap_err();
        assert!(matches!(err, ForecastError::BarStore { .. }));
    }

    #[test]
    fn test_non_positive_price_fails_instead_of_nan() {
        let mut closes: Vec<f64> = (0..5).map(|i| 100.0 + i as f64).collect();
        closes[3] = 0.0;
        let bars = bars_from_closes(&closes);
        let engine = FeatureEngine::new();

        let err = engine
            .build(&bars, t0() + Duration::hours(4), 3, &cols(&["log_return_1h"]))
            .unwrap_err();
        assert!(matches!(err, ForecastError::BarStore { .. }));
    }

    #[test]
    fn test_indicators_on_steady_ramp() {
        let bars = ramp(120);
        let engine = FeatureEngine::new();
        let columns = cols(&["macd_safe", "macdh_safe", "rsi_safe", "atr_safe_norm"]);
        let fv = engine
            .build(&bars, t0() + Duration::hours(119), 3, &columns)
            .unwrap();

        // EMA lag on a unit slope is (n - 1) / 2, so MACD settles at 12.5 - 5.5
        assert!((fv.values[0] - 7.0).abs() < 0.05, "macd {}", fv.values[0]);
        assert!(fv.values[1].abs() < 0.05, "histogram {}", fv.values[1]);
        // Only gains in the window
        assert!(fv.values[2] > 99.9, "rsi {}", fv.values[2]);
        // True range is always high - low = 4; previous close is 218
        assert!((fv.values[3] - 4.0 / 218.0).abs() < 1e-9, "atr {}", fv.values[3]);
    }

    #[test]
    fn test_rsi_falls_on_declining_prices() {
        let closes: Vec<f64> = (0..80).map(|i| 500.0 - i as f64).collect();
        let bars = bars_from_closes(&closes);
        let fv = FeatureEngine::new()
            .build(&bars, t0() + Duration::hours(79), 3, &cols(&["rsi_safe"]))
            .unwrap();
        assert!(fv.values[0] < 0.1, "rsi {}", fv.values[0]);
    }

    #[test]
    fn test_indicators_ignore_the_anchor_bar() {
        let columns = cols(&["macd_safe", "macds_safe", "rsi_safe", "atr_safe_norm"]);
        let engine = FeatureEngine::new();
        let cutoff = t0() + Duration::hours(119);

        let bars = ramp(120);
        let mut shocked = bars.clone();
        let last = shocked.last_mut().unwrap();
        last.close = Decimal::from(10);
        last.low = Decimal::from(5);
        last.open = Decimal::from(10);

        let a = engine.build(&bars, cutoff, 3, &columns).unwrap();
        let b = engine.build(&shocked, cutoff, 3, &columns).unwrap();
        assert_eq!(a.values, b.values);

        // The anchor-based log return does move
        let lr = cols(&["log_return_1h"]);
        assert_ne!(
            engine.build(&bars, cutoff, 3, &lr).unwrap().values,
            engine.build(&shocked, cutoff, 3, &lr).unwrap().values
        );
    }

    #[test]
    fn test_indicator_history_requirement() {
        let engine = FeatureEngine::new();
        assert_eq!(engine.required_history(&cols(&["macd_safe"]), 3).unwrap(), 105);
        assert_eq!(engine.required_history(&cols(&["rsi_safe", "lag_1h"]), 3).unwrap(), 57);

        let err = engine
            .build(&ramp(56), t0() + Duration::hours(100), 3, &cols(&["rsi_safe"]))
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory {
                required: 57,
                available: 56
            }
        ));
    }

    #[test]
    fn test_inconsistent_ohlc_rejected_for_atr() {
        let mut bars = ramp(60);
        // low above high
        bars[40].low = bars[40].high + Decimal::from(1);
        let err = FeatureEngine::new()
            .build(&bars, t0() + Duration::hours(59), 3, &cols(&["atr_safe_norm"]))
            .unwrap_err();
        assert!(matches!(err, ForecastError::BarStore { .. }));
    }

    #[test]
    fn test_sequence_rows_oldest_first() {
        let bars = ramp(30);
        let engine = FeatureEngine::new();
        let columns = cols(&["lag_1h", "price_change_1h"]);

        assert_eq!(engine.required_sequence_history(&columns, 3, 4).unwrap(), 5);

        let fv = engine
            .build_sequence(&bars, t0() + Duration::hours(29), 3, &columns, 4)
            .unwrap();
        assert_eq!(fv.steps, 4);
        assert_eq!(fv.base_timestamp, t0() + Duration::hours(29));
        // Anchors at closes 126..=129
        assert_eq!(fv.values, vec![125.0, 1.0, 126.0, 1.0, 127.0, 1.0, 128.0, 1.0]);
        assert_eq!(fv.row(0), Some(&[125.0, 1.0][..]));
        assert_eq!(fv.get("lag_1h"), Some(128.0));

        let single = engine
            .build(&bars, t0() + Duration::hours(29), 3, &columns)
            .unwrap();
        assert_eq!(fv.row(3), Some(single.as_slice()));
    }

    #[test]
    fn test_sequence_rows_respect_cutoff_and_history() {
        let bars = ramp(30);
        let engine = FeatureEngine::new();
        let columns = cols(&["hour_sin"]);

        let fv = engine
            .build_sequence(&bars, t0() + Duration::hours(10), 3, &columns, 3)
            .unwrap();
        let expected: Vec<f64> = (8..=10).map(|h| (2.0 * PI * h as f64 / 24.0).sin()).collect();
        assert_eq!(fv.values, expected);

        let err = engine
            .build_sequence(&bars, t0() + Duration::hours(10), 3, &cols(&["lag_2h"]), 10)
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory {
                required: 12,
                available: 11
            }
        ));

        assert!(matches!(
            engine.build_sequence(&bars, t0() + Duration::hours(10), 3, &columns, 0),
            Err(ForecastError::FeatureConfigMismatch { .. })
        ));
    }
}
