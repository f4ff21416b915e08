use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// One hourly OHLCV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Float view of a bar, used at the numeric boundary of feature computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarValues {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Converts the price/volume columns to f64.
    ///
    /// Returns `None` if any column does not fit an f64.
    pub fn values(&self) -> Option<BarValues> {
        Some(BarValues {
            open: self.open.to_f64()?,
            high: self.high.to_f64()?,
            low: self.low.to_f64()?,
            close: self.close.to_f64()?,
            volume: self.volume.to_f64()?,
        })
    }
}

/// Checks that a window is strictly increasing in time.
///
/// Returns the offending index on failure.
pub fn first_unordered(bars: &[Bar]) -> Option<usize> {
    bars.windows(2)
        .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        .map(|i| i + 1)
}
