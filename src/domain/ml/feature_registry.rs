//! Feature catalog and horizon tier table.
//!
//! Every column a model may request is declared here, grouped into tiers by
//! the minimum horizon that unlocks it. Column names are part of the artifact
//! contract: renaming one is a breaking change for every trained model.

/// MACD periods used by the indicator columns.
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Streaming indicators are seeded over this many of their longest periods.
pub const INDICATOR_WARMUP_PERIODS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

/// How a feature is derived from the bar window.
///
/// The indicator kinds (`Macd`, `Rsi`, `AtrNorm`) only see bars strictly
/// before the anchor, matching how they were computed at training time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Close `k` bars before the anchor.
    Lag(usize),
    /// Mean of the last `k` closes, anchor included.
    Sma(usize),
    /// Anchor close minus the close `k` bars earlier.
    PriceChange(usize),
    /// ln(anchor close / previous close).
    LogReturn,
    /// (high - low) / close of the anchor bar.
    PriceRange,
    /// Sample std-dev of the last `k` hourly log returns.
    Volatility(usize),
    /// Mean of the last `k` volumes.
    VolumeMa(usize),
    /// Z-score of the anchor volume over the last `k` volumes.
    VolumeZScore(usize),
    HourSin,
    HourCos,
    /// MACD(12, 26, 9) over the previous closes.
    Macd(MacdOutput),
    /// RSI over the previous `k` closes.
    Rsi(usize),
    /// ATR over the previous `k` bars, divided by the previous close.
    AtrNorm(usize),
}

impl FeatureKind {
    /// Number of bars (anchor included) needed to compute this feature.
    pub fn lookback(&self) -> usize {
        match *self {
            FeatureKind::Lag(k) | FeatureKind::PriceChange(k) | FeatureKind::Volatility(k) => k + 1,
            FeatureKind::Sma(k) | FeatureKind::VolumeMa(k) | FeatureKind::VolumeZScore(k) => k,
            FeatureKind::LogReturn => 2,
            FeatureKind::PriceRange | FeatureKind::HourSin | FeatureKind::HourCos => 1,
            FeatureKind::Macd(_) => INDICATOR_WARMUP_PERIODS * MACD_SLOW + 1,
            FeatureKind::Rsi(k) | FeatureKind::AtrNorm(k) => INDICATOR_WARMUP_PERIODS * k + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub kind: FeatureKind,
}

/// Features unlocked once the requested horizon reaches `min_horizon`.
#[derive(Debug, Clone, Copy)]
pub struct FeatureTier {
    pub min_horizon: u32,
    pub features: &'static [FeatureSpec],
}

const fn spec(name: &'static str, kind: FeatureKind) -> FeatureSpec {
    FeatureSpec { name, kind }
}

pub const FEATURE_TIERS: &[FeatureTier] = &[
    FeatureTier {
        min_horizon: 0,
        features: &[
            spec("lag_1h", FeatureKind::Lag(1)),
            spec("lag_2h", FeatureKind::Lag(2)),
            spec("lag_24h", FeatureKind::Lag(24)),
            spec("sma_10h", FeatureKind::Sma(10)),
            spec("price_change_1h", FeatureKind::PriceChange(1)),
            spec("log_return_1h", FeatureKind::LogReturn),
            spec("price_range", FeatureKind::PriceRange),
            spec("volatility_5h", FeatureKind::Volatility(5)),
            spec("volatility_14h", FeatureKind::Volatility(14)),
            spec("volume_ma_5h", FeatureKind::VolumeMa(5)),
            spec("volume_zscore_24h", FeatureKind::VolumeZScore(24)),
            spec("hour_sin", FeatureKind::HourSin),
            spec("hour_cos", FeatureKind::HourCos),
            spec("macd_safe", FeatureKind::Macd(MacdOutput::Line)),
            spec("macds_safe", FeatureKind::Macd(MacdOutput::Signal)),
            spec("macdh_safe", FeatureKind::Macd(MacdOutput::Histogram)),
            spec("rsi_safe", FeatureKind::Rsi(14)),
            spec("atr_safe_norm", FeatureKind::AtrNorm(14)),
        ],
    },
    FeatureTier {
        min_horizon: 24,
        features: &[
            spec("lag_48h", FeatureKind::Lag(48)),
            spec("sma_24h", FeatureKind::Sma(24)),
            spec("price_change_24h", FeatureKind::PriceChange(24)),
        ],
    },
    FeatureTier {
        min_horizon: 168,
        features: &[
            spec("lag_168h", FeatureKind::Lag(168)),
            spec("sma_168h", FeatureKind::Sma(168)),
        ],
    },
];

/// Columns the baseline models were trained on.
pub const BASELINE_FEATURES: &[&str] = &["lag_1h", "lag_2h", "lag_24h", "sma_10h", "price_change_1h"];

/// Finds a feature by name, returning its spec and the tier threshold.
pub fn lookup(tiers: &[FeatureTier], name: &str) -> Option<(FeatureSpec, u32)> {
    tiers.iter().find_map(|tier| {
        tier.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| (*f, tier.min_horizon))
    })
}

/// All features available at `horizon`, in tier order.
pub fn available_for(tiers: &[FeatureTier], horizon: u32) -> Vec<FeatureSpec> {
    tiers
        .iter()
        .filter(|tier| horizon >= tier.min_horizon)
        .flat_map(|tier| tier.features.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_feature_names_unique() {
        let mut seen = HashSet::new();
        for tier in FEATURE_TIERS {
            for f in tier.features {
                assert!(seen.insert(f.name), "duplicate feature {}", f.name);
            }
        }
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(lookup(FEATURE_TIERS, "lag_1h").map(|(_, t)| t), Some(0));
        assert_eq!(lookup(FEATURE_TIERS, "lag_48h").map(|(_, t)| t), Some(24));
        assert_eq!(lookup(FEATURE_TIERS, "sma_168h").map(|(_, t)| t), Some(168));
        assert!(lookup(FEATURE_TIERS, "lag_999h").is_none());
    }

    #[test]
    fn test_available_grows_with_horizon() {
        let short = available_for(FEATURE_TIERS, 3);
        let day = available_for(FEATURE_TIERS, 24);
        let week = available_for(FEATURE_TIERS, 168);

        assert!(short.iter().all(|f| f.name != "lag_48h"));
        assert!(day.iter().any(|f| f.name == "lag_48h"));
        assert!(day.iter().all(|f| f.name != "lag_168h"));
        assert!(short.len() < day.len() && day.len() < week.len());
    }

    #[test]
    fn test_lookback() {
        assert_eq!(FeatureKind::Lag(48).lookback(), 49);
        assert_eq!(FeatureKind::Sma(168).lookback(), 168);
        assert_eq!(FeatureKind::Volatility(5).lookback(), 6);
        assert_eq!(FeatureKind::HourSin.lookback(), 1);
        assert_eq!(FeatureKind::Macd(MacdOutput::Signal).lookback(), 105);
        assert_eq!(FeatureKind::Rsi(14).lookback(), 57);
        assert_eq!(FeatureKind::AtrNorm(14).lookback(), 57);
    }

    #[test]
    fn test_baseline_features_are_base_tier() {
        for name in BASELINE_FEATURES {
            assert_eq!(lookup(FEATURE_TIERS, name).map(|(_, t)| t), Some(0));
        }
    }
}
