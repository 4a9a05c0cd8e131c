//! Strategy configuration — explicit fields, load-time validation, canonical hashing.
//!
//! Every recognized option is an explicit field; nothing is derived from the
//! environment. Validation runs once, before any bar is processed, and
//! rejects self-contradictory configurations instead of resolving them
//! silently. The config hash is part of every cache key and every run id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ConfigHash;
use crate::regime::Regime;

/// How features are computed during replay.
///
/// `Precomputed` asserts that an index-aligned indicator table is supplied;
/// the replay engine hard-fails if it is absent (no silent slow-path
/// fallback when runs are being compared deterministically). `Recompute`
/// derives everything from the candle window and may use a verified table
/// opportunistically, recording a one-time warning on fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureMode {
    Precomputed,
    Recompute,
}

/// Policy when a Fibonacci context reports `available = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPolicy {
    /// The gate blocks the candidate.
    Block,
    /// The gate is inconclusive and lets the candidate through.
    Pass,
}

/// ATR-percentile volatility zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtrZone {
    Low,
    Mid,
    High,
}

/// One value per ATR zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneValues {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl ZoneValues {
    pub fn uniform(v: f64) -> Self {
        Self { low: v, mid: v, high: v }
    }

    pub fn get(&self, zone: AtrZone) -> f64 {
        match zone {
            AtrZone::Low => self.low,
            AtrZone::Mid => self.mid,
            AtrZone::High => self.high,
        }
    }
}

/// One value per market regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeValues<T> {
    pub bull: T,
    pub bear: T,
    pub ranging: T,
    pub balanced: T,
}

impl<T: Clone> RegimeValues<T> {
    pub fn uniform(v: T) -> Self {
        Self {
            bull: v.clone(),
            bear: v.clone(),
            ranging: v.clone(),
            balanced: v,
        }
    }

    pub fn get(&self, regime: Regime) -> &T {
        match regime {
            Regime::Bull => &self.bull,
            Regime::Bear => &self.bear,
            Regime::Ranging => &self.ranging,
            Regime::Balanced => &self.balanced,
        }
    }
}

/// Entry-probability thresholds.
///
/// Exactly one source may be configured: either the per-regime, per-zone
/// `table`, or the `flat` legacy value (expanded to a uniform table at
/// resolution time). Setting both is a load-time error — two independently
/// drifting copies of the same knob are how silent shadowing bugs start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub table: Option<RegimeValues<ZoneValues>>,
    pub flat: Option<f64>,
}

impl ThresholdConfig {
    pub fn from_table(table: RegimeValues<ZoneValues>) -> Self {
        Self {
            table: Some(table),
            flat: None,
        }
    }

    pub fn from_flat(value: f64) -> Self {
        Self {
            table: None,
            flat: Some(value),
        }
    }

    /// The single threshold-resolution function.
    ///
    /// Callers must have validated the config first; after validation
    /// exactly one source exists.
    pub fn resolve(&self, regime: Regime, zone: AtrZone) -> f64 {
        match (&self.table, self.flat) {
            (Some(table), None) => table.get(regime).get(zone),
            (None, Some(flat)) => flat,
            // Unreachable after validation; fall back to the strictest
            // interpretation so an unvalidated config cannot under-gate.
            (Some(table), Some(flat)) => table.get(regime).get(zone).max(flat),
            (None, None) => 1.0,
        }
    }
}

/// Expected-value filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvConfig {
    /// Payoff ratio: average win size relative to average loss size.
    pub payoff_ratio: f64,
    /// Round-trip cost estimate, in the same risk units as the payoff.
    pub cost: f64,
    /// Minimum probability separation between the winning and losing side
    /// after the threshold check.
    pub min_edge: f64,
}

/// ATR-percentile zone boundaries and the percentile window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrZoneConfig {
    /// Percentile below which volatility counts as the low zone.
    pub low_max: f64,
    /// Percentile at or above which volatility counts as the high zone.
    pub high_min: f64,
    /// Rolling window over which the ATR percentile is ranked.
    pub percentile_window: usize,
}

/// One row of the risk map: minimum confidence → position size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMapRow {
    pub min_confidence: f64,
    pub size: f64,
}

/// Monotonic piecewise table mapping confidence to position size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMap {
    /// Rows sorted by `min_confidence` ascending; sizes non-decreasing.
    pub rows: Vec<RiskMapRow>,
}

impl RiskMap {
    /// Size for a confidence value: the last row whose floor is cleared,
    /// or 0.0 below the first row (a deliberate zero, not an error).
    pub fn size_for(&self, confidence: f64) -> f64 {
        let mut size = 0.0;
        for row in &self.rows {
            if confidence >= row.min_confidence {
                size = row.size;
            } else {
                break;
            }
        }
        size
    }
}

/// Per-timeframe Fibonacci gate parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibGateConfig {
    /// Bars scanned for the swing high/low.
    pub swing_lookback: usize,
    /// Proximity tolerance to a retracement level, in ATR units.
    pub tolerance_atr: f64,
    pub missing_policy: MissingPolicy,
}

/// Fibonacci gating across both timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibConfig {
    pub htf: FibGateConfig,
    pub ltf: FibGateConfig,
    /// Candles per higher-timeframe bucket (e.g. 4 for 1h→4h).
    pub htf_bucket: usize,
    /// When true, an LTF proximity hit within half the LTF tolerance
    /// overrides an HTF block.
    pub ltf_override: bool,
}

/// Confidence calculation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Cap on the volume-ratio quality term. Values above 1.0 let the
    /// composite score overshoot 1.0 slightly; this is preserved behavior,
    /// not clamped (see DESIGN.md).
    pub volume_ratio_cap: f64,
    /// Per-regime confidence floor for the final entry gate.
    pub entry_floor: RegimeValues<f64>,
}

/// Exit thresholds, expressed in ATR multiples where price-relative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    pub stop_loss_atr: Option<f64>,
    pub take_profit_atr: Option<f64>,
    pub max_holding_bars: Option<usize>,
    pub confidence_exit_floor: Option<f64>,
    pub exit_on_regime_change: bool,
    pub htf_trailing_mult: Option<f64>,
    /// Round-trip commission as a fraction of notional, charged at exit.
    pub commission_pct: f64,
}

/// Regime classifier parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Consecutive bars a new classification must persist before the
    /// reported regime switches.
    pub persistence_bars: usize,
    /// Window for trend strength and slope.
    pub trend_window: usize,
    /// Window for the volatility percentile input.
    pub vol_window: usize,
}

/// Indicator periods feeding the feature extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub atr_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    /// Window for the volume-ratio feature (current volume vs rolling mean).
    pub volume_window: usize,
}

/// Complete strategy configuration.
///
/// Construct with `StrategyConfig::defaults()` and override fields, or
/// deserialize from the runner's TOML. Always `validate()` before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub mode: FeatureMode,
    pub thresholds: ThresholdConfig,
    pub ev: EvConfig,
    pub atr_zones: AtrZoneConfig,
    pub risk_map: RiskMap,
    pub fib: FibConfig,
    pub hysteresis_bars: usize,
    pub cooldown_bars: usize,
    pub confidence: ConfidenceConfig,
    pub exits: ExitConfig,
    pub regime: RegimeConfig,
    pub features: FeatureConfig,
    /// Hard ceiling on position size, whatever the risk map says.
    pub max_position: f64,
    /// Feature-cache capacity (entries), LRU-evicted.
    pub cache_capacity: usize,
    /// Abort the run once per-bar errors exceed this fraction of bars.
    pub error_rate_ceiling: f64,
}

/// Invalid or self-contradictory configuration, rejected at load time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("both a threshold table and a flat threshold are set; configure exactly one")]
    DualThresholdSource,
    #[error("no entry threshold configured")]
    NoThresholdSource,
    #[error("threshold {value} out of (0, 1) for {context}")]
    ThresholdOutOfRange { value: f64, context: &'static str },
    #[error("risk map is empty")]
    EmptyRiskMap,
    #[error("risk map not monotonic at row {index}")]
    NonMonotonicRiskMap { index: usize },
    #[error("risk map size {size} at row {index} outside [0, {max}]")]
    RiskMapSizeOutOfRange { index: usize, size: f64, max: f64 },
    #[error("ATR zone boundaries must satisfy 0 < low_max < high_min < 1, got {low} / {high}")]
    BadZoneBoundaries { low: f64, high: f64 },
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
    #[error("{field} must be >= {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },
    #[error("error_rate_ceiling {0} out of [0, 1]")]
    BadErrorCeiling(f64),
    #[error("volume_ratio_cap {0} must be >= 1.0")]
    BadVolumeCap(f64),
}

impl StrategyConfig {
    /// Fresh nested defaults, constructed per call (no shared mutable
    /// default object anywhere).
    pub fn defaults() -> Self {
        Self {
            mode: FeatureMode::Recompute,
            thresholds: ThresholdConfig::from_table(RegimeValues {
                bull: ZoneValues { low: 0.58, mid: 0.60, high: 0.64 },
                bear: ZoneValues { low: 0.58, mid: 0.60, high: 0.64 },
                ranging: ZoneValues { low: 0.62, mid: 0.65, high: 0.70 },
                balanced: ZoneValues { low: 0.60, mid: 0.62, high: 0.66 },
            }),
            ev: EvConfig {
                payoff_ratio: 1.5,
                cost: 0.001,
                min_edge: 0.05,
            },
            atr_zones: AtrZoneConfig {
                low_max: 0.33,
                high_min: 0.66,
                percentile_window: 100,
            },
            risk_map: RiskMap {
                rows: vec![
                    RiskMapRow { min_confidence: 0.3, size: 0.25 },
                    RiskMapRow { min_confidence: 0.5, size: 0.5 },
                    RiskMapRow { min_confidence: 0.7, size: 0.75 },
                    RiskMapRow { min_confidence: 0.85, size: 1.0 },
                ],
            },
            fib: FibConfig {
                htf: FibGateConfig {
                    swing_lookback: 50,
                    tolerance_atr: 1.0,
                    missing_policy: MissingPolicy::Pass,
                },
                ltf: FibGateConfig {
                    swing_lookback: 20,
                    tolerance_atr: 0.75,
                    missing_policy: MissingPolicy::Pass,
                },
                htf_bucket: 4,
                ltf_override: false,
            },
            hysteresis_bars: 3,
            cooldown_bars: 5,
            confidence: ConfidenceConfig {
                volume_ratio_cap: 1.2,
                entry_floor: RegimeValues {
                    bull: 0.35,
                    bear: 0.35,
                    ranging: 0.45,
                    balanced: 0.40,
                },
            },
            exits: ExitConfig {
                stop_loss_atr: Some(2.0),
                take_profit_atr: Some(3.0),
                max_holding_bars: Some(48),
                confidence_exit_floor: Some(0.2),
                exit_on_regime_change: true,
                htf_trailing_mult: Some(2.5),
                commission_pct: 0.0006,
            },
            regime: RegimeConfig {
                persistence_bars: 2,
                trend_window: 20,
                vol_window: 100,
            },
            features: FeatureConfig {
                atr_period: 14,
                ema_fast: 12,
                ema_slow: 26,
                rsi_period: 14,
                volume_window: 20,
            },
            max_position: 1.0,
            cache_capacity: 4096,
            error_rate_ceiling: 0.05,
        }
    }

    /// Reject invalid or self-contradictory configurations.
    ///
    /// Runs before any bar is processed; a config that fails here never
    /// reaches the replay loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.thresholds.table, self.thresholds.flat) {
            (Some(_), Some(_)) => return Err(ConfigError::DualThresholdSource),
            (None, None) => return Err(ConfigError::NoThresholdSource),
            _ => {}
        }

        let check_threshold = |v: f64, context: &'static str| {
            if !v.is_finite() || v <= 0.0 || v >= 1.0 {
                Err(ConfigError::ThresholdOutOfRange { value: v, context })
            } else {
                Ok(())
            }
        };
        if let Some(flat) = self.thresholds.flat {
            check_threshold(flat, "flat")?;
        }
        if let Some(table) = &self.thresholds.table {
            for (zones, context) in [
                (&table.bull, "bull"),
                (&table.bear, "bear"),
                (&table.ranging, "ranging"),
                (&table.balanced, "balanced"),
            ] {
                check_threshold(zones.low, context)?;
                check_threshold(zones.mid, context)?;
                check_threshold(zones.high, context)?;
            }
        }

        if self.risk_map.rows.is_empty() {
            return Err(ConfigError::EmptyRiskMap);
        }
        for (i, row) in self.risk_map.rows.iter().enumerate() {
            if !(0.0..=self.max_position).contains(&row.size) || !row.size.is_finite() {
                return Err(ConfigError::RiskMapSizeOutOfRange {
                    index: i,
                    size: row.size,
                    max: self.max_position,
                });
            }
            if i > 0 {
                let prev = &self.risk_map.rows[i - 1];
                if row.min_confidence <= prev.min_confidence || row.size < prev.size {
                    return Err(ConfigError::NonMonotonicRiskMap { index: i });
                }
            }
        }

        let z = &self.atr_zones;
        if !(z.low_max > 0.0 && z.low_max < z.high_min && z.high_min < 1.0) {
            return Err(ConfigError::BadZoneBoundaries {
                low: z.low_max,
                high: z.high_min,
            });
        }
        if z.percentile_window < 2 {
            return Err(ConfigError::TooSmall {
                field: "atr_zones.percentile_window",
                min: 2,
                value: z.percentile_window,
            });
        }

        if self.ev.payoff_ratio <= 0.0 {
            return Err(ConfigError::NonPositive { field: "ev.payoff_ratio" });
        }
        if self.ev.cost < 0.0 {
            return Err(ConfigError::NonPositive { field: "ev.cost" });
        }
        if self.ev.min_edge < 0.0 || self.ev.min_edge >= 1.0 {
            return Err(ConfigError::ThresholdOutOfRange {
                value: self.ev.min_edge,
                context: "ev.min_edge",
            });
        }

        for (cfg, lookback_field) in [
            (&self.fib.htf, "fib.htf.swing_lookback"),
            (&self.fib.ltf, "fib.ltf.swing_lookback"),
        ] {
            if cfg.swing_lookback < 2 {
                return Err(ConfigError::TooSmall {
                    field: lookback_field,
                    min: 2,
                    value: cfg.swing_lookback,
                });
            }
            if cfg.tolerance_atr <= 0.0 {
                return Err(ConfigError::NonPositive { field: "fib.tolerance_atr" });
            }
        }
        if self.fib.htf_bucket < 2 {
            return Err(ConfigError::TooSmall {
                field: "fib.htf_bucket",
                min: 2,
                value: self.fib.htf_bucket,
            });
        }

        if self.confidence.volume_ratio_cap < 1.0 {
            return Err(ConfigError::BadVolumeCap(self.confidence.volume_ratio_cap));
        }

        if !(0.0..=1.0).contains(&self.error_rate_ceiling) {
            return Err(ConfigError::BadErrorCeiling(self.error_rate_ceiling));
        }

        if self.cache_capacity == 0 {
            return Err(ConfigError::TooSmall {
                field: "cache_capacity",
                min: 1,
                value: 0,
            });
        }
        if self.max_position <= 0.0 {
            return Err(ConfigError::NonPositive { field: "max_position" });
        }

        Ok(())
    }

    /// Canonical configuration hash.
    ///
    /// Struct fields serialize in declaration order, so the JSON is
    /// deterministic; the hash participates in every cache key and run id.
    pub fn config_hash(&self) -> ConfigHash {
        let json = serde_json::to_string(self).expect("StrategyConfig must serialize");
        ConfigHash::from_bytes(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(StrategyConfig::defaults().validate(), Ok(()));
    }

    #[test]
    fn dual_threshold_source_rejected() {
        let mut config = StrategyConfig::defaults();
        config.thresholds.flat = Some(0.6);
        assert_eq!(config.validate(), Err(ConfigError::DualThresholdSource));
    }

    #[test]
    fn missing_threshold_source_rejected() {
        let mut config = StrategyConfig::defaults();
        config.thresholds.table = None;
        config.thresholds.flat = None;
        assert_eq!(config.validate(), Err(ConfigError::NoThresholdSource));
    }

    #[test]
    fn flat_threshold_resolves_uniformly() {
        let thresholds = ThresholdConfig::from_flat(0.6);
        assert_eq!(thresholds.resolve(Regime::Bull, AtrZone::Low), 0.6);
        assert_eq!(thresholds.resolve(Regime::Ranging, AtrZone::High), 0.6);
    }

    #[test]
    fn table_threshold_resolves_per_regime_and_zone() {
        let config = StrategyConfig::defaults();
        assert_eq!(
            config.thresholds.resolve(Regime::Ranging, AtrZone::High),
            0.70
        );
        assert_eq!(config.thresholds.resolve(Regime::Bull, AtrZone::Low), 0.58);
    }

    #[test]
    fn non_monotonic_risk_map_rejected() {
        let mut config = StrategyConfig::defaults();
        config.risk_map.rows[2].size = 0.1; // drops below row 1
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonMonotonicRiskMap { index: 2 })
        );
    }

    #[test]
    fn risk_map_size_above_max_rejected() {
        let mut config = StrategyConfig::defaults();
        config.risk_map.rows[3].size = 1.5; // max_position = 1.0
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RiskMapSizeOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn risk_map_lookup() {
        let map = StrategyConfig::defaults().risk_map;
        assert_eq!(map.size_for(0.1), 0.0); // below first row: deliberate zero
        assert_eq!(map.size_for(0.3), 0.25);
        assert_eq!(map.size_for(0.69), 0.5);
        assert_eq!(map.size_for(0.99), 1.0);
    }

    #[test]
    fn bad_zone_boundaries_rejected() {
        let mut config = StrategyConfig::defaults();
        config.atr_zones.low_max = 0.8;
        config.atr_zones.high_min = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadZoneBoundaries { .. })
        ));
    }

    #[test]
    fn bad_error_ceiling_rejected() {
        let mut config = StrategyConfig::defaults();
        config.error_rate_ceiling = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::BadErrorCeiling(1.5)));
    }

    #[test]
    fn config_hash_deterministic() {
        let c1 = StrategyConfig::defaults();
        let c2 = StrategyConfig::defaults();
        assert_eq!(c1.config_hash(), c2.config_hash());
    }

    #[test]
    fn config_hash_changes_with_any_field() {
        let c1 = StrategyConfig::defaults();
        let mut c2 = StrategyConfig::defaults();
        c2.cooldown_bars += 1;
        assert_ne!(c1.config_hash(), c2.config_hash());

        let mut c3 = StrategyConfig::defaults();
        c3.fib.ltf.tolerance_atr = 0.9;
        assert_ne!(c1.config_hash(), c3.config_hash());
    }

    #[test]
    fn config_serialization_roundtrip() {
        let config = StrategyConfig::defaults();
        let json = serde_json::to_string(&config).unwrap();
        let deser: StrategyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deser);
        assert_eq!(config.config_hash(), deser.config_hash());
    }
}
