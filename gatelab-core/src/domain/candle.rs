//! Candle — the fundamental market data unit, plus the validated series.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{DatasetHash, WindowHash};

/// OHLCV candle for a single symbol on a single timeframe.
///
/// Immutable once ingested. Volume is `f64` because crypto venues report
/// fractional base-asset volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any OHLCV field is NaN (void candle).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, range contains open and close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Errors raised while validating a candle series at ingest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeriesError {
    #[error("candle series is empty")]
    Empty,
    #[error("timestamps not strictly increasing at index {index}")]
    OutOfOrder { index: usize },
    #[error("duplicate timestamp at index {index}")]
    Duplicate { index: usize },
}

/// A validated, immutable candle series.
///
/// Invariants (checked once at construction, relied on everywhere after):
/// - non-empty
/// - timestamps strictly increasing (implies no duplicates)
///
/// Loaded once per replay run and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    symbol: String,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Result<Self, SeriesError> {
        if candles.is_empty() {
            return Err(SeriesError::Empty);
        }
        for i in 1..candles.len() {
            if candles[i].ts == candles[i - 1].ts {
                return Err(SeriesError::Duplicate { index: i });
            }
            if candles[i].ts < candles[i - 1].ts {
                return Err(SeriesError::OutOfOrder { index: i });
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Content hash of the whole series. Part of the run identity.
    pub fn dataset_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.symbol.as_bytes());
        for c in &self.candles {
            hasher.update(&c.ts.and_utc().timestamp_millis().to_le_bytes());
            hasher.update(&c.open.to_le_bytes());
            hasher.update(&c.high.to_le_bytes());
            hasher.update(&c.low.to_le_bytes());
            hasher.update(&c.close.to_le_bytes());
            hasher.update(&c.volume.to_le_bytes());
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }

    /// Content hash of the window `[start, end]` (inclusive).
    ///
    /// Used in cache keys: two windows with identical bar content but
    /// different positions still hash differently because the indices are
    /// folded in. A coarse proxy (e.g. last close rounded) would collide
    /// across distinct windows.
    pub fn window_hash(&self, start: usize, end: usize) -> WindowHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(start as u64).to_le_bytes());
        hasher.update(&(end as u64).to_le_bytes());
        for c in &self.candles[start..=end.min(self.candles.len() - 1)] {
            hasher.update(&c.ts.and_utc().timestamp_millis().to_le_bytes());
            hasher.update(&c.open.to_le_bytes());
            hasher.update(&c.high.to_le_bytes());
            hasher.update(&c.low.to_le_bytes());
            hasher.update(&c.close.to_le_bytes());
            hasher.update(&c.volume.to_le_bytes());
        }
        WindowHash(hasher.finalize().to_hex().to_string())
    }

    /// Truncate to the first `len` candles. Used by no-lookahead tests.
    pub fn truncated(&self, len: usize) -> Result<Self, SeriesError> {
        Self::new(self.symbol.clone(), self.candles[..len.min(self.candles.len())].to_vec())
    }
}
