//! Candle loading from CSV.
//!
//! Expected columns: `ts` (unix milliseconds), `open`, `high`, `low`,
//! `close`, `volume`. Ordering and duplicate checks are delegated to
//! `CandleSeries`, which is the single gatekeeper for series invariants.

use std::path::Path;

use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;

use gatelab_core::domain::{Candle, CandleSeries, SeriesError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid timestamp {ts}")]
    BadTimestamp { row: usize, ts: i64 },
    #[error("series rejected: {0}")]
    Series(#[from] SeriesError),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load a candle series from a CSV file.
pub fn load_candles_csv(
    path: impl AsRef<Path>,
    symbol: impl Into<String>,
) -> Result<CandleSeries, LoadError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut candles = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let ts = DateTime::from_timestamp_millis(row.ts)
            .ok_or(LoadError::BadTimestamp { row: i, ts: row.ts })?
            .naive_utc();
        candles.push(Candle {
            ts,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(CandleSeries::new(symbol, candles)?)
}
