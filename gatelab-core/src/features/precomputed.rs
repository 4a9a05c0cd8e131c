//! Precomputed indicator table — index-aligned arrays for the fast path.

use std::collections::HashMap;
use thiserror::Error;

/// Why a table failed verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("precomputed table missing series '{0}'")]
    MissingSeries(String),
    #[error("series '{name}' covers {actual} bars, need {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Precomputed indicator arrays aligned to the global candle series.
///
/// `offset` is the global index of each array's element 0. A lookup for
/// global bar `i` reads `series[i - offset]` — the remapping is explicit
/// here so callers never index raw arrays when the active window does not
/// start at global index 0.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedTable {
    series: HashMap<String, Vec<f64>>,
    offset: usize,
}

impl PrecomputedTable {
    pub fn new(offset: usize) -> Self {
        Self {
            series: HashMap::new(),
            offset,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value at global bar index `global_idx`, remapped through the offset.
    /// `None` when the index falls before the offset or past the array.
    pub fn get(&self, name: &str, global_idx: usize) -> Option<f64> {
        if global_idx < self.offset {
            return None;
        }
        self.series
            .get(name)
            .and_then(|v| v.get(global_idx - self.offset).copied())
    }

    /// Verify the table covers `series_len` global bars for every required
    /// series. Run once before the bar loop; a failure in `Precomputed`
    /// mode is a hard error, in `Recompute` mode a one-time warning.
    pub fn verify(&self, required: &[String], series_len: usize) -> Result<(), TableError> {
        let needed = series_len.saturating_sub(self.offset);
        for name in required {
            match self.series.get(name) {
                None => return Err(TableError::MissingSeries(name.clone())),
                Some(values) if values.len() < needed => {
                    return Err(TableError::LengthMismatch {
                        name: name.clone(),
                        expected: needed,
                        actual: values.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_remaps_through_offset() {
        let mut table = PrecomputedTable::new(10);
        table.insert("atr_14", vec![1.0, 2.0, 3.0]);
        assert_eq!(table.get("atr_14", 10), Some(1.0));
        assert_eq!(table.get("atr_14", 12), Some(3.0));
        assert_eq!(table.get("atr_14", 9), None); // before offset
        assert_eq!(table.get("atr_14", 13), None); // past array
    }

    #[test]
    fn verify_missing_series() {
        let table = PrecomputedTable::new(0);
        let err = table.verify(&["atr_14".to_string()], 5).unwrap_err();
        assert_eq!(err, TableError::MissingSeries("atr_14".into()));
    }

    #[test]
    fn verify_length_mismatch() {
        let mut table = PrecomputedTable::new(0);
        table.insert("atr_14", vec![1.0, 2.0]);
        let err = table.verify(&["atr_14".to_string()], 5).unwrap_err();
        assert_eq!(
            err,
            TableError::LengthMismatch {
                name: "atr_14".into(),
                expected: 5,
                actual: 2
            }
        );
    }

    #[test]
    fn verify_accounts_for_offset() {
        let mut table = PrecomputedTable::new(3);
        table.insert("atr_14", vec![1.0, 2.0]);
        // 5 global bars minus offset 3 → needs 2 elements
        assert!(table.verify(&["atr_14".to_string()], 5).is_ok());
    }
}
