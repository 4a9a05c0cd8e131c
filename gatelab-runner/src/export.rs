//! Artifact export — trades to CSV, equity to CSV, full artifact to JSON.

use std::path::Path;

use anyhow::{Context, Result};

use gatelab_core::replay::BacktestArtifact;

/// Write the full artifact as JSON (the reproducibility record).
pub fn write_artifact_json(artifact: &BacktestArtifact, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact).context("serializing artifact")?;
    std::fs::write(path.as_ref(), json)
        .with_context(|| format!("writing {}", path.as_ref().display()))?;
    Ok(())
}

/// Read an artifact back from JSON.
pub fn read_artifact_json(path: impl AsRef<Path>) -> Result<BacktestArtifact> {
    let raw = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading {}", path.as_ref().display()))?;
    serde_json::from_str(&raw).context("deserializing artifact")
}

/// Write the trade list as CSV.
pub fn write_trades_csv(artifact: &BacktestArtifact, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    writer.write_record([
        "side",
        "entry_bar",
        "entry_ts",
        "entry_price",
        "exit_bar",
        "exit_ts",
        "exit_price",
        "exit_reason",
        "size",
        "gross_pnl",
        "commission",
        "net_pnl",
        "bars_held",
    ])?;
    for t in &artifact.trades {
        writer.write_record([
            format!("{:?}", t.side),
            t.entry_bar.to_string(),
            t.entry_ts.to_string(),
            t.entry_price.to_string(),
            t.exit_bar.to_string(),
            t.exit_ts.to_string(),
            t.exit_price.to_string(),
            format!("{:?}", t.exit_reason),
            t.size.to_string(),
            t.gross_pnl.to_string(),
            t.commission.to_string(),
            t.net_pnl.to_string(),
            t.bars_held.to_string(),
        ])?;
    }
    writer.flush().context("flushing trades csv")?;
    Ok(())
}

/// Write the equity curve as CSV (bar index, equity).
pub fn write_equity_csv(artifact: &BacktestArtifact, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("creating {}", path.as_ref().display()))?;
    writer.write_record(["bar", "equity"])?;
    for (i, eq) in artifact.equity_curve.iter().enumerate() {
        writer.write_record([i.to_string(), eq.to_string()])?;
    }
    writer.flush().context("flushing equity csv")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatelab_core::config::FeatureMode;
    use gatelab_core::domain::{ConfigHash, DatasetHash};
    use gatelab_core::replay::{ReplayDiagnostics, RunMetadata};

    fn sample_artifact() -> BacktestArtifact {
        BacktestArtifact {
            metadata: RunMetadata::new(
                FeatureMode::Recompute,
                ConfigHash("cfg".into()),
                DatasetHash("data".into()),
                1,
                "test",
            ),
            equity_curve: vec![10_000.0, 10_100.0, 10_050.0],
            trades: vec![],
            final_equity: 10_050.0,
            diagnostics: ReplayDiagnostics::default(),
        }
    }

    #[test]
    fn artifact_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        let artifact = sample_artifact();
        write_artifact_json(&artifact, &path).unwrap();
        let restored = read_artifact_json(&path).unwrap();
        assert_eq!(restored.final_equity, artifact.final_equity);
        assert_eq!(restored.metadata.run_id, artifact.metadata.run_id);
    }

    #[test]
    fn equity_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equity.csv");
        write_equity_csv(&sample_artifact(), &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[0], "bar,equity");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn trades_csv_writes_header_for_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        write_trades_csv(&sample_artifact(), &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("side,entry_bar"));
    }
}
