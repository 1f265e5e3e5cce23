//! Grid report output: console lines and CSV/JSON files

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backtest::GridReport;
use crate::ConfigurationResult;

/// One console line per cell
pub fn format_line(r: &ConfigurationResult) -> String {
    format!(
        "Threshold: {:.2} | Stop: {:.2} | Trades: {} | Win%: {:.1} | Exp: {:.2}% | Final: ${:.0}",
        r.threshold,
        r.stop_pct,
        r.trade_count,
        r.win_rate * 100.0,
        r.expectancy * 100.0,
        r.ending_capital
    )
}

/// Full console report: a line per cell, then the empty cells and best cell
pub fn render(report: &GridReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "=".repeat(90)));
    out.push_str("ROBUSTNESS GRID\n");
    out.push_str(&format!("{}\n", "=".repeat(90)));

    if report.results.is_empty() {
        out.push_str("No configuration produced a trade.\n");
    }
    for r in &report.results {
        out.push_str(&format_line(r));
        out.push('\n');
    }

    if !report.empty_cells.is_empty() {
        out.push_str(&format!("{}\n", "-".repeat(90)));
        let cells: Vec<String> = report
            .empty_cells
            .iter()
            .map(|(t, s)| format!("{:.2}/{:.2}", t, s))
            .collect();
        out.push_str(&format!("No trades (threshold/stop): {}\n", cells.join(", ")));
    }

    if let Some(best) = report.best() {
        out.push_str(&format!("{}\n", "-".repeat(90)));
        out.push_str(&format!(
            "Best expectancy: threshold {:.2}, stop {:.2}\n",
            best.threshold, best.stop_pct
        ));
        out.push_str(&format!(
            "  Longs: {}  Shorts: {}  Stop exits: {}  Profit factor: {}  Return std: {}\n",
            best.long_trades,
            best.short_trades,
            best.stop_exits,
            best.profit_factor
                .map_or_else(|| "n/a".to_string(), |pf| format!("{:.2}", pf)),
            best.return_std_dev
                .map_or_else(|| "n/a".to_string(), |sd| format!("{:.2}%", sd * 100.0)),
        ));
    }
    out.push_str(&format!("{}\n", "=".repeat(90)));
    out
}

fn timestamped(dir: &Path, ext: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results dir {}", dir.display()))?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("robustness_{}.{}", stamp, ext)))
}

/// Write `results_dir/robustness_<timestamp>.csv`
pub fn write_csv(results: &[ConfigurationResult], results_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = timestamped(results_dir.as_ref(), "csv")?;
    write_csv_to(results, &path)?;
    Ok(path)
}

pub fn write_csv_to(results: &[ConfigurationResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for r in results {
        writer.serialize(r)?;
    }
    writer.flush()?;
    info!("Results saved to: {}", path.display());
    Ok(())
}

/// Write the whole report (results and empty cells) as pretty JSON
pub fn write_json(report: &GridReport, results_dir: impl AsRef<Path>) -> Result<PathBuf> {
    #[derive(Serialize)]
    struct JsonReport<'a> {
        results: &'a [ConfigurationResult],
        empty_cells: &'a [(f64, f64)],
    }

    let path = timestamped(results_dir.as_ref(), "json")?;
    let json = serde_json::to_string_pretty(&JsonReport {
        results: &report.results,
        empty_cells: &report.empty_cells,
    })?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Results saved to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ConfigurationResult {
        ConfigurationResult {
            threshold: 0.70,
            stop_pct: 0.03,
            trade_count: 42,
            win_rate: 23.0 / 42.0,
            expectancy: 0.0061,
            ending_capital: 104_213.4,
            long_trades: 30,
            short_trades: 12,
            stop_exits: 9,
            profit_factor: Some(1.4),
            return_std_dev: Some(0.02),
        }
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(&result()),
            "Threshold: 0.70 | Stop: 0.03 | Trades: 42 | Win%: 54.8 | Exp: 0.61% | Final: $104213"
        );
    }

    #[test]
    fn test_render_lists_empty_cells() {
        let report = GridReport {
            results: vec![result()],
            empty_cells: vec![(0.80, 0.02)],
        };
        let text = render(&report);
        assert!(text.contains("No trades (threshold/stop): 0.80/0.02"));
        assert!(text.contains("Best expectancy: threshold 0.70, stop 0.03"));
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&[result()], dir.path()).unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("threshold,stop_pct,trade_count"));
        assert!(lines.next().unwrap().starts_with("0.7,0.03,42,"));
    }
}
