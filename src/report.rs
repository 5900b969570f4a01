//! Result rendering: terminal tables and file exports

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::{AnalysisResult, SingleEntryReport};
use crate::optimizer::PeriodicSweepResult;
use crate::SweepPoint;

/// Rows ordered by return, best first; ties keep ascending percent
pub fn ranked(points: &[SweepPoint]) -> Vec<&SweepPoint> {
    let mut rows: Vec<&SweepPoint> = points.iter().collect();
    rows.sort_by(|a, b| {
        b.return_pct
            .partial_cmp(&a.return_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

/// Print the analysis summary and the top `top` rows
pub fn print_summary(result: &AnalysisResult, top: usize) {
    match result {
        AnalysisResult::Single(report) => print_single(report, top),
        AnalysisResult::Periodic(report) => print_periodic(report, top),
    }
}

fn print_single(report: &SingleEntryReport, top: usize) {
    println!("\n{}", "=".repeat(70));
    println!("STOP-LOSS SWEEP RESULTS");
    println!("{}", "=".repeat(70));
    println!("Entry:              {} @ {:.4}", report.entry.date, report.entry.price);
    println!("Candidates tested:  {}", report.sweep.points.len());
    if report.sweep.cancelled {
        println!("Status:             cancelled (partial table)");
    }

    let Some(best) = report.sweep.best_point() else {
        println!("No optimisation possible: empty stop-loss range");
        println!("{}", "=".repeat(70));
        return;
    };

    println!("Recommended stop:   {}%", best.percent);
    println!("Return:             {:+.2}%", best.return_pct);
    match best.outcome.exit_date {
        Some(date) => println!(
            "Exit:               {} @ {:.4} ({})",
            date, best.outcome.exit_price, best.outcome.reason
        ),
        None => println!("Exit:               none ({})", best.outcome.reason),
    }
    println!("{}", "=".repeat(70));

    let display_count = top.min(report.sweep.points.len());
    println!("\nTOP {} STOP-LOSS LEVELS", display_count);
    println!("{}", "-".repeat(70));
    println!(
        "{:<5} {:>7} {:>10} {:>12} {:>12}  {}",
        "Rank", "Stop%", "Return%", "Exit date", "Exit price", "Reason"
    );
    println!("{}", "-".repeat(70));
    for (i, point) in ranked(&report.sweep.points).into_iter().take(top).enumerate() {
        let exit_date = point
            .outcome
            .exit_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<5} {:>7} {:>10.2} {:>12} {:>12.4}  {}",
            i + 1,
            point.percent,
            point.return_pct,
            exit_date,
            point.outcome.exit_price,
            point.outcome.reason
        );
    }
    println!("{}", "=".repeat(70));
}

fn print_periodic(report: &PeriodicSweepResult, top: usize) {
    println!("\n{}", "=".repeat(70));
    println!("PERIODIC RE-ENTRY SWEEP RESULTS");
    println!("{}", "=".repeat(70));
    println!("Entries per stop:   {}", report.entries);

    let Some(best) = report.best_point() else {
        println!("No optimisation possible: no entries or empty stop-loss range");
        println!("{}", "=".repeat(70));
        return;
    };

    println!("Recommended stop:   {}%", best.percent);
    println!("Average return:     {:+.2}%", best.avg_return_pct);
    println!("Win rate:           {:.1}%", best.win_rate * 100.0);
    println!("{}", "=".repeat(70));

    let mut rows: Vec<_> = report.points.iter().collect();
    rows.sort_by(|a, b| {
        b.avg_return_pct
            .partial_cmp(&a.avg_return_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    println!(
        "{:<5} {:>7} {:>12} {:>10} {:>8}",
        "Rank", "Stop%", "AvgReturn%", "WinRate%", "Samples"
    );
    println!("{}", "-".repeat(70));
    for (i, point) in rows.into_iter().take(top).enumerate() {
        println!(
            "{:<5} {:>7} {:>12.2} {:>10.1} {:>8}",
            i + 1,
            point.percent,
            point.avg_return_pct,
            point.win_rate * 100.0,
            point.samples
        );
    }
    println!("{}", "=".repeat(70));
}

// =============================================================================
// Exports
// =============================================================================

#[derive(Serialize)]
struct SweepRow {
    stop_loss_pct: u32,
    return_pct: f64,
    exit_date: Option<chrono::NaiveDate>,
    exit_price: f64,
    reason: String,
}

/// Write the result files into `dir`, returning the paths written
pub fn export(result: &AnalysisResult, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).context("Failed to create results directory")?;

    let mut written = Vec::new();

    match result {
        AnalysisResult::Single(report) => {
            let path = dir.join("sweep.csv");
            let mut writer = csv::Writer::from_path(&path).context("Failed to create sweep.csv")?;
            for point in &report.sweep.points {
                writer.serialize(SweepRow {
                    stop_loss_pct: point.percent,
                    return_pct: point.return_pct,
                    exit_date: point.outcome.exit_date,
                    exit_price: point.outcome.exit_price,
                    reason: point.outcome.reason.to_string(),
                })?;
            }
            writer.flush()?;
            written.push(path);

            let path = dir.join("trail.csv");
            let mut writer = csv::Writer::from_path(&path).context("Failed to create trail.csv")?;
            for point in &report.trail {
                writer.serialize(point)?;
            }
            writer.flush()?;
            written.push(path);
        }
        AnalysisResult::Periodic(report) => {
            let path = dir.join("periodic.csv");
            let mut writer =
                csv::Writer::from_path(&path).context("Failed to create periodic.csv")?;
            for point in &report.points {
                writer.serialize(point)?;
            }
            writer.flush()?;
            written.push(path);
        }
    }

    let path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(result).context("Failed to serialize summary")?;
    fs::write(&path, json).context("Failed to write summary.json")?;
    written.push(path);

    for path in &written {
        info!("Wrote {}", path.display());
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{run_analysis, AnalysisConfig, SweepConfig};
    use crate::entry::EntryPolicy;
    use crate::{PriceBar, PriceSeries};
    use chrono::NaiveDate;

    fn report() -> AnalysisResult {
        let bars = [(10.0, 9.0), (12.0, 11.0), (11.0, 10.0), (9.0, 7.0), (8.0, 7.0)]
            .iter()
            .enumerate()
            .map(|(i, &(h, l))| {
                let date = NaiveDate::from_ymd_opt(2024, 3, i as u32 + 1).unwrap();
                PriceBar::new(date, l, h, l, (h + l) / 2.0)
            })
            .collect();
        let series = PriceSeries::new(bars).unwrap();
        let config = AnalysisConfig {
            entry: EntryPolicy::FirstClose,
            sweep: SweepConfig {
                min_percent: 1,
                max_percent: 30,
                ..Default::default()
            },
        };
        run_analysis(&config, &series).unwrap()
    }

    #[test]
    fn test_ranked_orders_by_return_stably() {
        let AnalysisResult::Single(single) = report() else {
            panic!("expected single-entry result");
        };

        let rows = ranked(&single.sweep.points);

        assert_eq!(rows[0].percent, single.sweep.best_percent().unwrap());
        assert!(rows.windows(2).all(|w| w[0].return_pct >= w[1].return_pct));
    }

    #[test]
    fn test_export_writes_files() {
        let dir = std::env::temp_dir().join(format!("stoploss_report_{}", std::process::id()));

        let written = export(&report(), &dir).unwrap();

        let names: Vec<String> = written
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["sweep.csv", "trail.csv", "summary.json"]);

        let sweep = fs::read_to_string(dir.join("sweep.csv")).unwrap();
        assert!(sweep.starts_with("stop_loss_pct,return_pct,exit_date,exit_price,reason"));
        assert_eq!(sweep.lines().count(), 31);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["mode"], "single");

        fs::remove_dir_all(&dir).ok();
    }
}
