//! Request/response analysis entry point
//!
//! `run_analysis` takes a configuration and an already-loaded series and
//! returns everything a renderer needs. It holds no state between calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::entry::{select_entry, EntryPolicy, EntrySchedule};
use crate::optimizer::{
    sweep_periodic, sweep_with, NoProgress, PercentRange, PeriodicSweepResult, SweepOptions,
    SweepProgress,
};
use crate::simulator::trail;
use crate::{EntryPoint, PriceSeries, StopLossFraction, SweepResult, TrailPoint};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("price series is empty")]
    EmptySeries,

    #[error("entry policy '{0}' found no entry point in the series")]
    NoEntry(String),
}

/// Single entry point, or periodic re-entry averaged across the series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    #[default]
    Single,
    Periodic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub min_percent: u32,
    pub max_percent: u32,
    pub mode: SweepMode,
    /// Bars between entries in periodic mode
    pub step_bars: usize,
    /// Sub-series length floor in periodic mode
    pub min_bars: usize,
    pub parallel: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            min_percent: 1,
            max_percent: 90,
            mode: SweepMode::Single,
            step_bars: 20,
            min_bars: 5,
            parallel: false,
        }
    }
}

impl SweepConfig {
    pub fn range(&self) -> PercentRange {
        PercentRange::new(self.min_percent, self.max_percent)
    }

    pub fn schedule(&self) -> EntrySchedule {
        EntrySchedule {
            step_bars: self.step_bars,
            min_bars: self.min_bars,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub entry: EntryPolicy,
    pub sweep: SweepConfig,
}

/// Sweep table for one entry plus the winner's stop trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleEntryReport {
    pub entry: EntryPoint,
    pub sweep: SweepResult,
    /// Empty when the sweep has no best row
    pub trail: Vec<TrailPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnalysisResult {
    Single(SingleEntryReport),
    Periodic(PeriodicSweepResult),
}

/// Run an analysis with default execution options and no progress output
pub fn run_analysis(
    config: &AnalysisConfig,
    series: &PriceSeries,
) -> Result<AnalysisResult, AnalysisError> {
    run_analysis_with(config, series, SweepOptions::default(), &NoProgress)
}

/// Run an analysis, reporting progress and honouring cancellation.
///
/// `config.sweep.parallel` is OR-ed into `options.parallel`.
pub fn run_analysis_with(
    config: &AnalysisConfig,
    series: &PriceSeries,
    options: SweepOptions<'_>,
    progress: &dyn SweepProgress,
) -> Result<AnalysisResult, AnalysisError> {
    if series.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }

    let range = config.sweep.range();

    match config.sweep.mode {
        SweepMode::Single => {
            let entry = select_entry(series, &config.entry)
                .ok_or_else(|| AnalysisError::NoEntry(config.entry.to_string()))?;
            info!("Entry: {} @ {:.4} ({})", entry.date, entry.price, config.entry);

            let options = SweepOptions {
                parallel: options.parallel || config.sweep.parallel,
                ..options
            };
            let sweep = sweep_with(series, &entry, range, options, progress);

            let trail = sweep
                .best_percent()
                .and_then(|p| StopLossFraction::from_percent(p).ok())
                .map(|stop| trail(series, &entry, stop))
                .unwrap_or_default();

            Ok(AnalysisResult::Single(SingleEntryReport {
                entry,
                sweep,
                trail,
            }))
        }
        SweepMode::Periodic => {
            let result = sweep_periodic(series, range, config.sweep.schedule(), progress);
            Ok(AnalysisResult::Periodic(result))
        }
    }
}
