//! Stop-loss sweep optimizer
//!
//! Runs the simulator once per integer stop-loss percent and keeps the
//! table in ascending-percent order. The best row is the first one with the
//! strictly greatest return, so ties go to the tighter stop.
//!
//! Parallel mode evaluates candidates with rayon in an order-preserving
//! collect, so its output matches the sequential sweep exactly.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::entry::EntrySchedule;
use crate::simulator::{simulate, simulate_bars};
use crate::{EntryPoint, PriceSeries, StopLossFraction, SweepPoint, SweepResult};

/// Inclusive integer percent range, e.g. 1..=90
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentRange {
    pub lo: u32,
    pub hi: u32,
}

impl PercentRange {
    pub fn new(lo: u32, hi: u32) -> Self {
        PercentRange { lo, hi }
    }

    /// `1 <= lo <= hi <= 99`
    pub fn is_valid(&self) -> bool {
        self.lo >= 1 && self.lo <= self.hi && self.hi <= 99
    }

    /// Number of candidates, zero when invalid
    pub fn len(&self) -> usize {
        if self.is_valid() {
            (self.hi - self.lo + 1) as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidates in ascending order; empty when invalid
    pub fn candidates(&self) -> Vec<(u32, StopLossFraction)> {
        if !self.is_valid() {
            return Vec::new();
        }
        (self.lo..=self.hi)
            .filter_map(|p| StopLossFraction::from_percent(p).ok().map(|f| (p, f)))
            .collect()
    }
}

impl Default for PercentRange {
    fn default() -> Self {
        PercentRange { lo: 1, hi: 90 }
    }
}

// =============================================================================
// Progress reporting
// =============================================================================

/// Observer for sweep progress. Purely informational.
///
/// Called once per finished candidate. In parallel mode calls come from
/// worker threads and `completed` values may arrive out of order.
pub trait SweepProgress: Sync {
    fn on_progress(&self, completed: usize, total: usize);
}

/// Discards progress
pub struct NoProgress;

impl SweepProgress for NoProgress {
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

impl SweepProgress for ProgressBar {
    fn on_progress(&self, _completed: usize, total: usize) {
        // One call per candidate; inc keeps the bar monotonic across threads
        self.set_length(total as u64);
        self.inc(1);
    }
}

/// Fraction complete after `completed` of `total` candidates
pub fn progress_fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        completed as f64 / total as f64
    }
}

/// Execution knobs that do not affect the computed table
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepOptions<'a> {
    pub parallel: bool,
    /// Checked between candidates, never inside a simulation
    pub cancel: Option<&'a AtomicBool>,
}

impl SweepOptions<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Single-entry sweep
// =============================================================================

/// Sweep `range` for one entry, sequentially and without progress output
pub fn sweep(series: &PriceSeries, entry: &EntryPoint, range: PercentRange) -> SweepResult {
    sweep_with(series, entry, range, SweepOptions::default(), &NoProgress)
}

/// Sweep `range` for one entry.
///
/// An invalid or empty range yields an empty result with no best row.
pub fn sweep_with(
    series: &PriceSeries,
    entry: &EntryPoint,
    range: PercentRange,
    options: SweepOptions<'_>,
    progress: &dyn SweepProgress,
) -> SweepResult {
    let candidates = range.candidates();
    if candidates.is_empty() {
        warn!(lo = range.lo, hi = range.hi, "empty or invalid stop-loss range, nothing to sweep");
        return SweepResult::default();
    }

    let total = candidates.len();
    info!(
        "Testing {} stop-loss candidates ({}%..{}%) from {} @ {:.4}",
        total, range.lo, range.hi, entry.date, entry.price
    );

    let evaluate = |&(percent, fraction): &(u32, StopLossFraction)| {
        let outcome = simulate(series, entry, fraction);
        debug!(percent, return_pct = outcome.return_pct(), "candidate evaluated");
        SweepPoint {
            percent,
            return_pct: outcome.return_pct(),
            outcome,
        }
    };

    let (points, cancelled) = if options.parallel {
        let done = AtomicUsize::new(0);
        let slots: Vec<Option<SweepPoint>> = candidates
            .par_iter()
            .map(|candidate| {
                if options.is_cancelled() {
                    return None;
                }
                let point = evaluate(candidate);
                let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.on_progress(completed, total);
                Some(point)
            })
            .collect();
        // Keep the completed prefix; anything after the first gap is dropped
        let points: Vec<SweepPoint> = slots.into_iter().map_while(|slot| slot).collect();
        let cancelled = points.len() < total;
        (points, cancelled)
    } else {
        let mut points = Vec::with_capacity(total);
        let mut cancelled = false;
        for (index, candidate) in candidates.iter().enumerate() {
            if options.is_cancelled() {
                cancelled = true;
                break;
            }
            points.push(evaluate(candidate));
            progress.on_progress(index + 1, total);
        }
        (points, cancelled)
    };

    if cancelled {
        warn!("Sweep cancelled after {} of {} candidates", points.len(), total);
    }

    let best = best_index(points.iter().map(|p| p.return_pct));
    if let Some(i) = best {
        info!(
            "Best stop-loss: {}% ({:+.2}%)",
            points[i].percent, points[i].return_pct
        );
    }

    SweepResult {
        points,
        best,
        cancelled,
    }
}

/// First index holding the strictly greatest value; NaN never wins
pub fn best_index(values: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.into_iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, current)| v > current) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

// =============================================================================
// Multi-entry (periodic re-entry) sweep
// =============================================================================

/// Averaged outcome for one stop-loss percent across many entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSweepPoint {
    pub percent: u32,
    /// Mean return in percent
    pub avg_return_pct: f64,
    /// Share of entries with a strictly positive return, in [0, 1]
    pub win_rate: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodicSweepResult {
    pub points: Vec<PeriodicSweepPoint>,
    pub best: Option<usize>,
    /// Number of scheduled entries used per percent
    pub entries: usize,
}

impl PeriodicSweepResult {
    pub fn best_point(&self) -> Option<&PeriodicSweepPoint> {
        self.best.and_then(|i| self.points.get(i))
    }
}

/// Sweep `range` averaging over entries placed by `schedule`.
///
/// Each entry buys at its bar's close and is walked over the bars after it.
pub fn sweep_periodic(
    series: &PriceSeries,
    range: PercentRange,
    schedule: EntrySchedule,
    progress: &dyn SweepProgress,
) -> PeriodicSweepResult {
    let candidates = range.candidates();
    let entries = schedule.entries(series);

    if candidates.is_empty() {
        warn!(lo = range.lo, hi = range.hi, "empty or invalid stop-loss range, nothing to sweep");
        return PeriodicSweepResult::default();
    }
    if entries.is_empty() {
        warn!(
            "Series of {} bars too short for re-entry every {} bars",
            series.len(),
            schedule.step_bars
        );
    }

    info!(
        "Testing {} stop-loss candidates across {} entries",
        candidates.len(),
        entries.len()
    );

    let total = candidates.len();
    let mut points = Vec::with_capacity(total);

    for (index, &(percent, fraction)) in candidates.iter().enumerate() {
        let returns: Vec<f64> = entries
            .iter()
            .map(|(bar_index, entry)| {
                simulate_bars(series.slice_from(bar_index + 1), entry.price, fraction).return_fraction
            })
            .collect();

        if !returns.is_empty() {
            let wins = returns.iter().filter(|r| **r > 0.0).count();
            points.push(PeriodicSweepPoint {
                percent,
                avg_return_pct: returns.iter().mean() * 100.0,
                win_rate: wins as f64 / returns.len() as f64,
                samples: returns.len(),
            });
        }

        progress.on_progress(index + 1, total);
    }

    let best = best_index(points.iter().map(|p| p.avg_return_pct));

    PeriodicSweepResult {
        points,
        best,
        entries: entries.len(),
    }
}

// =============================================================================
// Tests
// =============================================================================
