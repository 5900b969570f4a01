//! Entry-point selection policies
//!
//! The simulator only needs a `(date, price)` pair. These policies are the
//! interchangeable ways of picking one from a series.

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators;
use crate::{EntryPoint, PriceSeries};

/// How to choose the hypothetical buy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum EntryPolicy {
    /// Buy at the lowest low of the period (hindsight "bottom")
    #[default]
    MinLow,
    /// Buy at the first bar's close
    FirstClose,
    /// Buy at the first close that crosses above its trailing moving average
    MaCrossover { period: usize },
    /// Externally chosen entry
    Fixed { date: NaiveDate, price: f64 },
}

impl std::fmt::Display for EntryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryPolicy::MinLow => write!(f, "min_low"),
            EntryPolicy::FirstClose => write!(f, "first_close"),
            EntryPolicy::MaCrossover { period } => write!(f, "ma_crossover({})", period),
            EntryPolicy::Fixed { date, price } => write!(f, "fixed({} @ {})", date, price),
        }
    }
}

/// Pick an entry from `series` under `policy`.
///
/// Returns `None` when the series is empty, no bar qualifies, or the
/// qualifying price is not a valid entry price.
pub fn select_entry(series: &PriceSeries, policy: &EntryPolicy) -> Option<EntryPoint> {
    let entry = match policy {
        EntryPolicy::MinLow => series
            .bars()
            .iter()
            .filter(|b| b.low.is_finite())
            .min_by(|a, b| a.low.total_cmp(&b.low))
            .and_then(|bar| EntryPoint::new(bar.date, bar.low).ok()),
        EntryPolicy::FirstClose => series
            .bars()
            .iter()
            .find(|b| b.close.is_finite())
            .and_then(|bar| EntryPoint::new(bar.date, bar.close).ok()),
        EntryPolicy::MaCrossover { period } => ma_crossover(series, *period),
        EntryPolicy::Fixed { date, price } => EntryPoint::new(*date, *price).ok(),
    };

    debug!(%policy, ?entry, "entry selected");
    entry
}

fn ma_crossover(series: &PriceSeries, period: usize) -> Option<EntryPoint> {
    let closes: Vec<f64> = series.bars().iter().map(|b| b.close).collect();
    let averages = indicators::sma(&closes, period);

    series
        .bars()
        .iter()
        .zip(averages.iter())
        .tuple_windows()
        .find_map(|((prev_bar, prev_avg), (bar, avg))| match (prev_avg, avg) {
            (Some(prev_avg), Some(avg)) if prev_bar.close <= *prev_avg && bar.close > *avg => {
                EntryPoint::new(bar.date, bar.close).ok()
            }
            _ => None,
        })
}

/// Fixed periodic re-entry: one entry every `step_bars` bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySchedule {
    /// Bars between consecutive entries
    pub step_bars: usize,
    /// Minimum sub-series length (exclusive) from the entry bar onward
    pub min_bars: usize,
}

impl Default for EntrySchedule {
    fn default() -> Self {
        EntrySchedule {
            step_bars: 20,
            min_bars: 5,
        }
    }
}

impl EntrySchedule {
    /// Entry bar indices, each bought at that bar's close.
    ///
    /// Starts at bar 0 and stops while fewer than `step_bars` bars remain.
    pub fn entries(&self, series: &PriceSeries) -> Vec<(usize, EntryPoint)> {
        if self.step_bars == 0 || series.len() <= self.step_bars {
            return Vec::new();
        }

        (0..series.len() - self.step_bars)
            .step_by(self.step_bars)
            .filter(|&i| series.len() - i > self.min_bars)
            .filter_map(|i| {
                let bar = &series.bars()[i];
                EntryPoint::new(bar.date, bar.close).ok().map(|e| (i, e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PriceBar;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::new(d(i as u32 + 1), c, c + 1.0, c - 1.0, c))
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    #[test]
    fn test_min_low_picks_earliest_bottom() {
        let series = series_from_closes(&[10.0, 8.0, 9.0, 8.0, 12.0]);
        let entry = select_entry(&series, &EntryPolicy::MinLow).unwrap();

        assert_eq!(entry.date, d(2));
        assert_eq!(entry.price, 7.0);
    }

    #[test]
    fn test_first_close() {
        let series = series_from_closes(&[10.0, 8.0]);
        let entry = select_entry(&series, &EntryPolicy::FirstClose).unwrap();

        assert_eq!(entry, EntryPoint::new(d(1), 10.0).unwrap());
    }

    #[test]
    fn test_ma_crossover_finds_first_cross_up() {
        // SMA(2): -, 9.5, 8.5, 8.5, 10.5
        let series = series_from_closes(&[10.0, 9.0, 8.0, 9.0, 12.0]);
        let entry = select_entry(&series, &EntryPolicy::MaCrossover { period: 2 }).unwrap();

        // Bar 4 close 9.0 > 8.5 after bar 3 close 8.0 <= 8.5
        assert_eq!(entry.date, d(4));
        assert_eq!(entry.price, 9.0);
    }

    #[test]
    fn test_ma_crossover_none_when_never_crossing() {
        let series = series_from_closes(&[10.0, 9.0, 8.0, 7.0]);
        assert!(select_entry(&series, &EntryPolicy::MaCrossover { period: 2 }).is_none());
    }

    #[test]
    fn test_empty_series_has_no_entry() {
        let series = PriceSeries::default();
        assert!(select_entry(&series, &EntryPolicy::MinLow).is_none());
        assert!(select_entry(&series, &EntryPolicy::FirstClose).is_none());
    }

    #[test]
    fn test_fixed_rejects_bad_price() {
        let series = series_from_closes(&[10.0]);
        let policy = EntryPolicy::Fixed {
            date: d(1),
            price: -1.0,
        };
        assert!(select_entry(&series, &policy).is_none());
    }

    #[test]
    fn test_policy_json_shape() {
        let policy: EntryPolicy =
            serde_json::from_str(r#"{"policy":"ma_crossover","period":20}"#).unwrap();
        assert_eq!(policy, EntryPolicy::MaCrossover { period: 20 });
    }

    #[test]
    fn test_schedule_matches_periodic_reentry() {
        let closes: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let series = series_from_closes(&closes);
        let schedule = EntrySchedule {
            step_bars: 10,
            min_bars: 5,
        };

        let indices: Vec<usize> = schedule.entries(&series).iter().map(|(i, _)| *i).collect();

        // range(0, 30 - 10, 10)
        assert_eq!(indices, vec![0, 10]);
    }

    #[test]
    fn test_schedule_short_series_is_empty() {
        let series = series_from_closes(&[1.0, 2.0, 3.0]);
        assert!(EntrySchedule::default().entries(&series).is_empty());
    }
}
