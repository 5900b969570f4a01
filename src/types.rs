//! Core data types used across the stop-loss optimizer

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-side contract violations.
///
/// These are programmer errors (bad entry price, stop outside (0, 1)), not
/// data-quality problems. Bad data is absorbed by the simulator instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("entry price must be positive and finite, got {0}")]
    NonPositiveEntryPrice(f64),

    #[error("stop-loss fraction must lie strictly between 0 and 1, got {0}")]
    StopLossOutOfRange(f64),
}

/// Structural errors for a price series
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index}: date {date} is not after previous date {previous}")]
    NotChronological {
        index: usize,
        date: NaiveDate,
        previous: NaiveDate,
    },
}

// =============================================================================
// Price data
// =============================================================================

/// One trading day of OHLC data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
        }
    }

    /// True when both high and low are usable for a stop check
    pub fn has_range(&self) -> bool {
        !self.high.is_nan() && !self.low.is_nan()
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            date: self.date,
            open: self.open * factor,
            high: self.high * factor,
            low: self.low * factor,
            close: self.close * factor,
        }
    }
}

/// Date-ordered daily bars, strictly increasing by date.
///
/// Built once by the data layer and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Wrap bars that are already sorted, rejecting duplicates and disorder
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, SeriesError> {
        for (i, pair) in bars.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                return Err(SeriesError::NotChronological {
                    index: i + 1,
                    date: pair[1].date,
                    previous: pair[0].date,
                });
            }
        }
        Ok(Self { bars })
    }

    /// Sort by date and drop repeated dates (first occurrence wins)
    pub fn from_unsorted(mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Self { bars }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&PriceBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// Bars dated strictly after `date`
    pub fn after(&self, date: NaiveDate) -> &[PriceBar] {
        let start = self.bars.partition_point(|b| b.date <= date);
        &self.bars[start..]
    }

    pub fn position_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Bars from `index` to the end
    pub fn slice_from(&self, index: usize) -> &[PriceBar] {
        self.bars.get(index..).unwrap_or(&[])
    }

    /// Copy with every price field multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            bars: self.bars.iter().map(|b| b.scaled(factor)).collect(),
        }
    }
}

// =============================================================================
// Trade inputs
// =============================================================================

/// Hypothetical buy: entry date and fill price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl EntryPoint {
    pub fn new(date: NaiveDate, price: f64) -> Result<Self, ContractViolation> {
        if !(price.is_finite() && price > 0.0) {
            return Err(ContractViolation::NonPositiveEntryPrice(price));
        }
        Ok(Self { date, price })
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            date: self.date,
            price: self.price * factor,
        }
    }
}

/// Trailing-stop distance below the high-water mark, in (0, 1)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct StopLossFraction(f64);

impl StopLossFraction {
    pub fn new(fraction: f64) -> Result<Self, ContractViolation> {
        if fraction > 0.0 && fraction < 1.0 {
            Ok(Self(fraction))
        } else {
            Err(ContractViolation::StopLossOutOfRange(fraction))
        }
    }

    /// Integer percent to fraction: 20 -> 0.20
    pub fn from_percent(percent: u32) -> Result<Self, ContractViolation> {
        Self::new(percent as f64 / 100.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Stop level for a given high-water mark
    pub fn stop_level(self, high_water_mark: f64) -> f64 {
        high_water_mark * (1.0 - self.0)
    }
}

impl TryFrom<f64> for StopLossFraction {
    type Error = ContractViolation;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StopLossFraction> for f64 {
    fn from(value: StopLossFraction) -> Self {
        value.0
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why a simulated trade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Bar low reached the trailing stop
    StopHit,
    /// Never stopped out; valued at the last close
    HeldToEnd,
    /// Entry at or after the last bar
    NoBarsAfterEntry,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopHit => "stop_hit",
            ExitReason::HeldToEnd => "held_to_end",
            ExitReason::NoBarsAfterEntry => "no_bars_after_entry",
        };
        f.write_str(s)
    }
}

/// Result of one simulated trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// (exit - entry) / entry
    pub return_fraction: f64,
    /// None when there was nothing after the entry to walk
    pub exit_date: Option<NaiveDate>,
    pub exit_price: f64,
    pub reason: ExitReason,
}

impl TradeOutcome {
    /// Zero-return outcome for an entry with no later bars
    pub fn flat(entry_price: f64) -> Self {
        Self {
            return_fraction: 0.0,
            exit_date: None,
            exit_price: entry_price,
            reason: ExitReason::NoBarsAfterEntry,
        }
    }

    pub fn return_pct(&self) -> f64 {
        self.return_fraction * 100.0
    }
}

/// One row of the sweep table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub percent: u32,
    /// Return in percent (return_fraction * 100)
    pub return_pct: f64,
    pub outcome: TradeOutcome,
}

/// Ordered sweep table plus the winning row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    /// Ascending by percent
    pub points: Vec<SweepPoint>,
    /// Index into `points` of the best row
    pub best: Option<usize>,
    /// Set when the sweep was aborted between candidates
    #[serde(default)]
    pub cancelled: bool,
}

impl SweepResult {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn best_point(&self) -> Option<&SweepPoint> {
        self.best.and_then(|i| self.points.get(i))
    }

    pub fn best_percent(&self) -> Option<u32> {
        self.best_point().map(|p| p.percent)
    }

    pub fn best_outcome(&self) -> Option<&TradeOutcome> {
        self.best_point().map(|p| &p.outcome)
    }
}

/// One day of the reconstructed trailing-stop trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub date: NaiveDate,
    pub close: f64,
    pub high_water_mark: f64,
    pub stop_level: f64,
    /// The bar the trade exits on
    pub triggered: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(day: u32) -> PriceBar {
        PriceBar::new(d(day), 10.0, 11.0, 9.0, 10.5)
    }

    #[test]
    fn test_series_rejects_duplicate_dates() {
        let err = PriceSeries::new(vec![bar(1), bar(2), bar(2)]).unwrap_err();
        assert_eq!(
            err,
            SeriesError::NotChronological {
                index: 2,
                date: d(2),
                previous: d(2)
            }
        );
    }

    #[test]
    fn test_from_unsorted_sorts_and_dedups() {
        let series = PriceSeries::from_unsorted(vec![bar(3), bar(1), bar(3), bar(2)]);
        let dates: Vec<_> = series.bars().iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(1), d(2), d(3)]);
    }

    #[test]
    fn test_after_is_strict() {
        let series = PriceSeries::new(vec![bar(1), bar(2), bar(3)]).unwrap();
        assert_eq!(series.after(d(1)).len(), 2);
        assert_eq!(series.after(d(3)).len(), 0);
        // Entry before the first bar sees the whole series
        let early = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(series.after(early).len(), 3);
    }

    #[test]
    fn test_stop_loss_fraction_bounds() {
        assert!(StopLossFraction::new(0.0).is_err());
        assert!(StopLossFraction::new(1.0).is_err());
        assert!(StopLossFraction::new(f64::NAN).is_err());
        assert_eq!(StopLossFraction::from_percent(20).unwrap().value(), 0.2);
    }

    #[test]
    fn test_entry_point_rejects_non_positive_price() {
        assert_eq!(
            EntryPoint::new(d(1), 0.0),
            Err(ContractViolation::NonPositiveEntryPrice(0.0))
        );
        assert!(EntryPoint::new(d(1), f64::INFINITY).is_err());
        assert!(EntryPoint::new(d(1), 10.0).is_ok());
    }

    #[test]
    fn test_stop_loss_fraction_serde_validates() {
        let ok: StopLossFraction = serde_json::from_str("0.25").unwrap();
        assert_eq!(ok.value(), 0.25);
        assert!(serde_json::from_str::<StopLossFraction>("1.5").is_err());
    }
}
