//! Trailing-stop trade simulator
//!
//! Replays the bars after an entry, ratcheting a high-water mark and exiting
//! the first time a bar's low reaches the stop level. Fills are modelled at
//! the stop level itself, not at the bar's low.

use tracing::trace;

use crate::{EntryPoint, ExitReason, PriceBar, PriceSeries, StopLossFraction, TradeOutcome, TrailPoint};

/// Simulate one trade from `entry` with a trailing stop of `stop`.
///
/// Only bars dated strictly after the entry are evaluated. Bars with a NaN
/// high or low are skipped without touching the high-water mark.
pub fn simulate(series: &PriceSeries, entry: &EntryPoint, stop: StopLossFraction) -> TradeOutcome {
    simulate_bars(series.after(entry.date), entry.price, stop)
}

/// Same walk as [`simulate`] over an explicit post-entry slice
pub fn simulate_bars(bars: &[PriceBar], entry_price: f64, stop: StopLossFraction) -> TradeOutcome {
    if bars.is_empty() {
        return TradeOutcome::flat(entry_price);
    }

    let mut high_water_mark = entry_price;

    for bar in bars {
        if !bar.has_range() {
            trace!(date = %bar.date, "skipping bar with missing high/low");
            continue;
        }

        // The same bar's high moves the stop before the low is checked
        if bar.high > high_water_mark {
            high_water_mark = bar.high;
        }
        let stop_level = stop.stop_level(high_water_mark);

        if bar.low <= stop_level {
            return TradeOutcome {
                return_fraction: (stop_level - entry_price) / entry_price,
                exit_date: Some(bar.date),
                exit_price: stop_level,
                reason: ExitReason::StopHit,
            };
        }
    }

    held_to_end(bars, entry_price)
}

fn held_to_end(bars: &[PriceBar], entry_price: f64) -> TradeOutcome {
    match bars.iter().rev().find(|b| b.close.is_finite()) {
        Some(last) => TradeOutcome {
            return_fraction: (last.close - entry_price) / entry_price,
            exit_date: Some(last.date),
            exit_price: last.close,
            reason: ExitReason::HeldToEnd,
        },
        None => TradeOutcome {
            reason: ExitReason::HeldToEnd,
            ..TradeOutcome::flat(entry_price)
        },
    }
}

/// Day-by-day high-water mark and stop level after the entry.
///
/// Walks the whole window (it does not stop at the exit) so a chart can show
/// where the stop would have sat afterwards. The exit bar is flagged.
pub fn trail(series: &PriceSeries, entry: &EntryPoint, stop: StopLossFraction) -> Vec<TrailPoint> {
    let bars = series.after(entry.date);
    let mut points = Vec::with_capacity(bars.len());
    let mut high_water_mark = entry.price;
    let mut exited = false;

    for bar in bars {
        let usable = bar.has_range();
        if usable && bar.high > high_water_mark {
            high_water_mark = bar.high;
        }
        let stop_level = stop.stop_level(high_water_mark);
        let triggered = usable && !exited && bar.low <= stop_level;
        exited |= triggered;

        points.push(TrailPoint {
            date: bar.date,
            close: bar.close,
            high_water_mark,
            stop_level,
            triggered,
        });
    }

    points
}

// =============================================================================
// Tests
// =============================================================================
