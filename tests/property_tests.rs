//! Property tests for simulator and sweep invariants.
//!
//! Uses proptest to verify:
//! 1. Ratchet monotonicity: the high-water mark never falls
//! 2. Single exit: a trade exits at most once, where the simulator says
//! 3. Bounded loss: a stop exit never loses more than the stop distance
//! 4. Scale invariance: multiplying every price leaves returns unchanged
//! 5. Sweep shape: one row per percent, best row is the first maximum

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use stoploss_optimizer::optimizer::{sweep_with, NoProgress, SweepOptions};
use stoploss_optimizer::{
    simulate, sweep, trail, EntryPoint, ExitReason, PercentRange, PriceBar, PriceSeries,
    StopLossFraction,
};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random walk of bars: (close ratio, upper wick, lower wick) per day
fn arb_series() -> impl Strategy<Value = PriceSeries> {
    prop::collection::vec((0.92..1.08_f64, 0.0..0.04_f64, 0.0..0.04_f64), 1..80).prop_map(
        |steps| {
            let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
            let mut close = 100.0;
            let bars = steps
                .into_iter()
                .enumerate()
                .map(|(i, (ratio, up, down))| {
                    let open = close;
                    close *= ratio;
                    let high = open.max(close) * (1.0 + up);
                    let low = open.min(close) * (1.0 - down);
                    PriceBar::new(start + Duration::days(i as i64), open, high, low, close)
                })
                .collect();
            PriceSeries::new(bars).unwrap()
        },
    )
}

fn arb_stop() -> impl Strategy<Value = StopLossFraction> {
    (1u32..=60).prop_map(|p| StopLossFraction::from_percent(p).unwrap())
}

/// Entry at the first bar's close
fn first_close_entry(series: &PriceSeries) -> EntryPoint {
    let first = series.first().unwrap();
    EntryPoint::new(first.date, first.close).unwrap()
}

// ── 1. Ratchet Monotonicity ──────────────────────────────────────────

proptest! {
    #[test]
    fn high_water_mark_never_falls(series in arb_series(), stop in arb_stop()) {
        let entry = first_close_entry(&series);
        let path = trail(&series, &entry, stop);

        let mut previous = entry.price;
        for point in &path {
            prop_assert!(point.high_water_mark >= previous);
            prop_assert!((point.stop_level - stop.stop_level(point.high_water_mark)).abs() < 1e-12);
            previous = point.high_water_mark;
        }
    }
}

// ── 2. Single Exit ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn trade_exits_at_most_once(series in arb_series(), stop in arb_stop()) {
        let entry = first_close_entry(&series);
        let outcome = simulate(&series, &entry, stop);
        let exits: Vec<_> = trail(&series, &entry, stop)
            .into_iter()
            .filter(|p| p.triggered)
            .collect();

        match outcome.reason {
            ExitReason::StopHit => {
                prop_assert_eq!(exits.len(), 1);
                prop_assert_eq!(Some(exits[0].date), outcome.exit_date);
            }
            ExitReason::HeldToEnd => {
                prop_assert!(exits.is_empty());
                prop_assert_eq!(outcome.exit_date, series.last().map(|b| b.date));
            }
            ExitReason::NoBarsAfterEntry => {
                prop_assert_eq!(series.len(), 1);
                prop_assert_eq!(outcome.return_fraction, 0.0);
            }
        }
    }
}

// ── 3. Bounded Loss ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_exit_loses_at_most_stop_distance(series in arb_series(), stop in arb_stop()) {
        let entry = first_close_entry(&series);
        let outcome = simulate(&series, &entry, stop);

        if outcome.reason == ExitReason::StopHit {
            prop_assert!(outcome.return_fraction >= -stop.value() - 1e-12);
            prop_assert!(outcome.exit_price >= stop.stop_level(entry.price) - 1e-9);
        }
    }
}

// ── 4. Scale Invariance ──────────────────────────────────────────────

proptest! {
    #[test]
    fn returns_do_not_depend_on_price_scale(
        series in arb_series(),
        factor in prop_oneof![Just(0.25), Just(2.0), Just(16.0)],
    ) {
        let entry = first_close_entry(&series);
        let range = PercentRange::new(1, 40);

        let base = sweep(&series, &entry, range);
        let scaled = sweep(&series.scaled(factor), &entry.scaled(factor), range);

        prop_assert_eq!(base.best_percent(), scaled.best_percent());
        for (a, b) in base.points.iter().zip(scaled.points.iter()) {
            prop_assert!((a.return_pct - b.return_pct).abs() < 1e-9);
        }
    }
}

// ── 5. Sweep Shape ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn sweep_has_one_row_per_percent(series in arb_series(), lo in 1u32..=99, width in 0u32..30) {
        let hi = (lo + width).min(99);
        let entry = first_close_entry(&series);

        let result = sweep(&series, &entry, PercentRange::new(lo, hi));

        prop_assert_eq!(result.points.len(), (hi - lo + 1) as usize);
        let percents: Vec<u32> = result.points.iter().map(|p| p.percent).collect();
        prop_assert_eq!(percents, (lo..=hi).collect::<Vec<_>>());
    }

    #[test]
    fn best_row_is_first_maximum(series in arb_series()) {
        let entry = first_close_entry(&series);
        let result = sweep(&series, &entry, PercentRange::new(1, 50));

        let best = result.best.unwrap();
        let best_return = result.points[best].return_pct;
        prop_assert!(result.points.iter().all(|p| p.return_pct <= best_return));
        prop_assert!(result.points[..best].iter().all(|p| p.return_pct < best_return));
    }

    #[test]
    fn parallel_sweep_matches_sequential(series in arb_series()) {
        let entry = first_close_entry(&series);
        let range = PercentRange::new(1, 30);
        let options = SweepOptions { parallel: true, ..Default::default() };

        let sequential = sweep(&series, &entry, range);
        let parallel = sweep_with(&series, &entry, range, options, &NoProgress);

        prop_assert_eq!(sequential, parallel);
    }
}
