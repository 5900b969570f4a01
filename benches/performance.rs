//! Performance benchmarks for the stop-loss optimizer
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stoploss_optimizer::entry::EntrySchedule;
use stoploss_optimizer::optimizer::{sweep_periodic, sweep_with, NoProgress, SweepOptions};
use stoploss_optimizer::{simulate, sweep, EntryPoint, PercentRange, PriceBar, PriceSeries, StopLossFraction};

/// Ten years of deterministic daily bars oscillating around a slow uptrend
fn daily_series(count: usize) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap();
    let bars = (0..count)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + t * 0.05 + (t / 7.0).sin() * 6.0;
            PriceBar::new(
                start + Duration::days(i as i64),
                close,
                close * 1.01,
                close * 0.99,
                close,
            )
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

fn benchmark_simulate(c: &mut Criterion) {
    let series = daily_series(2520);
    let entry = EntryPoint::new(series.first().unwrap().date, 100.0).unwrap();
    let stop = StopLossFraction::from_percent(15).unwrap();

    c.bench_function("simulate_2520_bars", |b| {
        b.iter(|| simulate(black_box(&series), black_box(&entry), stop))
    });
}

fn benchmark_sweep(c: &mut Criterion) {
    let series = daily_series(2520);
    let entry = EntryPoint::new(series.first().unwrap().date, 100.0).unwrap();
    let range = PercentRange::new(1, 99);

    c.bench_function("sweep_1_to_99", |b| {
        b.iter(|| sweep(black_box(&series), black_box(&entry), range))
    });

    let options = SweepOptions {
        parallel: true,
        ..Default::default()
    };
    c.bench_function("sweep_1_to_99_parallel", |b| {
        b.iter(|| sweep_with(black_box(&series), black_box(&entry), range, options, &NoProgress))
    });
}

fn benchmark_periodic(c: &mut Criterion) {
    let series = daily_series(2520);

    c.bench_function("sweep_periodic_1_to_90", |b| {
        b.iter(|| {
            sweep_periodic(
                black_box(&series),
                PercentRange::default(),
                EntrySchedule::default(),
                &NoProgress,
            )
        })
    });
}

criterion_group!(benches, benchmark_simulate, benchmark_sweep, benchmark_periodic);
criterion_main!(benches);
