//! Performance benchmarks for swing-signals
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use swing_signals::indicators;
use swing_signals::{GridAggregator, MarketBar, ParamGrid, Regime, SimulationParams, Ticker};

fn scored_bars(tickers: usize, days: usize) -> Vec<MarketBar> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..tickers)
        .flat_map(|t| {
            (0..days).map(move |d| {
                let phase = (d as f64 * 0.1 + t as f64).sin();
                let close = 100.0 + 10.0 * phase;
                MarketBar {
                    date: start + Duration::days(d as i64),
                    ticker: Ticker::new(format!("T{:03}", t)),
                    close,
                    high: close * 1.01,
                    low: close * 0.99,
                    long_prob: 0.5 + 0.5 * phase,
                    short_prob: 0.5 - 0.5 * phase,
                    regime: Some(if (d / 50) % 2 == 0 { Regime::Bull } else { Regime::Bear }),
                }
            })
        })
        .collect()
}

fn benchmark_indicators(c: &mut Criterion) {
    let closes: Vec<f64> = (0..5_000).map(|i| 100.0 + (i as f64 * 0.05).sin() * 5.0).collect();
    let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
    let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();

    c.bench_function("rsi_14_5000", |b| b.iter(|| indicators::rsi(black_box(&closes), 14)));
    c.bench_function("atr_14_5000", |b| {
        b.iter(|| indicators::atr(black_box(&highs), black_box(&lows), black_box(&closes), 14))
    });
}

fn benchmark_grid(c: &mut Criterion) {
    let bars = scored_bars(50, 500);
    let aggregator =
        GridAggregator::new(SimulationParams::default(), ParamGrid::default()).unwrap();

    c.bench_function("grid_parallel_50x500", |b| {
        b.iter(|| aggregator.run(black_box(&bars)))
    });
    c.bench_function("grid_sequential_50x500", |b| {
        b.iter(|| aggregator.run_sequential(black_box(&bars)))
    });
}

criterion_group!(benches, benchmark_indicators, benchmark_grid);
criterion_main!(benches);
