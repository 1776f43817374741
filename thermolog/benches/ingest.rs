//! Benchmarks for the `ingest()` path.
//!
//! Every ingest appends a raw line and rescans the raw log for trimming, so
//! the cost grows with the number of retained raw lines.
//!
//! Run with: `cargo bench -p thermolog -- ingest`

#![allow(missing_docs)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tempfile::tempdir;
use thermolog::{AggregationEngine, EngineConfig, RollingAverage, Sample};

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn bench_rolling_add(c: &mut Criterion) {
    let mut window = RollingAverage::new(3_600);
    let mut v = 0.0;

    c.bench_function("rolling/add_full_window", |b| {
        b.iter(|| {
            v += 0.25;
            window.add(black_box(v));
        });
    });
}

fn bench_ingest_with_backlog(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest/raw_backlog");

    for backlog in [100u32, 1_000, 10_000] {
        let temp_dir = tempdir().unwrap();
        let mut engine = AggregationEngine::new(EngineConfig::new(temp_dir.path())).unwrap();

        let mut ts = base_time();
        for i in 0..backlog {
            ts += TimeDelta::seconds(1);
            engine.ingest(Sample::new(ts, f64::from(i % 40)));
        }

        group.bench_with_input(BenchmarkId::from_parameter(backlog), &backlog, |b, _| {
            b.iter(|| {
                ts += TimeDelta::seconds(1);
                engine.ingest(black_box(Sample::new(ts, 21.5)));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rolling_add, bench_ingest_with_backlog);
criterion_main!(benches);
