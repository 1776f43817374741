//! Aggregation engine driving the raw, hourly, and daily tiers.
//!
//! The engine owns all tier state. Each call to
//! [`AggregationEngine::ingest`] runs to completion: it appends the raw line,
//! trims the raw log, and for each rollup tier either keeps accumulating or,
//! on a bucket transition, flushes the closed bucket's average and resets.
//!
//! # Ingest Flow
//!
//! ```text
//! sample ─┬─► raw window ─► raw log ─► trim (24h)
//!         ├─► hourly tier ─┬─ same bucket ─► accumulate
//!         │                └─ new bucket  ─► flush ─► hourly log ─► trim (720 lines)
//!         └─► daily tier  ─┬─ same bucket ─► accumulate
//!                          └─ new bucket  ─► flush ─► rotate (yearly) ─► daily log
//! ```
//!
//! Persistence failures never stop ingestion. They are logged with
//! `tracing::warn!` and counted in [`EngineStats::persistence_failures`].
//!
//! A bucket that is still accumulating when the engine is dropped is lost.
//! Call [`AggregationEngine::finish`] to write partial buckets explicitly.

use std::fs;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::bucket::{BucketClock, BucketId, Resolution};
use crate::config::EngineConfig;
use crate::error::{AverageError, PersistenceError, Result};
use crate::record::{LogRecord, Tier};
use crate::retention::{RetentionLog, RetentionOutcome};
use crate::rolling::RollingAverage;
use crate::sample::Sample;

/// Counters describing what the engine has done since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Samples ingested.
    pub samples: u64,
    /// Raw lines successfully appended.
    pub raw_lines: u64,
    /// Hourly averages emitted.
    pub hourly_flushes: u64,
    /// Daily averages emitted.
    pub daily_flushes: u64,
    /// Lines removed by retention trims.
    pub trimmed_lines: u64,
    /// Daily logs archived at a year boundary.
    pub archives: u64,
    /// Swallowed open/read/write/rename failures.
    pub persistence_failures: u64,
}

/// One emitted rollup line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flush {
    /// Tier the average was written to.
    pub tier: Tier,
    /// Start of the closed bucket; the line is stamped with this.
    pub bucket_start: NaiveDateTime,
    /// Mean of the bucket's samples.
    pub average: f64,
    /// Number of samples in the bucket.
    pub samples: usize,
}

/// Accumulator, bucket tracker, and log for one rollup tier.
#[derive(Debug)]
struct TierState {
    tier: Tier,
    resolution: Resolution,
    window: RollingAverage,
    /// Bucket currently accumulating. `None` until the first sample.
    bucket: Option<BucketId>,
    /// The open bucket was already written by `finish`; its remaining
    /// samples are not accumulated.
    sealed: bool,
    log: RetentionLog,
}

impl TierState {
    fn new(tier: Tier, resolution: Resolution, capacity: usize, log: RetentionLog) -> Self {
        Self {
            tier,
            resolution,
            window: RollingAverage::new(capacity),
            bucket: None,
            sealed: false,
            log,
        }
    }

    /// Flushes the open bucket if `sample` starts a later one, then admits it.
    fn observe(&mut self, sample: Sample, unit: &str, stats: &mut EngineStats) -> Option<Flush> {
        let current = BucketClock::bucket_of(sample.timestamp, self.resolution);

        let flushed = match self.bucket {
            None => {
                self.bucket = Some(current);
                None
            }
            Some(open) if BucketClock::is_transition(Some(open), current) => {
                let flushed = self.flush(open, sample.timestamp, unit, stats);
                self.window.reset();
                self.bucket = Some(current);
                self.sealed = false;
                flushed
            }
            // Same bucket, or a late sample for an already-flushed one.
            Some(_) => None,
        };

        if !self.sealed {
            self.window.add(sample.value);
        }
        flushed
    }

    /// Writes the average of `bucket` and runs the tier's retention rule.
    ///
    /// Does not reset the window; callers decide what happens next.
    fn flush(
        &mut self,
        bucket: BucketId,
        now: NaiveDateTime,
        unit: &str,
        stats: &mut EngineStats,
    ) -> Option<Flush> {
        let Ok(average) = self.window.average() else {
            return None;
        };

        let flush = Flush {
            tier: self.tier,
            bucket_start: BucketClock::bucket_start(bucket, self.resolution),
            average,
            samples: self.window.len(),
        };

        let line = LogRecord::new(flush.bucket_start, average, self.tier).format_line(unit);
        if persist(&self.log, self.tier, &line, flush.bucket_start, now, stats) {
            match self.tier {
                Tier::Hourly => stats.hourly_flushes += 1,
                Tier::Daily => stats.daily_flushes += 1,
                Tier::Raw => {}
            }
            tracing::debug!(
                tier = %self.tier,
                bucket_start = %flush.bucket_start,
                average,
                samples = flush.samples,
                "flushed bucket"
            );
        }

        Some(flush)
    }
}

/// Owns the three tiers and turns samples into log lines.
///
/// # Example
///
/// ```rust,no_run
/// use chrono::Local;
/// use thermolog::{AggregationEngine, EngineConfig, Sample};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut engine = AggregationEngine::new(EngineConfig::new("./logs"))?;
/// let flushes = engine.ingest(Sample::new(Local::now().naive_local(), 21.5));
/// for flush in flushes {
///     println!("{} {}: {:.2}", flush.tier, flush.bucket_start, flush.average);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AggregationEngine {
    config: EngineConfig,
    /// Sliding window over the most recent raw samples.
    raw_window: RollingAverage,
    raw_log: RetentionLog,
    hourly: TierState,
    daily: TierState,
    stats: EngineStats,
}

impl AggregationEngine {
    /// Creates an engine writing under `config.log_dir`.
    ///
    /// The log directory is created if missing. Failing to create it is
    /// logged and counted, not returned: ingestion still runs and each write
    /// reports its own failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`](crate::error::ConfigError) if the configuration
    /// is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut stats = EngineStats::default();
        if let Err(e) = fs::create_dir_all(&config.log_dir) {
            stats.persistence_failures += 1;
            tracing::warn!(
                log_dir = %config.log_dir.display(),
                error = %e,
                "failed to create log directory"
            );
        }

        let hourly = TierState::new(
            Tier::Hourly,
            Resolution::Hour,
            config.hourly_capacity,
            config.retention_log(Tier::Hourly),
        );
        let daily = TierState::new(
            Tier::Daily,
            Resolution::Day,
            config.daily_capacity,
            config.retention_log(Tier::Daily),
        );

        Ok(Self {
            raw_window: RollingAverage::new(config.raw_window),
            raw_log: config.retention_log(Tier::Raw),
            hourly,
            daily,
            stats,
            config,
        })
    }

    /// Ingests one sample and returns the rollups it closed.
    ///
    /// The raw line is always appended first. The hourly and daily tiers then
    /// flush their open bucket if `sample` falls in a later one, stamping the
    /// line with the closed bucket's start. The very first sample only opens
    /// buckets; it never flushes.
    pub fn ingest(&mut self, sample: Sample) -> Vec<Flush> {
        self.stats.samples += 1;
        self.raw_window.add(sample.value);

        let line = LogRecord::new(sample.timestamp, sample.value, Tier::Raw)
            .format_line(&self.config.unit);
        if persist(
            &self.raw_log,
            Tier::Raw,
            &line,
            sample.timestamp,
            sample.timestamp,
            &mut self.stats,
        ) {
            self.stats.raw_lines += 1;
        }

        let unit = &self.config.unit;
        [
            self.hourly.observe(sample, unit, &mut self.stats),
            self.daily.observe(sample, unit, &mut self.stats),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Writes the partially filled hourly and daily buckets.
    ///
    /// Meant for an orderly shutdown when partial averages are wanted. Each
    /// non-empty tier is flushed stamped with its bucket start. The bucket is
    /// then sealed: later samples in it are still logged raw but never reach
    /// the tier, so a bucket start is written at most once. Accumulation
    /// resumes with the next bucket.
    pub fn finish(&mut self, now: NaiveDateTime) -> Vec<Flush> {
        let unit = &self.config.unit;
        let stats = &mut self.stats;

        [&mut self.hourly, &mut self.daily]
            .into_iter()
            .filter_map(|state| {
                let bucket = state.bucket?;
                let flushed = state.flush(bucket, now, unit, stats);
                state.window.reset();
                state.sealed = true;
                flushed
            })
            .collect()
    }

    /// Mean of the last `raw_window` samples.
    ///
    /// # Errors
    ///
    /// Returns [`AverageError::EmptyBuffer`] before the first sample.
    pub fn recent_average(&self) -> std::result::Result<f64, AverageError> {
        self.raw_window.average()
    }

    /// Samples accumulated in the open bucket of `tier`.
    ///
    /// For [`Tier::Raw`] this is the size of the live sliding window.
    pub fn pending(&self, tier: Tier) -> usize {
        match tier {
            Tier::Raw => self.raw_window.len(),
            Tier::Hourly => self.hourly.window.len(),
            Tier::Daily => self.daily.window.len(),
        }
    }

    /// Start of the bucket currently accumulating for a rollup tier.
    pub fn open_bucket_start(&self, tier: Tier) -> Option<NaiveDateTime> {
        let state = match tier {
            Tier::Raw => return None,
            Tier::Hourly => &self.hourly,
            Tier::Daily => &self.daily,
        };
        state
            .bucket
            .map(|b| BucketClock::bucket_start(b, state.resolution))
    }

    /// Counters since construction.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// The configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Log handle for `tier`.
    pub fn log(&self, tier: Tier) -> &RetentionLog {
        match tier {
            Tier::Raw => &self.raw_log,
            Tier::Hourly => &self.hourly.log,
            Tier::Daily => &self.daily.log,
        }
    }
}

/// Appends `line` to `log` and applies the log's retention rule.
///
/// A rule that runs before the append sees `stamp`, the time the record
/// carries; the trims run afterwards against `now`. Returns whether the line
/// was written.
fn persist(
    log: &RetentionLog,
    tier: Tier,
    line: &str,
    stamp: NaiveDateTime,
    now: NaiveDateTime,
    stats: &mut EngineStats,
) -> bool {
    let before = log.rule().runs_before_append();
    if before {
        enforce(log, tier, stamp, stats);
    }

    match log.append(line) {
        Ok(()) => {
            if !before {
                enforce(log, tier, now, stats);
            }
            true
        }
        Err(e) => {
            record_failure(stats, tier, &e);
            false
        }
    }
}

/// Runs the log's retention rule and records the outcome.
fn enforce(log: &RetentionLog, tier: Tier, now: NaiveDateTime, stats: &mut EngineStats) {
    match log.enforce(now) {
        Ok(RetentionOutcome::Unchanged) => {}
        Ok(RetentionOutcome::Trimmed { dropped }) => {
            stats.trimmed_lines += dropped as u64;
            tracing::debug!(%tier, dropped, "trimmed log");
        }
        Ok(RetentionOutcome::Archived { to, year }) => {
            stats.archives += 1;
            tracing::info!(%tier, year, archive = %to.display(), "archived log");
        }
        Err(e) => record_failure(stats, tier, &e),
    }
}

fn record_failure(stats: &mut EngineStats, tier: Tier, error: &PersistenceError) {
    stats.persistence_failures += 1;
    tracing::warn!(%tier, %error, "persistence failure");
}
