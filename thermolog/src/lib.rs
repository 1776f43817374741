//! # thermolog
//!
//! Rolling aggregation and log retention for a single sensor stream.
//!
//! thermolog ingests timestamped temperature readings and keeps three
//! plain-text logs: every raw reading for the trailing 24 hours, one average
//! per closed hour for the last 720 hours, and one average per closed day for
//! the current year, archived per year.
//!
//! ## Key Properties
//!
//! - Bucket boundaries are emitted exactly once; empty buckets are skipped
//! - Rollup lines are stamped with the start of the bucket they summarize
//! - Every log is opened, written, and closed per call
//! - Persistence failures are logged and counted, never fatal to ingestion
//! - No background threads; every call runs to completion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use thermolog::{AggregationEngine, EngineConfig, Sample};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = AggregationEngine::new(EngineConfig::new("./logs"))?;
//!
//! let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! engine.ingest(Sample::new(day.and_hms_opt(12, 0, 5).unwrap(), 21.0));
//! engine.ingest(Sample::new(day.and_hms_opt(12, 59, 59).unwrap(), 23.0));
//!
//! // Crossing into 13:00 closes the 12:00 bucket.
//! let flushes = engine.ingest(Sample::new(day.and_hms_opt(13, 0, 1).unwrap(), 30.0));
//! assert_eq!(flushes[0].average, 22.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`engine`] — Tier state and the ingest path
//! - [`rolling`] — Fixed-capacity running mean
//! - [`bucket`] — Hour/day bucket arithmetic
//! - [`retention`] — Append-only logs and their retention rules
//! - [`record`] — Log line format
//! - [`sample`] — Samples and reading decoding
//! - [`config`] — Engine configuration
//! - [`error`] — Error types

pub mod bucket;
pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod retention;
pub mod rolling;
pub mod sample;

// Re-export primary API types at crate root for convenience.
pub use bucket::{BucketClock, BucketId, Resolution};
pub use config::EngineConfig;
pub use engine::{AggregationEngine, EngineStats, Flush};
pub use error::{Result, ThermologError};
pub use record::{LogRecord, Tier};
pub use retention::{RetentionLog, RetentionOutcome, RetentionRule};
pub use rolling::RollingAverage;
pub use sample::{Sample, parse_reading};
