//! Time-bucket arithmetic for the hourly and daily tiers.
//!
//! A bucket identifier is `floor(seconds / width)` where `seconds` is the
//! wall-clock timestamp read as if it were UTC. Reading local wall-clock time
//! that way keeps hour and day boundaries aligned with what the log lines show.
//!
//! Transitions use a strict `>`: a sample whose bucket is equal to or older
//! than the bucket being tracked never triggers a flush, and a jump across
//! several widths only ever reports the single transition into the newest
//! bucket. Empty buckets in between are never backfilled.

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Seconds in one hour.
const SECS_PER_HOUR: i64 = 3_600;

/// Seconds in one day.
const SECS_PER_DAY: i64 = 86_400;

/// Width of an aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// One-hour buckets.
    Hour,
    /// One-day buckets.
    Day,
}

impl Resolution {
    /// Bucket width in seconds.
    pub fn width_secs(self) -> i64 {
        match self {
            Self::Hour => SECS_PER_HOUR,
            Self::Day => SECS_PER_DAY,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour => f.write_str("hour"),
            Self::Day => f.write_str("day"),
        }
    }
}

/// Identifier of a fixed-width time bucket.
///
/// Ordered, so later buckets compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId(i64);

impl BucketId {
    /// Raw bucket index (`floor(seconds / width)`).
    pub fn index(self) -> i64 {
        self.0
    }
}

/// Stateless bucket computations.
pub struct BucketClock;

impl BucketClock {
    /// Returns the bucket `timestamp` falls into at `resolution`.
    ///
    /// Uses floor division so pre-epoch timestamps still round down.
    pub fn bucket_of(timestamp: NaiveDateTime, resolution: Resolution) -> BucketId {
        let secs = timestamp.and_utc().timestamp();
        BucketId(secs.div_euclid(resolution.width_secs()))
    }

    /// Returns the wall-clock start of `bucket`.
    ///
    /// Falls back to the Unix epoch for indices outside chrono's range, which
    /// cannot be produced by [`BucketClock::bucket_of`].
    pub fn bucket_start(bucket: BucketId, resolution: Resolution) -> NaiveDateTime {
        bucket
            .0
            .checked_mul(resolution.width_secs())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default()
            .naive_utc()
    }

    /// Returns `true` if `current` starts a bucket later than `last`.
    ///
    /// `None` means no bucket has been seen yet and compares lower than any
    /// real bucket.
    pub fn is_transition(last: Option<BucketId>, current: BucketId) -> bool {
        last.is_none_or(|last| current > last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_same_hour_same_bucket() {
        let a = BucketClock::bucket_of(at(2024, 5, 1, 12, 0, 5), Resolution::Hour);
        let b = BucketClock::bucket_of(at(2024, 5, 1, 12, 59, 59), Resolution::Hour);
        let c = BucketClock::bucket_of(at(2024, 5, 1, 13, 0, 1), Resolution::Hour);
        assert_eq!(a, b);
        assert_eq!(c.index(), a.index() + 1);
    }

    #[test]
    fn test_bucket_start_is_aligned() {
        let ts = at(2024, 5, 1, 12, 34, 56);

        let hour = BucketClock::bucket_of(ts, Resolution::Hour);
        assert_eq!(
            BucketClock::bucket_start(hour, Resolution::Hour),
            at(2024, 5, 1, 12, 0, 0)
        );

        let day = BucketClock::bucket_of(ts, Resolution::Day);
        assert_eq!(
            BucketClock::bucket_start(day, Resolution::Day),
            at(2024, 5, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_transition_is_strictly_greater() {
        let earlier = BucketClock::bucket_of(at(2024, 5, 1, 11, 0, 0), Resolution::Hour);
        let current = BucketClock::bucket_of(at(2024, 5, 1, 12, 0, 0), Resolution::Hour);
        let later = BucketClock::bucket_of(at(2024, 5, 1, 15, 0, 0), Resolution::Hour);

        assert!(BucketClock::is_transition(None, current));
        assert!(!BucketClock::is_transition(Some(current), current));
        assert!(!BucketClock::is_transition(Some(current), earlier));
        assert!(BucketClock::is_transition(Some(current), later));
    }

    #[test]
    fn test_pre_epoch_floors_down() {
        let ts = at(1969, 12, 31, 23, 30, 0);
        let bucket = BucketClock::bucket_of(ts, Resolution::Hour);
        assert_eq!(bucket.index(), -1);
        assert_eq!(
            BucketClock::bucket_start(bucket, Resolution::Hour),
            at(1969, 12, 31, 23, 0, 0)
        );
    }

    #[test]
    fn test_day_boundary() {
        let before = BucketClock::bucket_of(at(2024, 12, 31, 23, 59, 59), Resolution::Day);
        let after = BucketClock::bucket_of(at(2025, 1, 1, 0, 0, 0), Resolution::Day);
        assert!(BucketClock::is_transition(Some(before), after));
    }
}
