//! Plain-text log line format shared by all three tiers.
//!
//! Every line is `<timestamp> | <value> <unit>[ (<tier> avg)]`:
//!
//! ```text
//! 2024-05-01 12:00:05 | 21.50 °C
//! 2024-05-01 12:00:00 | 21.43 °C (hourly avg)
//! 2024-05-01 00:00:00 | 20.97 °C (daily avg)
//! ```

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp layout used in the leading field of every line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Separator between the fields of a line.
pub const FIELD_SEPARATOR: &str = " | ";

/// One of the three aggregation tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Every ingested sample.
    Raw,
    /// One average per closed hour.
    Hourly,
    /// One average per closed day.
    Daily,
}

impl Tier {
    /// All tiers, highest resolution first.
    pub const ALL: [Tier; 3] = [Tier::Raw, Tier::Hourly, Tier::Daily];

    /// Suffix appended after the unit, if any.
    fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Raw => None,
            Self::Hourly => Some("(hourly avg)"),
            Self::Daily => Some("(daily avg)"),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Hourly => f.write_str("hourly"),
            Self::Daily => f.write_str("daily"),
        }
    }
}

/// A single line in a tier log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    /// Sample time for raw lines, bucket start for rollups.
    pub timestamp: NaiveDateTime,
    /// Reading or average.
    pub value: f64,
    /// Tier the line belongs to.
    pub tier: Tier,
}

impl LogRecord {
    /// Creates a record.
    pub fn new(timestamp: NaiveDateTime, value: f64, tier: Tier) -> Self {
        Self {
            timestamp,
            value,
            tier,
        }
    }

    /// Renders the record as a log line without the terminator.
    pub fn format_line(&self, unit: &str) -> String {
        let ts = self.timestamp.format(TIMESTAMP_FORMAT);
        match self.tier.suffix() {
            Some(suffix) => format!("{ts}{FIELD_SEPARATOR}{:.2} {unit} {suffix}", self.value),
            None => format!("{ts}{FIELD_SEPARATOR}{:.2} {unit}", self.value),
        }
    }

    /// Parses a line back into a record.
    ///
    /// The tier is taken from the suffix; lines without one are raw. Returns
    /// `None` if the timestamp or value field does not parse.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (ts, rest) = line.split_once(FIELD_SEPARATOR)?;
        let timestamp = NaiveDateTime::parse_from_str(ts.trim(), TIMESTAMP_FORMAT).ok()?;
        let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;
        let tier = if rest.ends_with("(hourly avg)") {
            Tier::Hourly
        } else if rest.ends_with("(daily avg)") {
            Tier::Daily
        } else {
            Tier::Raw
        };
        Some(Self {
            timestamp,
            value,
            tier,
        })
    }
}

/// Reads the leading timestamp field of a log line.
///
/// Only the timestamp has to be well formed; the rest of the line is ignored.
pub fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let field = match line.split_once(FIELD_SEPARATOR) {
        Some((ts, _)) => ts,
        None => line,
    };
    NaiveDateTime::parse_from_str(field.trim(), TIMESTAMP_FORMAT).ok()
}
