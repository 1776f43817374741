//! Samples and the decoding boundary in front of the engine.
//!
//! Readings arrive from the sensor source as short text lines such as
//! `21.5`, `21.5C`, or `21.50 °C`. Anything that does not decode to a finite
//! number is rejected here with a [`SampleError`] so the engine never sees it.

use chrono::NaiveDateTime;

use crate::error::SampleError;
use crate::record::TIMESTAMP_FORMAT;

/// Unit suffixes stripped from a reading before parsing.
const UNIT_SUFFIXES: [&str; 3] = ["°C", "ºC", "C"];

/// A single timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Wall-clock time the reading was taken.
    pub timestamp: NaiveDateTime,
    /// The reading.
    pub value: f64,
}

impl Sample {
    /// Creates a sample.
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Parses a captured `YYYY-MM-DD HH:MM:SS,<reading>` line.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError`] if either field is missing or malformed.
    pub fn parse_line(line: &str) -> Result<Self, SampleError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(SampleError::Empty);
        }

        let (ts, reading) = line.split_once(',').ok_or_else(|| SampleError::Malformed {
            input: line.to_string(),
            reason: "expected '<timestamp>,<value>'".to_string(),
        })?;

        let timestamp = NaiveDateTime::parse_from_str(ts.trim(), TIMESTAMP_FORMAT).map_err(|e| {
            SampleError::Malformed {
                input: line.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            timestamp,
            value: parse_reading(reading)?,
        })
    }
}

/// Decodes a single text reading into a finite value.
///
/// # Errors
///
/// Returns [`SampleError::Empty`] for blank input, [`SampleError::Malformed`]
/// if the text is not a number, and [`SampleError::NonFinite`] for NaN or
/// infinities.
pub fn parse_reading(input: &str) -> Result<f64, SampleError> {
    let mut text = input.trim();
    for suffix in UNIT_SUFFIXES {
        if let Some(stripped) = text.strip_suffix(suffix) {
            text = stripped.trim_end();
            break;
        }
    }

    if text.is_empty() {
        return Err(SampleError::Empty);
    }

    let value: f64 = text.parse().map_err(|e: std::num::ParseFloatError| SampleError::Malformed {
        input: input.trim().to_string(),
        reason: e.to_string(),
    })?;

    if !value.is_finite() {
        return Err(SampleError::NonFinite { value });
    }

    Ok(value)
}
