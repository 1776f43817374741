//! Error types for the thermolog aggregation engine.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all thermolog operations.
///
/// Only configuration and boundary parsing errors ever reach a caller of the
/// engine; persistence failures are logged and counted inside
/// [`AggregationEngine`](crate::engine::AggregationEngine) so ingestion keeps
/// running.
#[derive(Error, Debug)]
pub enum ThermologError {
    /// An average was requested from an accumulator with no samples.
    #[error("average error: {0}")]
    Average(#[from] AverageError),

    /// A log file could not be opened, read, written, or renamed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// A reading delivered by the sensor source could not be decoded.
    #[error("sample error: {0}")]
    Sample(#[from] SampleError),

    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by [`RollingAverage`](crate::rolling::RollingAverage).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageError {
    /// The accumulator holds no samples, so the mean is undefined.
    #[error("average requested on an empty buffer")]
    EmptyBuffer,
}

/// Errors that can occur while persisting tier logs.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The log file could not be opened for append.
    #[error("failed to open log '{}': {source}", path.display())]
    Open {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The log file could not be read back for trimming or rotation.
    #[error("failed to read log '{}': {source}", path.display())]
    Read {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending to or rewriting the log file failed.
    #[error("failed to write log '{}': {source}", path.display())]
    Write {
        /// The log file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Renaming a log file (temp swap or yearly archive) failed.
    #[error("failed to rename log '{}' to '{}': {source}", from.display(), to.display())]
    Rename {
        /// The source path.
        from: PathBuf,
        /// The destination path.
        to: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised when decoding a reading at the sensor boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    /// The reading was empty after trimming whitespace and unit suffixes.
    #[error("empty reading")]
    Empty,

    /// The reading could not be parsed as a number or timestamp.
    #[error("malformed reading '{input}': {reason}")]
    Malformed {
        /// The raw input text.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The reading parsed but is infinite or NaN.
    #[error("non-finite reading: {value}")]
    NonFinite {
        /// The rejected value.
        value: f64,
    },
}

/// Errors that can occur while loading, saving, or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to load config from '{}': {source}", path.display())]
    Load {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`EngineConfig`](crate::config::EngineConfig).
    #[error("failed to parse config from '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration could not be written.
    #[error("failed to save config to '{}': {source}", path.display())]
    Save {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of what is invalid.
        reason: String,
    },
}

/// Type alias for `Result<T, ThermologError>`.
pub type Result<T> = std::result::Result<T, ThermologError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_errors_convert_into_top_level() {
        let err: ThermologError = AverageError::EmptyBuffer.into();
        assert!(matches!(
            err,
            ThermologError::Average(AverageError::EmptyBuffer)
        ));
        assert_eq!(
            err.to_string(),
            "average error: average requested on an empty buffer"
        );
    }

    #[test]
    fn test_persistence_error_names_path() {
        let err = PersistenceError::Open {
            path: PathBuf::from("/nope/temperature_raw.log"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope/temperature_raw.log"));
        assert!(msg.contains("missing"));
    }
}
