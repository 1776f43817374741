//! Engine configuration.
//!
//! Configuration is plain JSON so it can be written once with
//! `thermolog init-config` and edited by hand. Durations are stored as
//! fractional seconds.
//!
//! # Example
//!
//! ```rust
//! use thermolog::config::EngineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new("./logs");
//! config.validate()?;
//! assert_eq!(config.hourly_max_lines, 720);
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::record::Tier;
use crate::retention::{RetentionLog, RetentionRule};

/// Default raw log file name.
pub const DEFAULT_RAW_FILE: &str = "temperature_raw.log";

/// Default hourly log file name.
pub const DEFAULT_HOURLY_FILE: &str = "temperature_hourly.log";

/// Default daily log file name.
pub const DEFAULT_DAILY_FILE: &str = "temperature_daily.log";

/// Default raw retention window (24 hours).
pub const DEFAULT_RAW_RETENTION: Duration = Duration::from_secs(24 * 3_600);

/// Default hourly line budget (30 days of hourly averages).
pub const DEFAULT_HOURLY_MAX_LINES: usize = 720;

/// Configuration for an [`AggregationEngine`](crate::engine::AggregationEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the three tier logs.
    pub log_dir: PathBuf,

    /// Raw log file name inside `log_dir`.
    pub raw_file: String,

    /// Hourly log file name inside `log_dir`.
    pub hourly_file: String,

    /// Daily log file name inside `log_dir`.
    pub daily_file: String,

    /// How far back the raw log keeps lines.
    #[serde(with = "duration_serde")]
    pub raw_retention: Duration,

    /// Maximum number of lines kept in the hourly log.
    pub hourly_max_lines: usize,

    /// Number of samples in the live raw sliding window.
    pub raw_window: usize,

    /// Sample capacity of the hourly accumulator.
    ///
    /// Must cover one hour of readings, otherwise the oldest samples of an
    /// hour slide out before the flush.
    pub hourly_capacity: usize,

    /// Sample capacity of the daily accumulator.
    pub daily_capacity: usize,

    /// Unit written after each value.
    pub unit: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("."),
            raw_file: DEFAULT_RAW_FILE.to_string(),
            hourly_file: DEFAULT_HOURLY_FILE.to_string(),
            daily_file: DEFAULT_DAILY_FILE.to_string(),
            raw_retention: DEFAULT_RAW_RETENTION,
            hourly_max_lines: DEFAULT_HOURLY_MAX_LINES,
            raw_window: 60,
            // Two readings per second.
            hourly_capacity: 7_200,
            daily_capacity: 172_800,
            unit: "°C".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration rooted at `log_dir`.
    pub fn new<P: Into<PathBuf>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if serialization or the write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize { source: e })?;

        fs::write(path, content).map_err(|e| ConfigError::Save {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a capacity, retention, or line
    /// budget is zero, a file name is empty, or two tiers share a file.
    pub fn validate(&self) -> Result<()> {
        if self.raw_retention.is_zero() {
            return Err(invalid("raw_retention cannot be zero"));
        }

        if self.hourly_max_lines == 0 {
            return Err(invalid("hourly_max_lines must be > 0"));
        }

        for (name, capacity) in [
            ("raw_window", self.raw_window),
            ("hourly_capacity", self.hourly_capacity),
            ("daily_capacity", self.daily_capacity),
        ] {
            if capacity == 0 {
                return Err(invalid(&format!("{name} must be > 0")));
            }
        }

        let files = [&self.raw_file, &self.hourly_file, &self.daily_file];
        if files.iter().any(|f| f.trim().is_empty()) {
            return Err(invalid("log file names cannot be empty"));
        }
        if files[0] == files[1] || files[0] == files[2] || files[1] == files[2] {
            return Err(invalid("each tier needs its own log file"));
        }

        Ok(())
    }

    /// Full path of the log for `tier`.
    pub fn log_path(&self, tier: Tier) -> PathBuf {
        let file = match tier {
            Tier::Raw => &self.raw_file,
            Tier::Hourly => &self.hourly_file,
            Tier::Daily => &self.daily_file,
        };
        self.log_dir.join(file)
    }

    /// Log handle for `tier` with the tier's retention rule.
    ///
    /// Raw keeps a time window, hourly a line budget, daily a yearly archive.
    pub fn retention_log(&self, tier: Tier) -> RetentionLog {
        let rule = match tier {
            Tier::Raw => RetentionRule::TimeWindow(self.raw_retention),
            Tier::Hourly => RetentionRule::MaxLines(self.hourly_max_lines),
            Tier::Daily => RetentionRule::YearlyArchive,
        };
        RetentionLog::new(self.log_path(tier), rule)
    }
}

fn invalid(reason: &str) -> crate::error::ThermologError {
    ConfigError::Invalid {
        reason: reason.to_string(),
    }
    .into()
}

/// Serde helper for `Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
    }
}
