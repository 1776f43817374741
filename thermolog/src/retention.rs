//! Append-only tier logs and their retention rules.
//!
//! A [`RetentionLog`] never holds its file open between calls: every append
//! opens in append mode, writes one line and closes, and every trim reads the
//! whole file and swaps in a rewritten copy. External tools can therefore
//! read, copy, or rename the logs between calls without coordination.
//!
//! # Retention rules
//!
//! | Tier   | Rule                                   | Operation                     |
//! |--------|----------------------------------------|-------------------------------|
//! | raw    | drop lines older than `now - window`   | [`RetentionLog::trim_raw`]    |
//! | hourly | keep the last `max_lines` lines        | [`RetentionLog::trim_hourly`] |
//! | daily  | archive the file at a year boundary    | [`RetentionLog::rotate_daily`]|
//!
//! # File Layout
//!
//! ```text
//! log_dir/
//! ├── temperature_raw.log          <- raw, trailing 24h
//! ├── temperature_hourly.log       <- hourly, last 720 lines
//! ├── temperature_daily.log        <- daily, current year
//! ├── temperature_daily_2024.log   <- archived year
//! └── temperature_daily_2023.log
//! ```
//!
//! Logs are handled as bytes. A line with invalid UTF-8 (a torn write, say)
//! is kept verbatim and never blocks a trim of the lines around it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, TimeDelta};

use crate::error::PersistenceError;
use crate::record::{LogRecord, parse_timestamp};

/// Policy bounding how much history a log keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionRule {
    /// Keep lines whose timestamp is within `window` of now.
    TimeWindow(Duration),
    /// Keep at most this many trailing lines.
    MaxLines(usize),
    /// Rename the file to a per-year archive when the year rolls over.
    YearlyArchive,
}

impl RetentionRule {
    /// Whether the rule runs before an append rather than after it.
    ///
    /// The yearly archive must move last year's file away before the first
    /// record of a new year is written; the trims act on what was appended.
    pub fn runs_before_append(self) -> bool {
        matches!(self, Self::YearlyArchive)
    }
}

/// What a retention pass did to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionOutcome {
    /// Nothing needed to change.
    Unchanged,
    /// Leading lines were dropped.
    Trimmed {
        /// Number of lines removed.
        dropped: usize,
    },
    /// The active file was renamed to a yearly archive.
    Archived {
        /// The archive path.
        to: PathBuf,
        /// Year the archive covers.
        year: i32,
    },
}

/// Line count, byte size, and first/last records of a log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    /// Number of lines.
    pub lines: usize,
    /// File size in bytes.
    pub bytes: u64,
    /// First line that parses as a record.
    pub first: Option<LogRecord>,
    /// Last line that parses as a record.
    pub last: Option<LogRecord>,
}

/// An append-only text log with a retention rule.
#[derive(Debug, Clone)]
pub struct RetentionLog {
    /// Path of the active log file.
    path: PathBuf,
    /// Rule applied by [`RetentionLog::enforce`].
    rule: RetentionRule,
}

impl RetentionLog {
    /// Creates a handle for the log at `path`. The file is not touched.
    pub fn new<P: Into<PathBuf>>(path: P, rule: RetentionRule) -> Self {
        Self {
            path: path.into(),
            rule,
        }
    }

    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured retention rule.
    pub fn rule(&self) -> RetentionRule {
        self.rule
    }

    /// Appends `line` plus a newline, opening and closing the file.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Open`] or [`PersistenceError::Write`].
    pub fn append(&self, line: &str) -> Result<(), PersistenceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PersistenceError::Open {
                path: self.path.clone(),
                source: e,
            })?;

        writeln!(file, "{line}").map_err(|e| PersistenceError::Write {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Runs the configured rule.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying trim or rotate call.
    pub fn enforce(&self, now: NaiveDateTime) -> Result<RetentionOutcome, PersistenceError> {
        match self.rule {
            RetentionRule::TimeWindow(window) => self.trim_raw(now, window),
            RetentionRule::MaxLines(max_lines) => self.trim_hourly(max_lines),
            RetentionRule::YearlyArchive => self.rotate_daily(now),
        }
    }

    /// Drops leading lines stamped before `now - window`.
    ///
    /// Scanning stops at the first line that is recent enough or has no
    /// parseable timestamp; that line and everything after it are kept in
    /// order. The file is rewritten only if something was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the log cannot be read or rewritten.
    pub fn trim_raw(
        &self,
        now: NaiveDateTime,
        window: Duration,
    ) -> Result<RetentionOutcome, PersistenceError> {
        let Some(cutoff) = TimeDelta::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return Ok(RetentionOutcome::Unchanged);
        };

        let Some(content) = self.read()? else {
            return Ok(RetentionOutcome::Unchanged);
        };
        let lines = split_lines(&content);

        let dropped = lines
            .iter()
            .take_while(|line| line_timestamp(line).is_some_and(|ts| ts < cutoff))
            .count();

        if dropped == 0 {
            return Ok(RetentionOutcome::Unchanged);
        }

        self.rewrite(&lines[dropped..])?;
        Ok(RetentionOutcome::Trimmed { dropped })
    }

    /// Keeps only the last `max_lines` lines.
    ///
    /// Idempotent: a second call without an append in between is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the log cannot be read or rewritten.
    pub fn trim_hourly(&self, max_lines: usize) -> Result<RetentionOutcome, PersistenceError> {
        let Some(content) = self.read()? else {
            return Ok(RetentionOutcome::Unchanged);
        };
        let lines = split_lines(&content);

        if lines.len() <= max_lines {
            return Ok(RetentionOutcome::Unchanged);
        }

        let dropped = lines.len() - max_lines;
        self.rewrite(&lines[dropped..])?;
        Ok(RetentionOutcome::Trimmed { dropped })
    }

    /// Archives the log if it was last written in a year before `now`.
    ///
    /// `now` is the time of the record about to be appended, so the engine
    /// calls this before the append: a record never lands in a file holding
    /// an earlier year, even after a restart. The year is taken from the last
    /// line with a parseable timestamp. The file is renamed to
    /// [`RetentionLog::archive_path`] for that year and the next append starts
    /// a fresh log. A missing file, or one without any parseable line, is left
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Rename`] if the rename fails or the archive
    /// already exists; an existing archive is never overwritten.
    pub fn rotate_daily(&self, now: NaiveDateTime) -> Result<RetentionOutcome, PersistenceError> {
        let Some(content) = self.read()? else {
            return Ok(RetentionOutcome::Unchanged);
        };

        let Some(last_written) = split_lines(&content).iter().rev().find_map(line_timestamp)
        else {
            return Ok(RetentionOutcome::Unchanged);
        };

        let year = last_written.year();
        if now.year() <= year {
            return Ok(RetentionOutcome::Unchanged);
        }

        let archive = self.archive_path(year);
        if archive.exists() {
            return Err(PersistenceError::Rename {
                from: self.path.clone(),
                to: archive,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "archive already exists"),
            });
        }

        fs::rename(&self.path, &archive).map_err(|e| PersistenceError::Rename {
            from: self.path.clone(),
            to: archive.clone(),
            source: e,
        })?;

        Ok(RetentionOutcome::Archived { to: archive, year })
    }

    /// Archive path for `year`: `<stem>_<year>.<ext>` beside the active log.
    pub fn archive_path(&self, year: i32) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{stem}_{year}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{year}"),
        };
        self.path.with_file_name(name)
    }

    /// Lists existing yearly archives, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Read`] if the directory cannot be listed.
    pub fn archives(&self) -> Result<Vec<(i32, PathBuf)>, PersistenceError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistenceError::Read {
                    path: dir,
                    source: e,
                });
            }
        };

        let mut archives: Vec<(i32, PathBuf)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| {
                let year = self.archive_year(&path)?;
                Some((year, path))
            })
            .collect();
        archives.sort();
        Ok(archives)
    }

    /// Reads line count, size, and boundary records.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Read`] if the log exists but cannot be read.
    pub fn summary(&self) -> Result<LogSummary, PersistenceError> {
        let Some(content) = self.read()? else {
            return Ok(LogSummary {
                lines: 0,
                bytes: 0,
                first: None,
                last: None,
            });
        };

        let lines = split_lines(&content);
        let record = |line: &&[u8]| LogRecord::parse_line(&String::from_utf8_lossy(line));

        Ok(LogSummary {
            lines: lines.len(),
            bytes: content.len() as u64,
            first: lines.iter().find_map(record),
            last: lines.iter().rev().find_map(record),
        })
    }

    /// Recovers the year from an archive file name produced by `archive_path`.
    fn archive_year(&self, candidate: &Path) -> Option<i32> {
        let year: i32 = candidate
            .file_stem()?
            .to_str()?
            .strip_prefix(self.path.file_stem()?.to_str()?)?
            .strip_prefix('_')?
            .parse()
            .ok()?;
        (self.archive_path(year).file_name() == candidate.file_name()).then_some(year)
    }

    /// Reads the whole log, or `None` if it does not exist.
    fn read(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Read {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Replaces the log with `lines` via a sibling temp file and a rename.
    fn rewrite(&self, lines: &[&[u8]]) -> Result<(), PersistenceError> {
        let tmp = self.tmp_path();

        let mut content = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            content.extend_from_slice(line);
            content.push(b'\n');
        }

        fs::write(&tmp, content).map_err(|e| PersistenceError::Write {
            path: tmp.clone(),
            source: e,
        })?;

        fs::rename(&tmp, &self.path).map_err(|e| PersistenceError::Rename {
            from: tmp,
            to: self.path.clone(),
            source: e,
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

/// Splits log content into lines without their `\n` terminators.
fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    let content = content.strip_suffix(b"\n").unwrap_or(content);
    if content.is_empty() {
        return Vec::new();
    }
    content.split(|&b| b == b'\n').collect()
}

/// Timestamp at the start of a raw line; invalid UTF-8 elsewhere is ignored.
fn line_timestamp(line: &&[u8]) -> Option<NaiveDateTime> {
    parse_timestamp(&String::from_utf8_lossy(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_append_creates_and_appends() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("a.txt"), RetentionRule::MaxLines(10));

        log.append("one").unwrap();
        log.append("two").unwrap();

        assert_eq!(fs::read_to_string(log.path()).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_append_to_missing_dir_fails() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(
            temp_dir.path().join("nope").join("a.txt"),
            RetentionRule::MaxLines(10),
        );
        assert!(matches!(
            log.append("x"),
            Err(PersistenceError::Open { .. })
        ));
    }

    #[test]
    fn test_trim_raw_stops_at_unparseable_line() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(
            temp_dir.path().join("raw.txt"),
            RetentionRule::TimeWindow(Duration::from_secs(86_400)),
        );
        log.append("2024-01-01 00:00:00 | 1.00 °C").unwrap();
        log.append("corrupted").unwrap();
        log.append("2024-01-01 01:00:00 | 2.00 °C").unwrap();
        log.append("2024-01-03 00:00:00 | 3.00 °C").unwrap();

        let outcome = log.enforce(at(2024, 1, 3, 0)).unwrap();
        assert_eq!(outcome, RetentionOutcome::Trimmed { dropped: 1 });
        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "corrupted\n2024-01-01 01:00:00 | 2.00 °C\n2024-01-03 00:00:00 | 3.00 °C\n"
        );
    }

    #[test]
    fn test_trim_raw_keeps_boundary_line() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(
            temp_dir.path().join("raw.txt"),
            RetentionRule::TimeWindow(Duration::from_secs(3_600)),
        );
        log.append("2024-01-01 10:00:00 | 1.00 °C").unwrap();
        log.append("2024-01-01 11:00:00 | 2.00 °C").unwrap();

        let outcome = log.trim_raw(at(2024, 1, 1, 11), Duration::from_secs(3_600)).unwrap();
        assert_eq!(outcome, RetentionOutcome::Unchanged);
        assert_eq!(log.summary().unwrap().lines, 2);
    }

    #[test]
    fn test_trim_missing_file_is_noop() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("x.txt"), RetentionRule::MaxLines(1));
        assert_eq!(log.trim_hourly(1).unwrap(), RetentionOutcome::Unchanged);
        assert_eq!(
            log.trim_raw(at(2024, 1, 1, 0), Duration::from_secs(60)).unwrap(),
            RetentionOutcome::Unchanged
        );
        assert_eq!(log.rotate_daily(at(2024, 1, 1, 0)).unwrap(), RetentionOutcome::Unchanged);
        assert!(!log.path().exists());
    }

    #[test]
    fn test_trim_hourly_keeps_tail() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("h.txt"), RetentionRule::MaxLines(3));
        for i in 0..5 {
            log.append(&format!("line {i}")).unwrap();
        }

        assert_eq!(log.trim_hourly(3).unwrap(), RetentionOutcome::Trimmed { dropped: 2 });
        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "line 2\nline 3\nline 4\n"
        );
        assert!(!log.tmp_path().exists());
    }

    #[test]
    fn test_rotate_daily_same_year_is_noop() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("daily.txt"), RetentionRule::YearlyArchive);
        log.append("2024-06-01 00:00:00 | 20.00 °C (daily avg)").unwrap();

        assert_eq!(log.rotate_daily(at(2024, 12, 31, 23)).unwrap(), RetentionOutcome::Unchanged);
        assert!(log.path().exists());
    }

    #[test]
    fn test_rotate_daily_without_timestamps_is_noop() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("daily.txt"), RetentionRule::YearlyArchive);
        log.append("no timestamp here").unwrap();

        assert_eq!(log.rotate_daily(at(2030, 1, 1, 0)).unwrap(), RetentionOutcome::Unchanged);
    }

    #[test]
    fn test_rotate_daily_refuses_to_overwrite_archive() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("daily.txt"), RetentionRule::YearlyArchive);
        log.append("2024-12-31 00:00:00 | 1.00 °C (daily avg)").unwrap();
        fs::write(log.archive_path(2024), "older archive\n").unwrap();

        assert!(matches!(
            log.rotate_daily(at(2025, 1, 1, 0)),
            Err(PersistenceError::Rename { .. })
        ));
        assert!(log.path().exists());
        assert_eq!(
            fs::read_to_string(log.archive_path(2024)).unwrap(),
            "older archive\n"
        );
    }

    #[test]
    fn test_archive_path_and_listing() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(
            temp_dir.path().join("temperature_daily.log"),
            RetentionRule::YearlyArchive,
        );
        assert_eq!(
            log.archive_path(2024),
            temp_dir.path().join("temperature_daily_2024.log")
        );

        fs::write(log.archive_path(2023), "").unwrap();
        fs::write(log.archive_path(2021), "").unwrap();
        fs::write(temp_dir.path().join("temperature_daily_backup.log"), "").unwrap();
        fs::write(temp_dir.path().join("temperature_daily_2022.bak"), "").unwrap();

        let years: Vec<i32> = log.archives().unwrap().into_iter().map(|(y, _)| y).collect();
        assert_eq!(years, vec![2021, 2023]);
    }

    #[test]
    fn test_summary() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("h.txt"), RetentionRule::MaxLines(10));
        log.append("header").unwrap();
        log.append("2024-01-01 00:00:00 | 1.00 °C (hourly avg)").unwrap();
        log.append("2024-01-01 01:00:00 | 3.00 °C (hourly avg)").unwrap();

        let summary = log.summary().unwrap();
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.first.unwrap().timestamp, at(2024, 1, 1, 0));
        assert!((summary.last.unwrap().value - 3.0).abs() < f64::EPSILON);
        assert!(summary.bytes > 0);
    }

    #[test]
    fn test_trim_raw_keeps_invalid_utf8_verbatim() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(
            temp_dir.path().join("raw.log"),
            RetentionRule::TimeWindow(Duration::from_secs(86_400)),
        );
        let mut content = b"2024-01-01 00:00:00 | 1.00 \xC2\n".to_vec();
        content.extend_from_slice(b"2024-01-02 12:00:00 | 2.00 \xC2\n");
        content.extend_from_slice(b"2024-01-03 00:00:00 | 3.00 \xC2\xB0C\n");
        fs::write(log.path(), &content).unwrap();

        let outcome = log.trim_raw(at(2024, 1, 3, 0), Duration::from_secs(86_400)).unwrap();
        assert_eq!(outcome, RetentionOutcome::Trimmed { dropped: 1 });

        let mut expected = b"2024-01-02 12:00:00 | 2.00 \xC2\n".to_vec();
        expected.extend_from_slice(b"2024-01-03 00:00:00 | 3.00 \xC2\xB0C\n");
        assert_eq!(fs::read(log.path()).unwrap(), expected);
    }

    #[test]
    fn test_rotate_and_summary_read_past_invalid_utf8() {
        let temp_dir = tempdir().unwrap();
        let log = RetentionLog::new(temp_dir.path().join("daily.log"), RetentionRule::YearlyArchive);
        fs::write(
            log.path(),
            b"2024-12-30 00:00:00 | 1.00 \xC2\xB0C (daily avg)\n\xFF\xFE\n",
        )
        .unwrap();

        let summary = log.summary().unwrap();
        assert_eq!(summary.lines, 2);
        assert_eq!(summary.last.unwrap().timestamp, at(2024, 12, 30, 0));

        assert_eq!(
            log.rotate_daily(at(2025, 1, 1, 0)).unwrap(),
            RetentionOutcome::Archived {
                to: log.archive_path(2024),
                year: 2024
            }
        );
    }

    #[test]
    fn test_only_yearly_archive_runs_before_append() {
        assert!(RetentionRule::YearlyArchive.runs_before_append());
        assert!(!RetentionRule::MaxLines(720).runs_before_append());
        assert!(!RetentionRule::TimeWindow(Duration::from_secs(1)).runs_before_append());
    }
}
