//! CLI for the thermolog aggregation engine.
//!
//! Feeds readings from a sensor source into an [`AggregationEngine`] and
//! inspects the logs it maintains.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use thermolog::retention::{LogSummary, RetentionLog};
use thermolog::{AggregationEngine, EngineConfig, Flush, Sample, Tier, parse_reading};
use tracing_subscriber::EnvFilter;

/// thermolog — raw, hourly, and daily temperature logs from a sensor stream.
#[derive(Parser)]
#[command(name = "thermolog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that need an engine configuration.
#[derive(clap::Args)]
struct ConfigArgs {
    /// JSON configuration file (defaults are used when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Read one reading per line from a source and log it.
    Run {
        /// Sensor source: a device node, FIFO, file, or "-" for stdin.
        #[arg(long, default_value = "-")]
        source: String,

        #[command(flatten)]
        config: ConfigArgs,

        /// Keep polling at end of input instead of stopping.
        #[arg(long)]
        follow: bool,

        /// Delay between polls at end of input, in milliseconds.
        #[arg(long, default_value = "1000")]
        poll_ms: u64,

        /// Write partial hourly/daily averages when input ends.
        #[arg(long)]
        flush_partial: bool,
    },

    /// Ingest captured "YYYY-MM-DD HH:MM:SS,value" lines with their own timestamps.
    Replay {
        /// Capture files, ingested in order.
        #[arg(required = true)]
        captures: Vec<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,

        /// Write partial hourly/daily averages after the last capture.
        #[arg(long)]
        flush_partial: bool,
    },

    /// Show each tier log's size, line count, and newest record.
    Info {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Write the default configuration to a JSON file.
    InitConfig {
        /// Destination path.
        path: PathBuf,

        /// Log directory to record in the file.
        #[arg(long, default_value = ".")]
        log_dir: PathBuf,
    },
}

/// Output format for `info`.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text.
    Text,
    /// JSON object.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            source,
            config,
            follow,
            poll_ms,
            flush_partial,
        } => cmd_run(
            &source,
            &config,
            follow,
            Duration::from_millis(poll_ms),
            flush_partial,
        ),
        Commands::Replay {
            captures,
            config,
            flush_partial,
        } => cmd_replay(&captures, &config, flush_partial),
        Commands::Info { config, format } => cmd_info(&config, &format),
        Commands::InitConfig { path, log_dir } => cmd_init_config(&path, log_dir),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

/// Resolves the configuration from `--config` and `--log-dir`.
fn resolve_config(args: &ConfigArgs) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(log_dir) = &args.log_dir {
        config.log_dir.clone_from(log_dir);
    }
    Ok(config)
}

/// Implements `thermolog run`.
fn cmd_run(
    source: &str,
    config: &ConfigArgs,
    follow: bool,
    poll: Duration,
    flush_partial: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = AggregationEngine::new(resolve_config(config)?)?;

    let mut reader: Box<dyn BufRead> = if source == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(source)?))
    };

    tracing::info!(
        source,
        log_dir = %engine.config().log_dir.display(),
        "ingesting readings"
    );

    let mut buf = Vec::new();
    loop {
        let line = match next_line(&mut reader, &mut buf, follow)? {
            SourceLine::Ready(line) => line,
            SourceLine::Pending => {
                std::thread::sleep(poll);
                continue;
            }
            SourceLine::Closed => break,
        };

        let value = match parse_reading(&line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "dropping reading");
                continue;
            }
        };

        let sample = Sample::new(Local::now().naive_local(), value);
        report(&engine.ingest(sample));
    }

    finish(&mut engine, flush_partial)
}

/// One step of reading the sensor source.
#[derive(Debug, PartialEq)]
enum SourceLine {
    /// A complete line, lossily decoded; invalid bytes fail to parse later.
    Ready(String),
    /// No complete line yet; poll again.
    Pending,
    /// End of input and not following.
    Closed,
}

/// Reads the next line from `reader` into `buf`.
///
/// While following, bytes without a trailing newline stay in `buf` until the
/// rest of the line arrives. Otherwise a trailing partial line is returned as
/// the last one.
fn next_line(
    reader: &mut impl BufRead,
    buf: &mut Vec<u8>,
    follow: bool,
) -> io::Result<SourceLine> {
    reader.read_until(b'\n', buf)?;

    if buf.last() != Some(&b'\n') {
        if follow {
            return Ok(SourceLine::Pending);
        }
        if buf.is_empty() {
            return Ok(SourceLine::Closed);
        }
    }

    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    Ok(SourceLine::Ready(line))
}

/// Implements `thermolog replay`.
fn cmd_replay(
    captures: &[PathBuf],
    config: &ConfigArgs,
    flush_partial: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = AggregationEngine::new(resolve_config(config)?)?;

    for capture in captures {
        let reader = BufReader::new(File::open(capture)?);
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            match Sample::parse_line(&line) {
                Ok(sample) => report(&engine.ingest(sample)),
                Err(e) => tracing::warn!(
                    capture = %capture.display(),
                    line = number + 1,
                    error = %e,
                    "dropping reading"
                ),
            }
        }
    }

    finish(&mut engine, flush_partial)
}

/// Optionally finalizes partial buckets and prints the engine counters.
fn finish(
    engine: &mut AggregationEngine,
    flush_partial: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if flush_partial {
        report(&engine.finish(Local::now().naive_local()));
    } else if engine.pending(Tier::Hourly) > 0 {
        tracing::info!(
            hourly = engine.pending(Tier::Hourly),
            daily = engine.pending(Tier::Daily),
            "discarding partial buckets (use --flush-partial to keep them)"
        );
    }

    println!("{}", serde_json::to_string_pretty(engine.stats())?);
    Ok(())
}

fn report(flushes: &[Flush]) {
    for flush in flushes {
        tracing::info!(
            tier = %flush.tier,
            bucket_start = %flush.bucket_start,
            average = flush.average,
            samples = flush.samples,
            "rollup written"
        );
    }
}

/// Implements `thermolog info`.
fn cmd_info(config: &ConfigArgs, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(config)?;

    let mut summaries: Vec<(Tier, RetentionLog, LogSummary)> = Vec::with_capacity(Tier::ALL.len());
    for tier in Tier::ALL {
        let log = config.retention_log(tier);
        let summary = log.summary()?;
        summaries.push((tier, log, summary));
    }
    let archives = config.retention_log(Tier::Daily).archives()?;

    match format {
        OutputFormat::Text => {
            println!("Log directory: {}", config.log_dir.display());
            println!();
            for (tier, log, summary) in &summaries {
                println!("  {tier}: {}", log.path().display());
                println!(
                    "    Lines: {}  Size: {}",
                    summary.lines,
                    format_bytes(summary.bytes)
                );
                if let Some(first) = &summary.first {
                    println!("    First: {}", first.format_line(&config.unit));
                }
                if let Some(last) = &summary.last {
                    println!("    Last:  {}", last.format_line(&config.unit));
                }
            }
            if !archives.is_empty() {
                println!();
                println!("Daily archives: {}", archives.len());
                for (year, path) in &archives {
                    println!("  - {year}: {}", path.display());
                }
            }
        }
        OutputFormat::Json => {
            let tiers: Vec<serde_json::Value> = summaries
                .iter()
                .map(|(tier, log, summary)| {
                    serde_json::json!({
                        "tier": tier,
                        "path": log.path(),
                        "lines": summary.lines,
                        "bytes": summary.bytes,
                        "first": summary.first.map(|r| r.format_line(&config.unit)),
                        "last": summary.last.map(|r| r.format_line(&config.unit)),
                    })
                })
                .collect();
            let archives: Vec<serde_json::Value> = archives
                .iter()
                .map(|(year, path)| serde_json::json!({ "year": year, "path": path }))
                .collect();

            let output = serde_json::json!({
                "log_dir": config.log_dir,
                "tiers": tiers,
                "archives": archives,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `thermolog init-config`.
fn cmd_init_config(path: &Path, log_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::new(log_dir);
    config.save(path)?;
    tracing::info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
