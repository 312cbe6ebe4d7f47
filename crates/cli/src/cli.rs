use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime};
use clap::Parser;

use bgpstage_core::PipelineConfig;

/// Ingest BGP update records into per-link and per-prefix aggregates.
///
/// Flags override `bgpstage.toml` and `BGPSTAGE_*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "bgpstage", about = "Parallel BGP record ingestion into SQLite aggregates")]
pub struct CliArgs {
    /// Path to a TOML config file
    #[arg(long, env = "BGPSTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Start of the range: unix seconds, RFC 3339, or "YYYY-mm-dd HH:MM:SS" (UTC)
    #[arg(long, value_parser = parse_time)]
    pub start: Option<i64>,

    /// End of the range (exclusive), same formats as --start
    #[arg(long, value_parser = parse_time)]
    pub end: Option<i64>,

    /// Time chunks per feed
    #[arg(long)]
    pub chunks: Option<u32>,

    /// Comma-separated feed (collector) list
    #[arg(long, value_delimiter = ',')]
    pub feeds: Vec<String>,

    /// Database file written at the end of the run
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Session name, used for the log file and snapshot names
    #[arg(long)]
    pub session: Option<String>,

    /// Directory holding `<feed>.jsonl` record files
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Directory for checkpoint snapshots
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Writer iterations between checkpoint snapshots
    #[arg(long)]
    pub snapshot_every: Option<u64>,

    /// Preload this snapshot before ingesting
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Directory for the session log file
    #[arg(long, env = "BGPSTAGE_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}

impl CliArgs {
    /// Layer the given flags over `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(v) = self.start {
            config.start = v;
        }
        if let Some(v) = self.end {
            config.end = v;
        }
        if let Some(v) = self.chunks {
            config.chunks = v;
        }
        if !self.feeds.is_empty() {
            config.feeds = self
                .feeds
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
        }
        if let Some(v) = &self.database {
            config.database = v.clone();
        }
        if let Some(v) = &self.session {
            config.session = v.clone();
        }
        if let Some(v) = &self.source_dir {
            config.source_dir = v.clone();
        }
        if let Some(v) = &self.snapshot_dir {
            config.snapshot_dir = v.clone();
        }
        if let Some(v) = self.snapshot_every {
            config.tuning.snapshot_every = Some(v);
        }
        if let Some(v) = &self.resume {
            config.resume_from = Some(v.clone());
        }
    }
}

/// Parse a timestamp given as unix seconds or a UTC date-time.
pub fn parse_time(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| format!("unrecognized time '{raw}'"))
}
