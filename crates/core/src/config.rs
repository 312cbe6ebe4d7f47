use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

const ENV_PREFIX: &str = "BGPSTAGE_";

// ── Top-level config ──────────────────────────────────────────

/// Parameters of one ingestion run.
///
/// Parsed from `bgpstage.toml`; `BGPSTAGE_*` environment variables override
/// the file, and CLI flags override both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inclusive start of the requested range (unix seconds).
    pub start: i64,
    /// Exclusive end of the requested range (unix seconds).
    pub end: i64,
    /// Number of time chunks per feed.
    pub chunks: u32,
    /// Feed (collector) identifiers.
    pub feeds: Vec<String>,
    /// Final on-disk database written at shutdown.
    pub database: PathBuf,
    /// Session name, used for the log file and snapshot names.
    pub session: String,
    /// Directory for periodic checkpoint snapshots.
    pub snapshot_dir: PathBuf,
    /// Directory holding `<feed>.jsonl` record files.
    pub source_dir: PathBuf,
    /// Snapshot to preload into the working store before ingesting.
    pub resume_from: Option<PathBuf>,
    pub tuning: TuningConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            chunks: 1,
            feeds: Vec::new(),
            database: PathBuf::from("cluster_1_DB.db"),
            session: "cluster_1".into(),
            snapshot_dir: PathBuf::from("snapshots"),
            source_dir: PathBuf::from("records"),
            resume_from: None,
            tuning: TuningConfig::default(),
        }
    }
}

// ── Tuning ────────────────────────────────────────────────────

/// Batch sizes and writer cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Raw facts buffered per worker before a group is pushed.
    pub batch_size: usize,
    /// Flush a partial batch after this long, if set.
    pub batch_max_wait_ms: Option<u64>,
    /// Fact groups the hand-off queue holds before producers block.
    pub queue_capacity: usize,
    /// Bounded wait for a single queue pop in the writer.
    pub poll_timeout_ms: u64,
    /// Writer iterations per transaction. Derived from `chunks` when unset.
    pub commit_every: Option<u64>,
    /// Writer iterations between compactions.
    pub compact_every: u64,
    /// Writer iterations between checkpoint snapshots. Disabled when unset.
    pub snapshot_every: Option<u64>,
    /// Niceness applied to worker threads (best-effort, Linux only).
    pub worker_niceness: Option<i32>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            batch_size: 1500,
            batch_max_wait_ms: None,
            queue_capacity: 1000,
            poll_timeout_ms: 10,
            commit_every: None,
            compact_every: 5000,
            snapshot_every: None,
            worker_niceness: Some(10),
        }
    }
}

// ── Loading & Validation ──────────────────────────────────────

impl PipelineConfig {
    /// Parse config from a TOML string (no env overrides).
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load config from a file path (no env overrides).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` if given (defaults otherwise), then apply environment
    /// overrides. Validation is left to the caller so CLI flags can still be
    /// layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(p) => {
                tracing::debug!(path = %p.display(), "loading pipeline config");
                Self::from_file(p)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok().filter(|v| !v.is_empty()));
        Ok(config)
    }

    /// Apply `BGPSTAGE_<KEY>` overrides using the given lookup.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

        if let Some(v) = parsed(&get, "START") {
            self.start = v;
        }
        if let Some(v) = parsed(&get, "END") {
            self.end = v;
        }
        if let Some(v) = parsed(&get, "CHUNKS") {
            self.chunks = v;
        }
        if let Some(v) = get("FEEDS") {
            self.feeds = split_list(&v);
        }
        if let Some(v) = get("DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = get("SESSION") {
            self.session = v;
        }
        if let Some(v) = get("SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = get("RESUME_FROM") {
            self.resume_from = Some(PathBuf::from(v));
        }

        let t = &mut self.tuning;
        if let Some(v) = parsed(&get, "BATCH_SIZE") {
            t.batch_size = v;
        }
        if let Some(v) = parsed(&get, "QUEUE_CAPACITY") {
            t.queue_capacity = v;
        }
        if let Some(v) = parsed(&get, "POLL_TIMEOUT_MS") {
            t.poll_timeout_ms = v;
        }
        if let Some(v) = parsed(&get, "COMMIT_EVERY") {
            t.commit_every = Some(v);
        }
        if let Some(v) = parsed(&get, "COMPACT_EVERY") {
            t.compact_every = v;
        }
        if let Some(v) = parsed(&get, "SNAPSHOT_EVERY") {
            t.snapshot_every = Some(v);
        }
        if let Some(v) = parsed(&get, "WORKER_NICENESS") {
            t.worker_niceness = Some(v);
        }
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: String| Err(CoreError::InvalidConfig(msg));

        if self.end <= self.start {
            return invalid(format!("end ({}) must be after start ({})", self.end, self.start));
        }
        if self.end.checked_sub(self.start).is_none() {
            return invalid(format!("range [{}, {}) is too wide", self.start, self.end));
        }
        if self.chunks == 0 {
            return invalid("chunks must be at least 1".into());
        }
        if self.feeds.is_empty() {
            return invalid("at least one feed is required".into());
        }
        if self.feeds.iter().any(|f| f.trim().is_empty()) {
            return invalid("feed identifiers must not be blank".into());
        }
        if self.tuning.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.tuning.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1".into());
        }
        if self.tuning.compact_every == 0 || self.tuning.commit_every == Some(0) {
            return invalid("writer cadences must be at least 1".into());
        }
        if self.tuning.snapshot_every == Some(0) {
            return invalid("snapshot_every must be at least 1 when set".into());
        }
        if self.tuning.compact_every < self.commit_every() {
            return invalid(format!(
                "compact_every ({}) must not be smaller than commit_every ({})",
                self.tuning.compact_every,
                self.commit_every()
            ));
        }
        Ok(())
    }

    /// Writer iterations per transaction.
    ///
    /// Unless configured, shrinks as the chunk count grows so a single
    /// transaction stays bounded: `clamp(1000 / chunks, 100, 1000)`.
    pub fn commit_every(&self) -> u64 {
        self.tuning
            .commit_every
            .unwrap_or_else(|| (1000 / u64::from(self.chunks.max(1))).clamp(100, 1000))
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Pipeline config (session: {}):", self.session);
        tracing::info!("  range:       [{}, {}) in {} chunk(s)", self.start, self.end, self.chunks);
        tracing::info!("  feeds:       {}", self.feeds.join(", "));
        tracing::info!("  database:    {}", self.database.display());
        tracing::info!("  snapshots:   {}", self.snapshot_dir.display());
        tracing::info!("  source dir:  {}", self.source_dir.display());
        tracing::info!(
            "  writer:      commit every {}, compact every {}, snapshot every {}",
            self.commit_every(),
            self.tuning.compact_every,
            self.tuning
                .snapshot_every
                .map(|n| n.to_string())
                .unwrap_or_else(|| "(off)".into())
        );
        tracing::info!(
            "  workers:     batch {}, queue {}, niceness {:?}",
            self.tuning.batch_size,
            self.tuning.queue_capacity,
            self.tuning.worker_niceness
        );
    }
}

fn parsed<T, G>(get: &G, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key = %format!("{ENV_PREFIX}{key}"), value = %raw, "ignoring unparseable override");
            None
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
