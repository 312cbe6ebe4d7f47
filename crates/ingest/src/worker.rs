//! Fetch worker: pulls records for one assignment, transcodes them and hands
//! expanded fact groups to the writer.
//!
//! Workers run on blocking threads. Pushing onto a full queue blocks the
//! thread, which is how a slow writer throttles fetching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use bgpstage_core::{expand, transcode, ElementCounts, PipelineConfig, RawFact};
use bgpstage_queue::{FactBatcher, FactSender};

use crate::chunk::Assignment;
use crate::error::IngestError;
use crate::source::RecordSource;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Raw facts buffered before a group is expanded and pushed.
    pub batch_size: usize,
    pub max_wait: Option<Duration>,
    pub niceness: Option<i32>,
}

impl WorkerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.tuning.batch_size,
            max_wait: config.tuning.batch_max_wait_ms.map(Duration::from_millis),
            niceness: config.tuning.worker_niceness,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub records_fetched: u64,
    pub records_invalid: u64,
    /// Facts produced from announcements and withdrawals.
    pub elements_produced: u64,
    pub elements_none: u64,
    pub elements_skipped: u64,
    /// Lines the source could not decode. Every chunk reads the whole feed
    /// file, so one bad line is counted once per chunk of that feed.
    pub source_errors: u64,
    pub groups_pushed: u64,
    /// The shutdown flag stopped the worker before its source was exhausted.
    pub interrupted: bool,
}

impl WorkerSummary {
    fn add_counts(&mut self, counts: &ElementCounts) {
        self.elements_produced += counts.produced();
        self.elements_none += counts.none;
        self.elements_skipped += counts.skipped;
    }
}

pub struct FetchWorker {
    assignment: Assignment,
    settings: WorkerSettings,
    shutdown: Arc<AtomicBool>,
}

impl FetchWorker {
    pub fn new(assignment: Assignment, settings: WorkerSettings, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            assignment,
            settings,
            shutdown,
        }
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Drain `source` into the queue. Blocks; call from a blocking thread.
    pub fn run(
        self,
        mut source: Box<dyn RecordSource>,
        sender: &FactSender,
    ) -> Result<WorkerSummary, IngestError> {
        apply_priority_hint(self.settings.niceness);
        let a = &self.assignment;
        info!(feed = %a.feed, chunk = a.chunk, window = %a.window, "fetch worker started");

        let mut batcher = FactBatcher::new(self.settings.batch_size, self.settings.max_wait);
        let mut summary = WorkerSummary::default();

        while let Some(next) = source.next_record() {
            match next {
                Ok(record) => {
                    summary.records_fetched += 1;
                    if !record.is_valid() {
                        summary.records_invalid += 1;
                        debug!(feed = %a.feed, status = ?record.status, time = record.time, "skipping record");
                    } else {
                        let transcoded = transcode(&record);
                        summary.add_counts(&transcoded.counts);
                        batcher.push(transcoded.facts);
                        if let Some(facts) = batcher.try_flush() {
                            self.push(&facts, sender, &mut summary)?;
                        }
                    }
                }
                Err(e) => {
                    summary.source_errors += 1;
                    warn!(feed = %a.feed, chunk = a.chunk, error = %e, "record source error");
                }
            }

            if self.shutdown.load(Ordering::Relaxed) {
                summary.interrupted = true;
                info!(feed = %a.feed, chunk = a.chunk, "shutdown requested, flushing");
                break;
            }
        }

        if !batcher.is_empty() {
            let facts = batcher.flush();
            self.push(&facts, sender, &mut summary)?;
        }

        info!(
            feed = %a.feed,
            chunk = a.chunk,
            records = summary.records_fetched,
            facts = summary.elements_produced,
            skipped = summary.elements_skipped,
            source_errors = summary.source_errors,
            groups = summary.groups_pushed,
            "fetch worker finished"
        );
        Ok(summary)
    }

    fn push(
        &self,
        facts: &[RawFact],
        sender: &FactSender,
        summary: &mut WorkerSummary,
    ) -> Result<(), IngestError> {
        let group = expand(facts);
        debug!(
            feed = %self.assignment.feed,
            facts = facts.len(),
            rows = group.row_count(),
            depth = sender.depth(),
            "pushing fact group"
        );
        sender.push_blocking(group)?;
        summary.groups_pushed += 1;
        Ok(())
    }
}

/// Lower the calling thread's scheduling priority. Best-effort.
///
/// The niceness stays with the pooled thread after the worker returns.
#[cfg(target_os = "linux")]
pub fn apply_priority_hint(niceness: Option<i32>) {
    let Some(n) = niceness else { return };
    // On Linux PRIO_PROCESS with who = 0 addresses the calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, n) };
    if rc != 0 {
        debug!(niceness = n, error = %std::io::Error::last_os_error(), "could not set worker priority");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn apply_priority_hint(_niceness: Option<i32>) {}
