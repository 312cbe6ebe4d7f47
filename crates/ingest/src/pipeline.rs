//! Pipeline driver: spawns one blocking fetch worker per assignment, runs
//! the writer on the current task, and reports which assignments completed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use bgpstage_core::{PipelineConfig, TimeWindow};
use bgpstage_queue::{fact_channel, FactSender, QueueStatsSnapshot};
use bgpstage_store::FactStore;

use crate::chunk::{assignments, Assignment};
use crate::error::IngestError;
use crate::source::SourceFactory;
use crate::worker::{FetchWorker, WorkerSettings, WorkerSummary};
use crate::writer::{Completion, WriterLoop, WriterReport, WriterSettings};

// ── Outcomes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum WorkerStatus {
    Completed(WorkerSummary),
    /// Stopped by the shutdown flag; the chunk was only partly ingested.
    Interrupted(WorkerSummary),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    pub assignment: Assignment,
    pub status: WorkerStatus,
}

impl WorkerOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, WorkerStatus::Completed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub workers: Vec<WorkerOutcome>,
    pub writer: WriterReport,
    /// Assignments that did not run to completion.
    pub missing: Vec<Assignment>,
    pub queue: QueueStatsSnapshot,
    pub elapsed_ms: u64,
}

impl PipelineReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

// ── Worker set ───────────────────────────────────────────────────────

type WorkerHandle = JoinHandle<Result<WorkerSummary, IngestError>>;

/// Handles of the running fetch workers.
pub struct WorkerSet {
    handles: Vec<(Assignment, WorkerHandle)>,
}

impl WorkerSet {
    /// Spawn one blocking worker per assignment, each opening its own source.
    pub fn spawn(
        assignments: Vec<Assignment>,
        settings: &WorkerSettings,
        sources: &Arc<dyn SourceFactory>,
        sender: &FactSender,
        shutdown: &Arc<AtomicBool>,
    ) -> Self {
        let handles = assignments
            .into_iter()
            .map(|assignment| {
                let worker = FetchWorker::new(assignment.clone(), settings.clone(), shutdown.clone());
                let sources = sources.clone();
                let sender = sender.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    let a = worker.assignment();
                    let source = sources.open(&a.feed, a.window)?;
                    worker.run(source, &sender)
                });
                (assignment, handle)
            })
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker and classify how it ended.
    pub async fn join(self) -> Vec<WorkerOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for (assignment, handle) in self.handles {
            let status = match handle.await {
                Ok(Ok(summary)) if summary.interrupted => WorkerStatus::Interrupted(summary),
                Ok(Ok(summary)) => WorkerStatus::Completed(summary),
                Ok(Err(e)) => {
                    error!(assignment = %assignment, error = %e, "fetch worker failed");
                    WorkerStatus::Failed(e.to_string())
                }
                Err(e) => {
                    let e = IngestError::Join(e.to_string());
                    error!(assignment = %assignment, error = %e, "fetch worker crashed");
                    WorkerStatus::Failed(e.to_string())
                }
            };
            outcomes.push(WorkerOutcome { assignment, status });
        }
        outcomes
    }
}

impl Completion for WorkerSet {
    fn all_finished(&self) -> bool {
        self.handles.iter().all(|(_, h)| h.is_finished())
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────

pub struct Pipeline {
    config: PipelineConfig,
    sources: Arc<dyn SourceFactory>,
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sources: Arc<dyn SourceFactory>) -> Self {
        Self {
            config,
            sources,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that asks every worker to stop after its current record.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        assignments(
            &self.config.feeds,
            TimeWindow::new(self.config.start, self.config.end),
            self.config.chunks,
        )
    }

    /// Ingest every assignment into `store` and hand it back.
    ///
    /// Worker failures do not fail the run; they show up in
    /// [`PipelineReport::missing`]. A writer failure does, after the workers
    /// have been stopped and joined.
    pub async fn run(self, store: FactStore) -> Result<(FactStore, PipelineReport), IngestError> {
        self.config.validate()?;
        let started = Instant::now();
        let assignments = self.assignments();
        info!(
            assignments = assignments.len(),
            feeds = self.config.feeds.len(),
            chunks = self.config.chunks,
            "starting pipeline"
        );

        let (sender, mut receiver) = fact_channel(self.config.tuning.queue_capacity);
        let workers = WorkerSet::spawn(
            assignments,
            &WorkerSettings::from_config(&self.config),
            &self.sources,
            &sender,
            &self.shutdown,
        );
        // Only workers hold senders from here on, so the queue closes when
        // the last of them returns.
        drop(sender);

        let writer = WriterLoop::new(WriterSettings::from_config(&self.config));
        let written = writer.run(store, &mut receiver, &workers).await;

        if let Err(e) = &written {
            error!(error = %e, "writer failed, stopping workers");
            self.shutdown.store(true, Ordering::Relaxed);
            receiver.close();
        }
        let queue = receiver.stats();
        drop(receiver);

        let outcomes = workers.join().await;
        let (store, writer_report) = written?;

        let missing: Vec<Assignment> = outcomes
            .iter()
            .filter(|o| !o.is_complete())
            .map(|o| o.assignment.clone())
            .collect();
        for a in &missing {
            warn!(assignment = %a, "assignment not completed");
        }

        let report = PipelineReport {
            workers: outcomes,
            writer: writer_report,
            missing,
            queue,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            completed = report.workers.len() - report.missing.len(),
            missing = report.missing.len(),
            items = report.writer.items_processed,
            elapsed_ms = report.elapsed_ms,
            "pipeline finished"
        );
        Ok((store, report))
    }
}
