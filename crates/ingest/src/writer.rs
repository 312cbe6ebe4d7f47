//! The single writer: owns the store, drains the queue, and drives the
//! commit / compaction / snapshot cadence.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use bgpstage_core::PipelineConfig;
use bgpstage_queue::{FactReceiver, Pop};
use bgpstage_store::{timestamped_path, CompactionReport, FactStore};

use crate::error::IngestError;

/// Tells the writer whether every producer has returned.
pub trait Completion: Send + Sync {
    fn all_finished(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct WriterSettings {
    /// Groups per transaction.
    pub commit_every: u64,
    /// Groups between compactions.
    pub compact_every: u64,
    /// Groups between checkpoint snapshots.
    pub snapshot_every: Option<u64>,
    pub poll_timeout: Duration,
    pub snapshot_dir: PathBuf,
    pub session: String,
}

impl WriterSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            commit_every: config.commit_every().max(1),
            compact_every: config.tuning.compact_every.max(1),
            snapshot_every: config.tuning.snapshot_every.filter(|&n| n > 0),
            poll_timeout: Duration::from_millis(config.tuning.poll_timeout_ms),
            snapshot_dir: config.snapshot_dir.clone(),
            session: config.session.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriterReport {
    /// Loop passes, including empty polls.
    pub iterations: u64,
    /// Fact groups inserted.
    pub groups: u64,
    /// Prefix-origin rows inserted, one per raw fact.
    pub items_processed: u64,
    pub commits: u64,
    pub compactions: u64,
    pub compaction_failures: u64,
    pub snapshots: u64,
    pub snapshot_failures: u64,
    pub last_compaction: Option<CompactionReport>,
}

pub struct WriterLoop {
    settings: WriterSettings,
}

impl WriterLoop {
    pub fn new(settings: WriterSettings) -> Self {
        Self { settings }
    }

    /// Run until every worker has finished and the queue is drained, then
    /// commit, compact one last time and hand the store back.
    ///
    /// Insert and commit failures abort the loop. Compaction and snapshot
    /// failures are logged and counted.
    pub async fn run(
        self,
        mut store: FactStore,
        receiver: &mut FactReceiver,
        workers: &dyn Completion,
    ) -> Result<(FactStore, WriterReport), IngestError> {
        let s = &self.settings;
        let mut report = WriterReport::default();
        info!(
            commit_every = s.commit_every,
            compact_every = s.compact_every,
            snapshot_every = ?s.snapshot_every,
            "writer started"
        );

        store.begin().await?;
        loop {
            report.iterations += 1;
            let group = match receiver.pop_timeout(s.poll_timeout).await {
                Pop::Group(group) => group,
                Pop::Timeout => {
                    // Finished is checked first: a finished worker has no push
                    // left in flight, so an empty queue afterwards is final.
                    if workers.all_finished() && receiver.is_empty() {
                        debug!("all workers finished and queue drained");
                        break;
                    }
                    continue;
                }
                Pop::Closed => {
                    debug!("queue closed and drained");
                    break;
                }
            };

            store.insert_group(&group).await?;
            report.groups += 1;
            report.items_processed += group.prefix_origins.len() as u64;
            let n = report.groups;

            if n % s.compact_every == 0 {
                self.commit(&mut store, &mut report).await?;
                self.compact(&mut store, &mut report).await;
                store.begin().await?;
            } else if n % s.commit_every == 0 {
                self.commit(&mut store, &mut report).await?;
                store.begin().await?;
            }

            if s.snapshot_every.is_some_and(|p| n % p == 0) {
                self.commit(&mut store, &mut report).await?;
                self.snapshot(&mut store, &mut report).await;
                store.begin().await?;
            }

            if n % 1_000 == 0 {
                info!(
                    groups = n,
                    items = report.items_processed,
                    queued = receiver.len(),
                    "writer progress"
                );
            }
        }

        self.commit(&mut store, &mut report).await?;
        self.compact(&mut store, &mut report).await;

        info!(
            groups = report.groups,
            items = report.items_processed,
            commits = report.commits,
            compactions = report.compactions,
            compaction_failures = report.compaction_failures,
            snapshots = report.snapshots,
            "writer finished"
        );
        Ok((store, report))
    }

    async fn commit(&self, store: &mut FactStore, report: &mut WriterReport) -> Result<(), IngestError> {
        if store.in_transaction() {
            store.commit().await?;
            report.commits += 1;
        }
        Ok(())
    }

    async fn compact(&self, store: &mut FactStore, report: &mut WriterReport) {
        match store.compact().await {
            Ok(done) => {
                report.compactions += 1;
                report.last_compaction = Some(done);
            }
            Err(e) => {
                report.compaction_failures += 1;
                error!(error = %e, groups = report.groups, "compaction failed, raw rows kept for next cycle");
            }
        }
    }

    async fn snapshot(&self, store: &mut FactStore, report: &mut WriterReport) {
        let path = timestamped_path(&self.settings.snapshot_dir, &self.settings.session, Utc::now());
        match store.write_snapshot(&path).await {
            Ok(_) => report.snapshots += 1,
            Err(e) => {
                report.snapshot_failures += 1;
                warn!(path = %path.display(), error = %e, "checkpoint snapshot failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bgpstage_core::{expand, normalize_prefix, FactGroup, RawFact};
    use bgpstage_queue::fact_channel;
    use bgpstage_store::FactTable;

    struct Flag(AtomicBool);

    impl Completion for Flag {
        fn all_finished(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn settings() -> WriterSettings {
        WriterSettings {
            commit_every: 2,
            compact_every: 4,
            snapshot_every: None,
            poll_timeout: Duration::from_millis(5),
            snapshot_dir: PathBuf::from("snapshots"),
            session: "test".into(),
        }
    }

    fn group(i: i64) -> FactGroup {
        let range = normalize_prefix("10.0.0.0/24").unwrap();
        expand(&[RawFact::announcement(vec![100, 200, 300], range, i)])
    }

    #[tokio::test]
    async fn drains_queue_and_follows_cadence() {
        let (tx, mut rx) = fact_channel(16);
        for i in 0..9 {
            tx.push(group(i)).await.unwrap();
        }
        drop(tx);

        let store = FactStore::open_in_memory().await.unwrap();
        let done = Flag(AtomicBool::new(true));
        let (mut store, report) = WriterLoop::new(settings())
            .run(store, &mut rx, &done)
            .await
            .unwrap();

        assert_eq!(report.groups, 9);
        assert_eq!(report.items_processed, 9);
        // commits at 2, 4 (with compaction), 6, 8 (with compaction), final
        assert_eq!(report.commits, 5);
        assert_eq!(report.compactions, 3);
        assert_eq!(report.compaction_failures, 0);

        let links = store.link_aggregates().await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.count == 9));
        assert_eq!(links[0].first_update, 0);
        assert_eq!(links[0].last_update, 8);
        assert_eq!(store.row_count("as_link").await.unwrap(), 0);
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn stops_on_timeout_once_workers_finished() {
        // sender stays alive, so only the completion check can end the loop
        let (tx, mut rx) = fact_channel(4);
        tx.push(group(1)).await.unwrap();

        let done = Flag(AtomicBool::new(true));
        let store = FactStore::open_in_memory().await.unwrap();
        let (mut store, report) = WriterLoop::new(settings())
            .run(store, &mut rx, &done)
            .await
            .unwrap();

        assert_eq!(report.groups, 1);
        assert!(report.iterations >= 2);
        let rows = store.prefix_aggregates(FactTable::PrefixAs).await.unwrap();
        assert_eq!(rows[0].count, 1);
        drop(tx);
    }

    #[tokio::test]
    async fn keeps_polling_while_workers_run() {
        let (tx, mut rx) = fact_channel(4);
        let done = std::sync::Arc::new(Flag(AtomicBool::new(false)));

        let producer = {
            let done = done.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                tx.push(group(5)).await.unwrap();
                done.0.store(true, Ordering::SeqCst);
            })
        };

        let store = FactStore::open_in_memory().await.unwrap();
        let (_, report) = WriterLoop::new(settings())
            .run(store, &mut rx, done.as_ref())
            .await
            .unwrap();
        producer.await.unwrap();
        assert_eq!(report.groups, 1);
    }

    #[tokio::test]
    async fn writes_periodic_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.snapshot_every = Some(3);
        settings.snapshot_dir = dir.path().to_path_buf();

        let (tx, mut rx) = fact_channel(16);
        for i in 0..6 {
            tx.push(group(i)).await.unwrap();
        }
        drop(tx);

        let store = FactStore::open_in_memory().await.unwrap();
        let done = Flag(AtomicBool::new(true));
        let (_, report) = WriterLoop::new(settings).run(store, &mut rx, &done).await.unwrap();

        assert_eq!(report.snapshots, 2);
        assert_eq!(report.snapshot_failures, 0);
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "db"))
            .collect();
        // both snapshots may land in the same second and share a name
        assert!(!files.is_empty());
    }

    #[tokio::test]
    async fn snapshot_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the snapshot directory should be
        let blocker = dir.path().join("snapshots");
        std::fs::write(&blocker, b"").unwrap();

        let mut settings = settings();
        settings.snapshot_every = Some(1);
        settings.snapshot_dir = blocker;

        let (tx, mut rx) = fact_channel(4);
        tx.push(group(1)).await.unwrap();
        drop(tx);

        let store = FactStore::open_in_memory().await.unwrap();
        let done = Flag(AtomicBool::new(true));
        let (mut store, report) = WriterLoop::new(settings).run(store, &mut rx, &done).await.unwrap();

        assert_eq!(report.snapshots, 0);
        assert_eq!(report.snapshot_failures, 1);
        assert_eq!(store.link_aggregates().await.unwrap().len(), 2);
    }
}
