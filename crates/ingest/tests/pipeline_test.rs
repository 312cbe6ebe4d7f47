//! End-to-end runs: JSON-lines feeds on disk through workers, queue and
//! writer into an in-memory store.

use std::path::Path;
use std::sync::Arc;

use bgpstage_core::{PipelineConfig, TimeWindow};
use bgpstage_ingest::{
    JsonlSourceFactory, Pipeline, RecordSource, SourceError, SourceFactory, WorkerStatus,
};
use bgpstage_store::{FactStore, FactTable};

const START: i64 = 1_438_417_216;

fn announce(t: i64, prefix: &str, path: &str) -> String {
    format!(r#"{{"time":{t},"status":"valid","elements":[{{"type":"A","prefix":"{prefix}","as-path":"{path}","time":{t}}}]}}"#)
}

fn withdraw(t: i64, prefix: &str) -> String {
    format!(r#"{{"time":{t},"status":"valid","elements":[{{"type":"W","prefix":"{prefix}","time":{t}}}]}}"#)
}

fn write_feed(dir: &Path, feed: &str, lines: &[String]) {
    std::fs::write(dir.join(format!("{feed}.jsonl")), lines.join("\n")).unwrap();
}

fn config(dir: &Path, feeds: &[&str], chunks: u32) -> PipelineConfig {
    let mut config = PipelineConfig {
        start: START,
        end: START + 3_600,
        chunks,
        feeds: feeds.iter().map(|f| f.to_string()).collect(),
        source_dir: dir.to_path_buf(),
        snapshot_dir: dir.join("snapshots"),
        ..PipelineConfig::default()
    };
    config.tuning.batch_size = 2;
    config.tuning.queue_capacity = 4;
    config.tuning.poll_timeout_ms = 5;
    config.tuning.commit_every = Some(2);
    config.tuning.compact_every = 4;
    config.tuning.worker_niceness = None;
    config
}

async fn run(config: PipelineConfig) -> (FactStore, bgpstage_ingest::PipelineReport) {
    let factory = Arc::new(JsonlSourceFactory::new(config.source_dir.clone()));
    let store = FactStore::open_in_memory().await.unwrap();
    Pipeline::new(config, factory).run(store).await.unwrap()
}

fn scenario() -> Vec<String> {
    vec![
        announce(START + 10, "10.0.0.0/24", "100 200 300"),
        announce(START + 20, "10.0.0.0/24", "100 200 300"),
        announce(START + 30, "10.0.0.0/24", "400 200 300"),
        withdraw(START + 40, "10.0.0.0/24"),
    ]
}

#[tokio::test]
async fn announcement_and_withdrawal_scenario() {
    let dir = tempfile::tempdir().unwrap();
    write_feed(dir.path(), "rrc11", &scenario());

    let (mut store, report) = run(config(dir.path(), &["rrc11"], 1)).await;
    assert!(report.is_complete());
    assert_eq!(report.writer.items_processed, 4);

    let links = store.link_aggregates().await.unwrap();
    let count = |from: i64, to: i64| {
        links
            .iter()
            .find(|l| l.as_o == from && l.as_n == to)
            .map(|l| l.count)
    };
    assert_eq!(links.len(), 3);
    assert_eq!(count(100, 200), Some(2));
    assert_eq!(count(200, 300), Some(3));
    assert_eq!(count(400, 200), Some(1));

    let origins = store.prefix_aggregates(FactTable::PrefixAs).await.unwrap();
    assert_eq!(origins.len(), 2);
    let by_origin = |o: i64| origins.iter().find(|r| r.as_o == o).unwrap();
    assert_eq!(by_origin(300).count, 3);
    assert_eq!(by_origin(300).ip_min, "010.000.000.000");
    assert_eq!(by_origin(300).ip_max, "010.000.000.255");
    assert_eq!(by_origin(-1).count, 1);
    assert_eq!(by_origin(-1).last_update, START + 40);

    let members = store.prefix_aggregates(FactTable::AsPrefix).await.unwrap();
    let member_count = |m: i64| members.iter().find(|r| r.as_o == m).map(|r| r.count);
    assert_eq!(member_count(200), Some(3));
    assert_eq!(member_count(100), Some(2));
    assert_eq!(member_count(400), Some(1));
}

#[tokio::test]
async fn chunking_and_feed_split_do_not_change_aggregates() {
    let lines: Vec<String> = (0..60)
        .map(|i| {
            let path = match i % 3 {
                0 => "100 200 300",
                1 => "400 200 300",
                _ => "64500 64501",
            };
            announce(START + i * 60, &format!("10.{}.0.0/16", i % 4), path)
        })
        .collect();

    let one = tempfile::tempdir().unwrap();
    write_feed(one.path(), "all", &lines);
    let (mut single, _) = run(config(one.path(), &["all"], 1)).await;

    let split = tempfile::tempdir().unwrap();
    let (even, odd): (Vec<_>, Vec<_>) = lines.iter().cloned().enumerate().partition(|(i, _)| i % 2 == 0);
    write_feed(split.path(), "even", &even.into_iter().map(|(_, l)| l).collect::<Vec<_>>());
    write_feed(split.path(), "odd", &odd.into_iter().map(|(_, l)| l).collect::<Vec<_>>());
    let (mut chunked, report) = run(config(split.path(), &["even", "odd"], 6)).await;

    assert!(report.is_complete());
    assert_eq!(report.workers.len(), 12);
    assert_eq!(single.link_aggregates().await.unwrap(), chunked.link_aggregates().await.unwrap());
    for table in [FactTable::PrefixAs, FactTable::AsPrefix] {
        assert_eq!(
            single.prefix_aggregates(table).await.unwrap(),
            chunked.prefix_aggregates(table).await.unwrap()
        );
    }
}

#[tokio::test]
async fn records_outside_the_range_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = scenario();
    lines.push(announce(START - 1, "192.0.2.0/24", "1 2"));
    lines.push(announce(START + 3_600, "192.0.2.0/24", "1 2"));
    lines.push("{ broken".to_string());
    write_feed(dir.path(), "rrc11", &lines);

    let (mut store, report) = run(config(dir.path(), &["rrc11"], 2)).await;
    assert!(report.is_complete());
    assert_eq!(report.writer.items_processed, 4);
    assert!(store.link_aggregates().await.unwrap().iter().all(|l| l.as_o != 1));

    // the broken line is seen by both chunks' sources
    let errors: u64 = report
        .workers
        .iter()
        .map(|w| match &w.status {
            WorkerStatus::Completed(s) => s.source_errors,
            _ => 0,
        })
        .sum();
    assert_eq!(errors, 2);
}

#[tokio::test]
async fn resumed_run_adds_to_restored_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    write_feed(dir.path(), "rrc11", &scenario());
    let (mut first, _) = run(config(dir.path(), &["rrc11"], 1)).await;
    let saved = dir.path().join("cluster_1_DB.db");
    first.write_snapshot(&saved).await.unwrap();

    let mut resumed = FactStore::open_in_memory().await.unwrap();
    resumed.restore(&saved).await.unwrap();
    let factory = Arc::new(JsonlSourceFactory::new(dir.path()));
    let (mut store, _) = Pipeline::new(config(dir.path(), &["rrc11"], 1), factory)
        .run(resumed)
        .await
        .unwrap();

    let links = store.link_aggregates().await.unwrap();
    let link = links.iter().find(|l| l.as_o == 200 && l.as_n == 300).unwrap();
    assert_eq!(link.count, 6);
}

struct PanickingFactory;

impl SourceFactory for PanickingFactory {
    fn open(&self, feed: &str, _window: TimeWindow) -> Result<Box<dyn RecordSource>, SourceError> {
        panic!("collector {feed} exploded");
    }
}

#[tokio::test]
async fn crashed_worker_is_listed_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let store = FactStore::open_in_memory().await.unwrap();
    let (_, report) = Pipeline::new(config(dir.path(), &["rrc00"], 3), Arc::new(PanickingFactory))
        .run(store)
        .await
        .unwrap();

    assert_eq!(report.missing.len(), 3);
    assert!(report
        .workers
        .iter()
        .all(|w| matches!(w.status, WorkerStatus::Failed(_))));
    assert_eq!(report.writer.groups, 0);
}
