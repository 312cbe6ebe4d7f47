mod cli;
mod logging;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use bgpstage_core::config::load_dotenv;
use bgpstage_core::PipelineConfig;
use bgpstage_ingest::{JsonlSourceFactory, Pipeline, PipelineReport};
use bgpstage_store::{FactStore, SnapshotInfo, StoreStats};

use crate::cli::CliArgs;

#[derive(Serialize)]
struct RunSummary<'a> {
    session: &'a str,
    database: SnapshotInfo,
    tables: StoreStats,
    pipeline: &'a PipelineReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = CliArgs::parse();

    let mut config =
        PipelineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let log_path = logging::init(&args.log_dir, &config.session)?;
    info!(path = %log_path.display(), "session log");
    config.log_summary();

    let mut store = FactStore::open_in_memory()
        .await
        .context("failed to open working store")?;
    if let Some(path) = &config.resume_from {
        let restored = store
            .restore(path)
            .await
            .with_context(|| format!("failed to resume from {}", path.display()))?;
        info!(path = %path.display(), rows = restored.total_rows(), "resumed from snapshot");
    }

    let session = config.session.clone();
    let database = config.database.clone();
    let sources = Arc::new(JsonlSourceFactory::new(config.source_dir.clone()));
    let pipeline = Pipeline::new(config, sources);

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight records");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    let (mut store, report) = pipeline.run(store).await.context("pipeline failed")?;

    let saved = store
        .write_snapshot(&database)
        .await
        .with_context(|| format!("failed to save {}", database.display()))?;
    let tables = store.stats().await?;
    store.close().await?;

    let summary = RunSummary {
        session: &session,
        database: saved,
        tables,
        pipeline: &report,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !report.is_complete() {
        bail!(
            "{} of {} assignment(s) did not complete",
            report.missing.len(),
            report.workers.len()
        );
    }
    Ok(())
}
