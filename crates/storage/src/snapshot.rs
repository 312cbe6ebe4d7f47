//! Durable snapshots of the in-memory store, and restoring from them.
//!
//! A snapshot is a complete SQLite database file written with
//! `VACUUM INTO` to a temporary name and renamed into place, so a crash
//! mid-write never leaves a truncated file under the final name.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::schema::{all_tables, FactTable};
use crate::store::FactStore;

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    /// Rows copied per table.
    pub tables: Vec<(String, u64)>,
}

impl RestoreReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// `<dir>/<session>_<YYYYmmddTHHMMSSZ>.db`
pub fn timestamped_path(dir: &Path, session: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}_{}.db", session, at.format("%Y%m%dT%H%M%SZ")))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl FactStore {
    /// Write the whole store to `path`, replacing any existing file.
    pub async fn write_snapshot(&mut self, path: &Path) -> Result<SnapshotInfo, StoreError> {
        self.ensure_no_transaction("snapshot")?;
        let started = Instant::now();
        info!(path = %path.display(), "writing snapshot");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path(path);
        if tokio::fs::try_exists(&tmp).await? {
            tokio::fs::remove_file(&tmp).await?;
        }

        let target = tmp.to_string_lossy().into_owned();
        if let Err(e) = sqlx::query("VACUUM INTO ?").bind(target.as_str()).execute(self.conn()).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, path).await?;

        let bytes = tokio::fs::metadata(path).await?.len();
        let info = SnapshotInfo {
            path: path.to_path_buf(),
            bytes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(path = %path.display(), bytes, elapsed_ms = info.elapsed_ms, "snapshot written");
        Ok(info)
    }

    /// Copy every known table from an on-disk snapshot into this store.
    ///
    /// Rows are appended; tables missing from the snapshot are skipped.
    pub async fn restore(&mut self, path: &Path) -> Result<RestoreReport, StoreError> {
        self.ensure_no_transaction("restore")?;
        if !tokio::fs::try_exists(path).await? {
            return Err(StoreError::SnapshotMissing(path.to_path_buf()));
        }
        info!(path = %path.display(), "restoring snapshot into working store");

        let source = path.to_string_lossy().into_owned();
        sqlx::query("ATTACH DATABASE ? AS snapshot")
            .bind(source.as_str())
            .execute(self.conn())
            .await?;

        let copied = self.copy_from_attached().await;
        if let Err(e) = sqlx::query("DETACH DATABASE snapshot").execute(self.conn()).await {
            warn!(error = %e, "failed to detach snapshot");
        }
        let report = copied?;
        info!(rows = report.total_rows(), "snapshot restored");
        Ok(report)
    }

    async fn copy_from_attached(&mut self) -> Result<RestoreReport, StoreError> {
        let mut report = RestoreReport::default();
        self.begin().await?;
        for table in all_tables() {
            let exists = match self.table_exists("snapshot", table).await {
                Ok(exists) => exists,
                Err(e) => {
                    self.rollback().await.ok();
                    return Err(e);
                }
            };
            if !exists {
                warn!(table, "table missing from snapshot, skipping");
                continue;
            }
            let Some(columns) = FactTable::columns_of(table) else {
                continue;
            };
            let cols = columns.join(", ");
            let sql = format!("INSERT INTO main.{table} ({cols}) SELECT {cols} FROM snapshot.{table}");
            match sqlx::query(&sql).execute(self.conn()).await {
                Ok(done) => report.tables.push((table.to_string(), done.rows_affected())),
                Err(e) => {
                    self.rollback().await.ok();
                    return Err(e.into());
                }
            }
        }
        self.commit().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn snapshot_names_sort_by_time() {
        let dir = Path::new("snapshots");
        let a = timestamped_path(dir, "cluster_1", Utc.with_ymd_and_hms(2015, 8, 1, 8, 20, 16).unwrap());
        let b = timestamped_path(dir, "cluster_1", Utc.with_ymd_and_hms(2015, 8, 1, 10, 0, 0).unwrap());
        assert_eq!(a, PathBuf::from("snapshots/cluster_1_20150801T082016Z.db"));
        assert!(a < b);
    }

    #[test]
    fn temp_path_keeps_directory() {
        assert_eq!(
            temp_path(Path::new("out/final.db")),
            PathBuf::from("out/final.db.tmp")
        );
    }
}
