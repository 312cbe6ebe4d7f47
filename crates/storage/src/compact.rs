//! Compaction: fold raw fact rows into the aggregate tables.
//!
//! For every fact kind the new aggregate is computed as a fresh GROUP BY over
//! `old aggregate UNION ALL raw rows` into a staging table, which then
//! replaces the old aggregate; the raw table is recreated empty. Because the
//! result replaces rather than adds to the old aggregate, running compaction
//! again with no new raw rows reproduces the same aggregate.
//!
//! The swap for all three kinds happens in one transaction: on any failure
//! everything is rolled back and the raw rows stay in place for the next
//! attempt. Storage is reclaimed with `VACUUM` after the commit.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::schema::FactTable;
use crate::store::FactStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCompaction {
    pub table: &'static str,
    /// Raw rows folded in this run.
    pub raw_rows: i64,
    /// Aggregate rows after the merge.
    pub aggregate_rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompactionReport {
    pub tables: Vec<TableCompaction>,
    pub elapsed: Duration,
    pub vacuumed: bool,
}

impl CompactionReport {
    pub fn raw_rows(&self) -> i64 {
        self.tables.iter().map(|t| t.raw_rows).sum()
    }
}

/// The merge statement for one fact kind.
fn merge_sql(table: FactTable, staging: &str) -> String {
    let keys = table.key_columns().join(", ");
    format!(
        "INSERT INTO {staging} ({keys}, count, first_update, last_update) \
         SELECT {keys}, SUM(count), MIN(first_update), MAX(last_update) FROM ( \
             SELECT {keys}, count, first_update, last_update FROM {agg} \
             UNION ALL \
             SELECT {keys}, count, last_update AS first_update, last_update FROM {raw} \
         ) GROUP BY {keys} ORDER BY {keys}",
        agg = table.aggregate_name(),
        raw = table.raw_name(),
    )
}

impl FactStore {
    /// Fold all raw rows into the aggregates.
    ///
    /// Must be called with no transaction open; the caller commits pending
    /// inserts first.
    pub async fn compact(&mut self) -> Result<CompactionReport, StoreError> {
        self.ensure_no_transaction("compact")?;
        let started = Instant::now();
        info!("starting compaction");

        self.begin_immediate().await?;
        let tables = match self.merge_all().await {
            Ok(tables) => tables,
            Err(e) => {
                if let Err(rb) = self.rollback().await {
                    warn!(error = %rb, "rollback after failed compaction also failed");
                }
                return Err(e);
            }
        };
        self.commit().await?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "compaction merge committed");

        let vacuumed = match self.vacuum().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "vacuum after compaction failed");
                false
            }
        };

        let report = CompactionReport {
            tables,
            elapsed: started.elapsed(),
            vacuumed,
        };
        info!(
            raw_rows = report.raw_rows(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "compaction finished"
        );
        Ok(report)
    }

    async fn merge_all(&mut self) -> Result<Vec<TableCompaction>, StoreError> {
        let mut out = Vec::with_capacity(FactTable::ALL.len());
        for table in FactTable::ALL {
            out.push(self.merge_one(table).await?);
        }
        Ok(out)
    }

    async fn merge_one(&mut self, table: FactTable) -> Result<TableCompaction, StoreError> {
        let raw_rows = self.row_count(table.raw_name()).await?;
        let staging = format!("{}_next", table.aggregate_name());
        let conn = self.conn();

        sqlx::query(&format!("DROP TABLE IF EXISTS {staging}"))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&table.create_aggregate(&staging))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&merge_sql(table, &staging))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!("DROP TABLE {}", table.aggregate_name()))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!(
            "ALTER TABLE {staging} RENAME TO {}",
            table.aggregate_name()
        ))
        .execute(&mut *conn)
        .await?;
        sqlx::query(&format!("DROP TABLE {}", table.raw_name()))
            .execute(&mut *conn)
            .await?;
        sqlx::query(&table.create_raw()).execute(&mut *conn).await?;

        let aggregate_rows = self.row_count(table.aggregate_name()).await?;
        Ok(TableCompaction {
            table: table.raw_name(),
            raw_rows,
            aggregate_rows,
        })
    }

    /// Reclaim free pages. Not allowed inside a transaction.
    pub async fn vacuum(&mut self) -> Result<(), StoreError> {
        self.ensure_no_transaction("VACUUM")?;
        sqlx::query("VACUUM").execute(self.conn()).await?;
        Ok(())
    }
}
