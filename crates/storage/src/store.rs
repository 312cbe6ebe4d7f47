//! The working fact store: one owned SQLite connection.
//!
//! The store is a plain value handed to the writer and returned by it; there
//! is no shared or global handle. Transactions are explicit (`begin` /
//! `commit`) because the writer keeps one open across many queue pops.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, QueryBuilder, Sqlite};
use tracing::debug;

use bgpstage_core::FactGroup;

use crate::error::StoreError;
use crate::schema::{all_tables, FactTable};

/// SQLite's bound-parameter ceiling per statement.
const MAX_BIND_PARAMS: usize = 32_766;

fn rows_per_insert(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns).max(1)
}

// ── Row types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LinkAggregate {
    pub as_o: i64,
    pub as_n: i64,
    pub count: i64,
    pub first_update: i64,
    pub last_update: i64,
}

/// Row of `prefix_as_aggregate` or `as_prefix_aggregate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PrefixAggregate {
    pub ip_min: String,
    pub ip_max: String,
    pub as_o: i64,
    pub count: i64,
    pub first_update: i64,
    pub last_update: i64,
}

/// Row counts of every table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub tables: BTreeMap<String, i64>,
}

impl StoreStats {
    pub fn rows(&self, table: &str) -> i64 {
        self.tables.get(table).copied().unwrap_or(0)
    }
}

// ── Store ────────────────────────────────────────────────────────────

pub struct FactStore {
    conn: SqliteConnection,
    in_tx: bool,
}

impl FactStore {
    /// Open a fresh in-memory store with all tables created.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(SqliteJournalMode::Memory)
            .synchronous(SqliteSynchronous::Off)
            .pragma("cache_size", "10000")
            .disable_statement_logging();
        Self::connect(options).await
    }

    /// Open (or create) an on-disk store, e.g. to inspect a snapshot.
    pub async fn open_file(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .disable_statement_logging();
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let conn = options.connect().await?;
        let mut store = Self { conn, in_tx: false };
        store.prepare_schema().await?;
        Ok(store)
    }

    async fn prepare_schema(&mut self) -> Result<(), StoreError> {
        for table in FactTable::ALL {
            sqlx::query(&table.create_raw()).execute(&mut self.conn).await?;
            sqlx::query(&table.create_aggregate(table.aggregate_name()))
                .execute(&mut self.conn)
                .await?;
        }
        Ok(())
    }

    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }

    // ── Transactions ─────────────────────────────────────────────────

    pub fn in_transaction(&self) -> bool {
        self.in_tx
    }

    /// Open a transaction. No-op if one is already open.
    pub async fn begin(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            sqlx::query("BEGIN").execute(&mut self.conn).await?;
            self.in_tx = true;
        }
        Ok(())
    }

    /// Commit the open transaction. No-op if none is open.
    pub async fn commit(&mut self) -> Result<(), StoreError> {
        if self.in_tx {
            sqlx::query("COMMIT").execute(&mut self.conn).await?;
            self.in_tx = false;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), StoreError> {
        if self.in_tx {
            // SQLite may already have rolled back on its own after an error.
            self.in_tx = false;
            sqlx::query("ROLLBACK").execute(&mut self.conn).await?;
        }
        Ok(())
    }

    /// Begin with a write lock taken up front (used by compaction).
    pub(crate) async fn begin_immediate(&mut self) -> Result<(), StoreError> {
        if self.in_tx {
            return Err(StoreError::TransactionOpen("BEGIN IMMEDIATE"));
        }
        sqlx::query("BEGIN IMMEDIATE").execute(&mut self.conn).await?;
        self.in_tx = true;
        Ok(())
    }

    pub(crate) fn ensure_no_transaction(&self, op: &'static str) -> Result<(), StoreError> {
        if self.in_tx {
            Err(StoreError::TransactionOpen(op))
        } else {
            Ok(())
        }
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Append a fact group to the raw tables, one multi-row INSERT per table
    /// (split only when a list exceeds SQLite's parameter limit).
    pub async fn insert_group(&mut self, group: &FactGroup) -> Result<(), StoreError> {
        for chunk in group.prefix_origins.chunks(rows_per_insert(5)) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO prefix_as (ip_min, ip_max, as_o, count, last_update) ",
            );
            qb.push_values(chunk, |mut row, f| {
                row.push_bind(f.range.min.as_str())
                    .push_bind(f.range.max.as_str())
                    .push_bind(f.origin)
                    .push_bind(f.count)
                    .push_bind(f.last_update);
            });
            qb.build().execute(&mut self.conn).await?;
        }

        for chunk in group.links.chunks(rows_per_insert(4)) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO as_link (as_o, as_n, count, last_update) ");
            qb.push_values(chunk, |mut row, l| {
                row.push_bind(l.from)
                    .push_bind(l.to)
                    .push_bind(l.count)
                    .push_bind(l.last_update);
            });
            qb.build().execute(&mut self.conn).await?;
        }

        for chunk in group.prefix_paths.chunks(rows_per_insert(5)) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO as_prefix (ip_min, ip_max, as_o, count, last_update) ",
            );
            qb.push_values(chunk, |mut row, p| {
                row.push_bind(p.range.min.as_str())
                    .push_bind(p.range.max.as_str())
                    .push_bind(p.member)
                    .push_bind(p.count)
                    .push_bind(p.last_update);
            });
            qb.build().execute(&mut self.conn).await?;
        }

        debug!(
            prefix_as = group.prefix_origins.len(),
            as_link = group.links.len(),
            as_prefix = group.prefix_paths.len(),
            "inserted fact group"
        );
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Row count of one of the store's tables.
    pub async fn row_count(&mut self, table: &str) -> Result<i64, StoreError> {
        if FactTable::columns_of(table).is_none() {
            return Err(StoreError::Other(format!("unknown table: {table}")));
        }
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut self.conn)
            .await?;
        Ok(n)
    }

    pub async fn stats(&mut self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        for table in all_tables() {
            let n = self.row_count(table).await?;
            stats.tables.insert(table.to_string(), n);
        }
        Ok(stats)
    }

    /// All `as_link_aggregate` rows ordered by key.
    pub async fn link_aggregates(&mut self) -> Result<Vec<LinkAggregate>, StoreError> {
        let rows = sqlx::query_as::<_, LinkAggregate>(
            "SELECT as_o, as_n, count, first_update, last_update \
             FROM as_link_aggregate ORDER BY as_o, as_n",
        )
        .fetch_all(&mut self.conn)
        .await?;
        Ok(rows)
    }

    /// All rows of a prefix-keyed aggregate ordered by key.
    pub async fn prefix_aggregates(
        &mut self,
        table: FactTable,
    ) -> Result<Vec<PrefixAggregate>, StoreError> {
        if table == FactTable::AsLink {
            return Err(StoreError::Other("as_link is not prefix-keyed".into()));
        }
        let sql = format!(
            "SELECT ip_min, ip_max, as_o, count, first_update, last_update \
             FROM {} ORDER BY ip_min, ip_max, as_o",
            table.aggregate_name()
        );
        let rows = sqlx::query_as::<_, PrefixAggregate>(&sql)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows)
    }

    /// Whether `name` exists in the given schema (`main` or an attached one).
    pub(crate) async fn table_exists(&mut self, schema: &str, name: &str) -> Result<bool, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {schema}.sqlite_master WHERE type = 'table' AND name = ?");
        let (n,): (i64,) = sqlx::query_as(&sql).bind(name).fetch_one(&mut self.conn).await?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgpstage_core::{expand, normalize_prefix, RawFact};

    fn sample_group() -> FactGroup {
        let range = normalize_prefix("10.0.0.0/24").unwrap();
        expand(&[
            RawFact::announcement(vec![100, 200, 300], range.clone(), 10),
            RawFact::withdrawal(range, 11),
        ])
    }

    #[tokio::test]
    async fn fresh_store_has_empty_tables() {
        let mut store = FactStore::open_in_memory().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.tables.len(), 6);
        assert!(stats.tables.values().all(|&n| n == 0));
    }

    #[tokio::test]
    async fn insert_group_fills_raw_tables() {
        let mut store = FactStore::open_in_memory().await.unwrap();
        store.begin().await.unwrap();
        store.insert_group(&sample_group()).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(store.row_count("prefix_as").await.unwrap(), 2);
        assert_eq!(store.row_count("as_link").await.unwrap(), 2);
        assert_eq!(store.row_count("as_prefix").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rollback_discards_inserts() {
        let mut store = FactStore::open_in_memory().await.unwrap();
        store.begin().await.unwrap();
        store.insert_group(&sample_group()).await.unwrap();
        store.rollback().await.unwrap();
        assert!(!store.in_transaction());
        assert_eq!(store.row_count("prefix_as").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn begin_and_commit_are_idempotent() {
        let mut store = FactStore::open_in_memory().await.unwrap();
        store.commit().await.unwrap();
        store.begin().await.unwrap();
        store.begin().await.unwrap();
        assert!(store.in_transaction());
        store.commit().await.unwrap();
        store.commit().await.unwrap();
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn large_group_is_split_under_parameter_limit() {
        let range = normalize_prefix("192.0.2.0/24").unwrap();
        let facts: Vec<RawFact> = (0..8_000)
            .map(|i| RawFact::announcement(vec![i, i + 1], range.clone(), i))
            .collect();
        let mut store = FactStore::open_in_memory().await.unwrap();
        store.insert_group(&expand(&facts)).await.unwrap();
        assert_eq!(store.row_count("prefix_as").await.unwrap(), 8_000);
        assert_eq!(store.row_count("as_prefix").await.unwrap(), 16_000);
    }

    #[tokio::test]
    async fn unknown_table_is_rejected() {
        let mut store = FactStore::open_in_memory().await.unwrap();
        assert!(store.row_count("sqlite_master; DROP TABLE as_link").await.is_err());
    }
}
