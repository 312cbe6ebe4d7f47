//! SQLite-backed fact store: raw and aggregate tables, compaction, and
//! durable snapshots.

pub mod compact;
pub mod error;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use compact::{CompactionReport, TableCompaction};
pub use error::StoreError;
pub use schema::{all_tables, FactTable};
pub use snapshot::{timestamped_path, RestoreReport, SnapshotInfo};
pub use store::{FactStore, LinkAggregate, PrefixAggregate, StoreStats};
