//! Table layout.
//!
//! Each fact kind has a raw table that the writer appends to and an
//! aggregate table that compaction folds the raw rows into.

/// The three fact kinds persisted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactTable {
    /// Prefix announced by an origin AS.
    PrefixAs,
    /// Adjacent AS pair.
    AsLink,
    /// Prefix seen with an AS anywhere on its path.
    AsPrefix,
}

impl FactTable {
    pub const ALL: [FactTable; 3] = [FactTable::PrefixAs, FactTable::AsLink, FactTable::AsPrefix];

    pub fn raw_name(self) -> &'static str {
        match self {
            Self::PrefixAs => "prefix_as",
            Self::AsLink => "as_link",
            Self::AsPrefix => "as_prefix",
        }
    }

    pub fn aggregate_name(self) -> &'static str {
        match self {
            Self::PrefixAs => "prefix_as_aggregate",
            Self::AsLink => "as_link_aggregate",
            Self::AsPrefix => "as_prefix_aggregate",
        }
    }

    /// Grouping key, in column order.
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::PrefixAs | Self::AsPrefix => &["ip_min", "ip_max", "as_o"],
            Self::AsLink => &["as_o", "as_n"],
        }
    }

    fn key_ddl(self) -> &'static str {
        match self {
            Self::PrefixAs | Self::AsPrefix => "ip_min TEXT, ip_max TEXT, as_o INTEGER",
            Self::AsLink => "as_o INTEGER, as_n INTEGER",
        }
    }

    pub fn raw_columns(self) -> Vec<&'static str> {
        let mut cols = self.key_columns().to_vec();
        cols.extend(["count", "last_update"]);
        cols
    }

    pub fn aggregate_columns(self) -> Vec<&'static str> {
        let mut cols = self.key_columns().to_vec();
        cols.extend(["count", "first_update", "last_update"]);
        cols
    }

    pub fn create_raw(self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, count INTEGER, last_update INTEGER)",
            self.raw_name(),
            self.key_ddl()
        )
    }

    /// DDL for an aggregate-shaped table under `name` (the aggregate itself or
    /// its staging copy during compaction).
    pub fn create_aggregate(self, name: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, count INTEGER, first_update INTEGER, last_update INTEGER)",
            name,
            self.key_ddl()
        )
    }

    /// Columns of the named table, if it belongs to this schema.
    pub fn columns_of(name: &str) -> Option<Vec<&'static str>> {
        Self::ALL.iter().find_map(|t| {
            if t.raw_name() == name {
                Some(t.raw_columns())
            } else if t.aggregate_name() == name {
                Some(t.aggregate_columns())
            } else {
                None
            }
        })
    }
}

/// Every table the store owns, raw tables first.
pub fn all_tables() -> impl Iterator<Item = &'static str> {
    FactTable::ALL
        .iter()
        .map(|t| t.raw_name())
        .chain(FactTable::ALL.iter().map(|t| t.aggregate_name()))
}
