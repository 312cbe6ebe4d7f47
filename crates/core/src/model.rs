//! Facts flowing from fetch workers to the store.

use serde::{Deserialize, Serialize};

use crate::address::AddressRange;

/// Origin recorded for withdrawals, which carry no path.
pub const WITHDRAWAL_ORIGIN: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Announcement,
    Withdrawal,
}

/// One normalized observation derived from a single record element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFact {
    pub kind: FactKind,
    pub origin: i64,
    /// Hops in source order, origin last. Empty for withdrawals.
    pub path: Vec<i64>,
    pub range: AddressRange,
    pub timestamp: i64,
}

impl RawFact {
    pub fn announcement(path: Vec<i64>, range: AddressRange, timestamp: i64) -> Self {
        let origin = path.last().copied().unwrap_or(WITHDRAWAL_ORIGIN);
        Self {
            kind: FactKind::Announcement,
            origin,
            path,
            range,
            timestamp,
        }
    }

    pub fn withdrawal(range: AddressRange, timestamp: i64) -> Self {
        Self {
            kind: FactKind::Withdrawal,
            origin: WITHDRAWAL_ORIGIN,
            path: Vec::new(),
            range,
            timestamp,
        }
    }
}

/// Adjacent AS pair seen in a path (`as_link`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFact {
    pub from: i64,
    pub to: i64,
    pub count: i64,
    pub last_update: i64,
}

/// Prefix announced (or withdrawn) with a given origin (`prefix_as`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixOriginFact {
    pub range: AddressRange,
    pub origin: i64,
    pub count: i64,
    pub last_update: i64,
}

/// Prefix seen with a given AS anywhere on its path (`as_prefix`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixPathFact {
    pub range: AddressRange,
    pub member: i64,
    pub count: i64,
    pub last_update: i64,
}

/// Unit of hand-off between a fetch worker and the writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactGroup {
    pub prefix_origins: Vec<PrefixOriginFact>,
    pub links: Vec<LinkFact>,
    pub prefix_paths: Vec<PrefixPathFact>,
    /// Number of raw facts this group was expanded from.
    pub source_facts: usize,
}

impl FactGroup {
    /// Total rows across the three lists.
    pub fn row_count(&self) -> usize {
        self.prefix_origins.len() + self.links.len() + self.prefix_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// Half-open time interval `[start, end)` in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> i64 {
        // Saturates for ranges wider than i64::MAX.
        self.end.saturating_sub(self.start).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }

    /// Split into contiguous, disjoint windows covering `self`.
    ///
    /// Yields `chunks` windows of equal length with the last one absorbing
    /// the remainder, or one window per second when the range is shorter
    /// than `chunks`. An empty window splits into nothing.
    pub fn split(&self, chunks: u32) -> Vec<TimeWindow> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        let n = i64::from(chunks.max(1)).min(len);
        let step = len / n;
        (0..n)
            .map(|i| {
                let start = self.start + i * step;
                let end = if i == n - 1 { self.end } else { start + step };
                TimeWindow::new(start, end)
            })
            .collect()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
