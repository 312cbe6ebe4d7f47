//! Record → fact transcoding.

use serde::Serialize;
use tracing::debug;

use crate::model::{FactKind, RawFact};
use crate::record::{ParsedElement, RawRecord};

/// Per-element outcome counters for one or more records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ElementCounts {
    pub announcements: u64,
    pub withdrawals: u64,
    pub none: u64,
    pub skipped: u64,
}

impl ElementCounts {
    pub fn produced(&self) -> u64 {
        self.announcements + self.withdrawals
    }

    pub fn merge(&mut self, other: &ElementCounts) {
        self.announcements += other.announcements;
        self.withdrawals += other.withdrawals;
        self.none += other.none;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcoded {
    pub facts: Vec<RawFact>,
    pub counts: ElementCounts,
}

/// Transcode one record into facts.
///
/// Invalid records yield nothing. Elements are handled independently: a
/// malformed element is counted as skipped and its siblings still go through.
pub fn transcode(record: &RawRecord) -> Transcoded {
    let mut out = Transcoded::default();
    if !record.is_valid() {
        return out;
    }

    for elem in &record.elements {
        match ParsedElement::from_element(elem) {
            Ok(ParsedElement::None) => out.counts.none += 1,
            Ok(parsed) => {
                if let Some(fact) = parsed.into_fact() {
                    match fact.kind {
                        FactKind::Announcement => out.counts.announcements += 1,
                        FactKind::Withdrawal => out.counts.withdrawals += 1,
                    }
                    out.facts.push(fact);
                }
            }
            Err(e) => {
                out.counts.skipped += 1;
                debug!(feed = %record.feed, time = elem.time, error = %e, "skipping element");
            }
        }
    }
    out
}
