//! Record source contract.
//!
//! Every fetch worker gets its own source, opened through a shared
//! [`SourceFactory`]. Sources are pulled from a single blocking thread and
//! are never shared between workers.

use bgpstage_core::{RawRecord, TimeWindow};

use crate::error::SourceError;

/// A pull-based stream of records for one feed and time window.
pub trait RecordSource: Send {
    /// The next record, or `None` once the stream is exhausted.
    ///
    /// An `Err` concerns that record only; callers keep pulling.
    fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>>;
}

/// Opens independent [`RecordSource`]s, one per `(feed, window)`.
pub trait SourceFactory: Send + Sync {
    fn open(&self, feed: &str, window: TimeWindow) -> Result<Box<dyn RecordSource>, SourceError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;

    use bgpstage_core::{ElementType, RecordElement, RecordStatus};

    use super::*;

    pub(crate) fn announce(time: i64, prefix: &str, path: &str) -> RecordElement {
        RecordElement {
            elem_type: ElementType::Announcement,
            prefix: Some(prefix.into()),
            as_path: Some(path.into()),
            time,
        }
    }

    pub(crate) fn withdraw(time: i64, prefix: &str) -> RecordElement {
        RecordElement {
            elem_type: ElementType::Withdrawal,
            prefix: Some(prefix.into()),
            as_path: None,
            time,
        }
    }

    pub(crate) fn record(feed: &str, time: i64, elements: Vec<RecordElement>) -> RawRecord {
        RawRecord {
            feed: feed.into(),
            time,
            status: RecordStatus::Valid,
            elements,
        }
    }

    /// Replays a fixed list of results.
    pub(crate) struct VecSource(std::vec::IntoIter<Result<RawRecord, SourceError>>);

    impl VecSource {
        pub(crate) fn new(items: Vec<Result<RawRecord, SourceError>>) -> Self {
            Self(items.into_iter())
        }

        pub(crate) fn ok(records: Vec<RawRecord>) -> Self {
            Self::new(records.into_iter().map(Ok).collect())
        }
    }

    impl RecordSource for VecSource {
        fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>> {
            self.0.next()
        }
    }

    /// In-memory records per feed, filtered by window on open.
    #[derive(Default)]
    pub(crate) struct FakeFactory {
        pub(crate) feeds: HashMap<String, Vec<RawRecord>>,
    }

    impl FakeFactory {
        pub(crate) fn with_feed(mut self, feed: &str, records: Vec<RawRecord>) -> Self {
            self.feeds.insert(feed.into(), records);
            self
        }
    }

    impl SourceFactory for FakeFactory {
        fn open(&self, feed: &str, window: TimeWindow) -> Result<Box<dyn RecordSource>, SourceError> {
            let records = self
                .feeds
                .get(feed)
                .ok_or_else(|| SourceError::Unavailable(feed.to_string()))?;
            let in_window = records
                .iter()
                .filter(|r| window.contains(r.time))
                .cloned()
                .collect();
            Ok(Box::new(VecSource::ok(in_window)))
        }
    }
}
