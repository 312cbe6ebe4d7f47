//! Work assignments: one per `(feed, time chunk)`.

use std::fmt;

use serde::Serialize;

use bgpstage_core::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Assignment {
    pub feed: String,
    pub chunk: u32,
    pub window: TimeWindow,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {}", self.feed, self.chunk, self.window)
    }
}

/// Every feed crossed with every chunk of `window`, feed-major.
pub fn assignments(feeds: &[String], window: TimeWindow, chunks: u32) -> Vec<Assignment> {
    let windows = window.split(chunks);
    feeds
        .iter()
        .flat_map(|feed| {
            windows.iter().zip(0u32..).map(move |(w, chunk)| Assignment {
                feed: feed.clone(),
                chunk,
                window: *w,
            })
        })
        .collect()
}
