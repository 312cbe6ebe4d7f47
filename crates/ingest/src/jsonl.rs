//! Replay source reading records from JSON-lines files.
//!
//! Each feed lives in `<dir>/<feed>.jsonl`, one serialized [`RawRecord`] per
//! line. A worker only sees the records whose timestamp falls in its window,
//! so one file can back any number of chunks.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use tracing::debug;

use bgpstage_core::{RawRecord, TimeWindow};

use crate::error::SourceError;
use crate::source::{RecordSource, SourceFactory};

#[derive(Debug, Clone)]
pub struct JsonlSourceFactory {
    dir: PathBuf,
}

impl JsonlSourceFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, feed: &str) -> PathBuf {
        self.dir.join(format!("{feed}.jsonl"))
    }
}

impl SourceFactory for JsonlSourceFactory {
    fn open(&self, feed: &str, window: TimeWindow) -> Result<Box<dyn RecordSource>, SourceError> {
        let path = self.path_for(feed);
        let file = File::open(&path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), %window, "opened jsonl source");
        Ok(Box::new(JsonlSource::new(BufReader::new(file), feed, window)))
    }
}

pub struct JsonlSource<R> {
    reader: R,
    buf: Vec<u8>,
    feed: String,
    window: TimeWindow,
    line: u64,
    failed: bool,
}

impl<R: BufRead> JsonlSource<R> {
    pub fn new(reader: R, feed: &str, window: TimeWindow) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            feed: feed.to_string(),
            window,
            line: 0,
            failed: false,
        }
    }
}

impl<R: BufRead + Send> RecordSource for JsonlSource<R> {
    fn next_record(&mut self) -> Option<Result<RawRecord, SourceError>> {
        // A read error leaves the reader in an unknown position; stop after it.
        // Undecodable bytes are not read errors: the line is consumed whole.
        if self.failed {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
            self.line += 1;

            let text = self.buf.trim_ascii();
            if text.is_empty() {
                continue;
            }
            let mut record: RawRecord = match serde_json::from_slice(text) {
                Ok(record) => record,
                Err(e) => {
                    return Some(Err(SourceError::Decode {
                        line: self.line,
                        message: e.to_string(),
                    }))
                }
            };
            if !self.window.contains(record.time) {
                continue;
            }
            if record.feed.is_empty() {
                record.feed.clone_from(&self.feed);
            }
            return Some(Ok(record));
        }
    }
}
