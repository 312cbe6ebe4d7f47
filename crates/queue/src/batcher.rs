//! Per-worker accumulator of raw facts.
//!
//! Collects [`RawFact`]s and signals a flush when either the size threshold
//! or the optional time window is reached, whichever comes first. The size
//! threshold keeps groups large enough for efficient multi-row inserts; the
//! time window bounds how long a sparse feed can hold facts back.

use std::time::{Duration, Instant};

use bgpstage_core::RawFact;

pub struct FactBatcher {
    buffer: Vec<RawFact>,
    max_size: usize,
    max_wait: Option<Duration>,
    batch_started: Option<Instant>,
}

impl FactBatcher {
    /// Create a batcher that flushes at `max_size` facts, or `max_wait` after
    /// the first fact of the batch when a wait is given.
    pub fn new(max_size: usize, max_wait: Option<Duration>) -> Self {
        Self {
            buffer: Vec::with_capacity(max_size),
            max_size: max_size.max(1),
            max_wait,
            batch_started: None,
        }
    }

    /// Add facts to the current batch. Starts the timer on the first
    /// non-empty push.
    pub fn push(&mut self, facts: Vec<RawFact>) {
        if self.batch_started.is_none() && !facts.is_empty() {
            self.batch_started = Some(Instant::now());
        }
        self.buffer.extend(facts);
    }

    pub fn should_flush(&self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        if self.buffer.len() >= self.max_size {
            return true;
        }
        match (self.max_wait, self.batch_started) {
            (Some(wait), Some(started)) => started.elapsed() >= wait,
            _ => false,
        }
    }

    /// Take everything buffered and reset for the next batch.
    pub fn flush(&mut self) -> Vec<RawFact> {
        self.batch_started = None;
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.max_size))
    }

    /// Flush only if a threshold is met.
    pub fn try_flush(&mut self) -> Option<Vec<RawFact>> {
        if self.should_flush() {
            Some(self.flush())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgpstage_core::normalize_prefix;

    fn facts(count: usize) -> Vec<RawFact> {
        let range = normalize_prefix("10.0.0.0/8").unwrap();
        (0..count)
            .map(|i| RawFact::announcement(vec![1, 2], range.clone(), i as i64))
            .collect()
    }

    #[test]
    fn flush_on_size() {
        let mut batcher = FactBatcher::new(3, None);
        batcher.push(facts(2));
        assert!(!batcher.should_flush());
        batcher.push(facts(1));
        assert!(batcher.should_flush());
    }

    #[test]
    fn oversized_push_flushes_everything() {
        let mut batcher = FactBatcher::new(2, None);
        batcher.push(facts(5));
        let flushed = batcher.try_flush().unwrap();
        assert_eq!(flushed.len(), 5);
        assert!(batcher.is_empty());
    }

    #[test]
    fn flush_on_timeout() {
        let mut batcher = FactBatcher::new(100, Some(Duration::from_millis(10)));
        batcher.push(facts(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(batcher.should_flush());
    }

    #[test]
    fn no_timeout_without_wait() {
        let mut batcher = FactBatcher::new(100, None);
        batcher.push(facts(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(batcher.try_flush().is_none());
    }

    #[test]
    fn empty_push_does_not_start_timer() {
        let mut batcher = FactBatcher::new(5, Some(Duration::from_millis(1)));
        batcher.push(vec![]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(!batcher.should_flush());
    }

    #[test]
    fn flush_resets_state() {
        let mut batcher = FactBatcher::new(2, None);
        batcher.push(facts(3));
        assert_eq!(batcher.flush().len(), 3);
        assert_eq!(batcher.len(), 0);
        assert!(!batcher.should_flush());
        assert!(batcher.flush().is_empty());
    }
}
