//! Bounded multi-producer / single-consumer hand-off of [`FactGroup`]s.
//!
//! Producers block when the queue is full; this is the pipeline's only
//! backpressure mechanism and caps memory while the writer is busy (for
//! example during compaction). The consumer pops with a bounded wait so it
//! can re-check its termination condition between groups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use bgpstage_core::FactGroup;

use crate::error::QueueError;

/// Create a queue holding at most `capacity` groups.
pub fn fact_channel(capacity: usize) -> (FactSender, FactReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(QueueStats::default());
    (
        FactSender {
            tx,
            stats: stats.clone(),
        },
        FactReceiver { rx, stats },
    )
}

// ── Stats ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    popped: AtomicU64,
    /// Pushes that found the queue full and had to wait.
    full_waits: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatsSnapshot {
    pub pushed: u64,
    pub popped: u64,
    pub full_waits: u64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            full_waits: self.full_waits.load(Ordering::Relaxed),
        }
    }
}

// ── Producer side ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FactSender {
    tx: mpsc::Sender<FactGroup>,
    stats: Arc<QueueStats>,
}

impl FactSender {
    /// Push a group, waiting for room when the queue is full.
    pub async fn push(&self, group: FactGroup) -> Result<(), QueueError> {
        self.note_full();
        self.tx.send(group).await.map_err(|_| QueueError::Closed)?;
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Blocking variant of [`push`](Self::push) for worker threads.
    ///
    /// Must not be called from inside an async context.
    pub fn push_blocking(&self, group: FactGroup) -> Result<(), QueueError> {
        self.note_full();
        self.tx.blocking_send(group).map_err(|_| QueueError::Closed)?;
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Groups currently waiting in the queue.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn note_full(&self) {
        if self.tx.capacity() == 0 {
            self.stats.full_waits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(capacity = self.tx.max_capacity(), "queue full, producer waiting");
        }
    }
}

// ── Consumer side ────────────────────────────────────────────────────

/// Result of a bounded pop.
#[derive(Debug)]
pub enum Pop {
    Group(FactGroup),
    /// Nothing arrived within the wait; producers may still be running.
    Timeout,
    /// Every producer is gone and the queue is drained.
    Closed,
}

#[derive(Debug)]
pub struct FactReceiver {
    rx: mpsc::Receiver<FactGroup>,
    stats: Arc<QueueStats>,
}

impl FactReceiver {
    /// Pop one group, waiting at most `wait`.
    pub async fn pop_timeout(&mut self, wait: Duration) -> Pop {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(group)) => {
                self.stats.popped.fetch_add(1, Ordering::Relaxed);
                Pop::Group(group)
            }
            Ok(None) => Pop::Closed,
            Err(_) => Pop::Timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Refuse further pushes. Groups already queued can still be popped.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }
}
