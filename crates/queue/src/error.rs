//! Queue error types.

use thiserror::Error;

/// Full or momentarily empty queues are flow control, not errors; the only
/// failure a producer can see is the consumer having gone away.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue closed: consumer dropped")]
    Closed,
}
