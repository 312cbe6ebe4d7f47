pub mod batcher;
pub mod channel;
pub mod error;

pub use batcher::FactBatcher;
pub use channel::{fact_channel, FactReceiver, FactSender, Pop, QueueStats, QueueStatsSnapshot};
pub use error::QueueError;
