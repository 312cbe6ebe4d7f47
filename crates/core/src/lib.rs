pub mod address;
pub mod config;
pub mod error;
pub mod expand;
pub mod model;
pub mod record;
pub mod transcode;

pub use address::{normalize_prefix, AddressRange};
pub use config::{PipelineConfig, TuningConfig};
pub use error::*;
pub use expand::expand;
pub use model::*;
pub use record::{ElementType, ParsedElement, RawRecord, RecordElement, RecordStatus};
pub use transcode::{transcode, ElementCounts, Transcoded};
