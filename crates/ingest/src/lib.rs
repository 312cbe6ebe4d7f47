//! Parallel ingestion: fetch workers feed a bounded queue drained by a
//! single writer that owns the fact store.

pub mod chunk;
pub mod error;
pub mod jsonl;
pub mod pipeline;
pub mod source;
pub mod worker;
pub mod writer;

pub use chunk::{assignments, Assignment};
pub use error::{IngestError, SourceError};
pub use jsonl::{JsonlSource, JsonlSourceFactory};
pub use pipeline::{Pipeline, PipelineReport, WorkerOutcome, WorkerSet, WorkerStatus};
pub use source::{RecordSource, SourceFactory};
pub use worker::{apply_priority_hint, FetchWorker, WorkerSettings, WorkerSummary};
pub use writer::{Completion, WriterLoop, WriterReport, WriterSettings};
