//! Pipeline stages for one ingestion run.
//!
//! - `normalize`: raw scraped rows into canonical entries
//! - `batch`: time-ordered batch of one run
//! - `watermark`: persisted cursor load/save
//! - `append`: guarded appends to the capped log
//! - `delta`: tail comparison and range read
//! - `ingest`: orchestration of the above

pub mod append;
pub mod batch;
pub mod delta;
pub mod ingest;
pub mod normalize;
pub mod watermark;

pub use append::{AppendSummary, LogAppender};
pub use batch::Batch;
pub use delta::{DeltaResolver, Resolution, RunOutcome};
pub use ingest::{Ingestor, RunPhase, RunReport, RunStats};
pub use normalize::Normalizer;
pub use watermark::WatermarkClient;
