//! Application layer
//!
//! Use cases that wire the crawling layer to storage for one invocation of
//! the binary.

pub mod ingestion;

pub use ingestion::{IngestionRun, RunSummary, SourceStatus, SourceSummary};
