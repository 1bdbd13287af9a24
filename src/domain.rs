//! Domain module - Core catalog entities and ingestion rules
//!
//! This module contains the product entities, the text/price normalizer,
//! the storage interfaces and the dedup/upsert policies. Nothing in here
//! touches the network or the database directly.

pub mod normalizer;
pub mod product;
pub mod repositories;
pub mod upsert;

// Re-export commonly used items for convenience
pub use normalizer::{normalize_candidate, normalize_name, parse_price};
pub use product::{
    CatalogListing, CatalogRecord, NewCatalogRecord, NormalizedItem, Price, RawCandidate,
    RecordChanges, Source,
};
pub use repositories::{CatalogBatch, CatalogStore, StorageError};
pub use upsert::{UpsertEngine, UpsertPolicy, UpsertStats, WriteDecision};
