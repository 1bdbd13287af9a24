//! Repository interfaces for the product catalog
//!
//! The ingestion pipeline only ever reads a record by its natural key,
//! inserts, and updates. Writes for one listing page go through a
//! [`CatalogBatch`] and become durable together on `commit`.

use async_trait::async_trait;
use thiserror::Error;

use super::product::{CatalogListing, CatalogRecord, NewCatalogRecord, RecordChanges, Source};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode gallery for '{link}': {source}")]
    Serialization {
        link: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {id} not found in {collection}")]
    RecordNotFound { id: i64, collection: Source },

    #[error("stored row {id} is invalid: {reason}")]
    InvalidRow { id: i64, reason: String },

    #[error("catalog store is unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Entry point to the catalog collections
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a unit of work on one source's collection
    async fn begin(&self, source: Source) -> StorageResult<Box<dyn CatalogBatch>>;

    /// Case-insensitive name search across every source, cheapest first
    async fn search_by_name(&self, fragment: &str, limit: u32) -> StorageResult<Vec<CatalogListing>>;

    /// Number of rows stored for `source`
    async fn count(&self, source: Source) -> StorageResult<u64>;
}

/// Writes staged for a single listing page
#[async_trait]
pub trait CatalogBatch: Send {
    fn source(&self) -> Source;

    /// Most recent record for the `(name, link)` natural key, including rows
    /// staged earlier in this batch
    async fn find_by_name_and_link(&mut self, name: &str, link: &str) -> StorageResult<Option<CatalogRecord>>;

    async fn insert(&mut self, record: &NewCatalogRecord) -> StorageResult<i64>;

    async fn update(&mut self, id: i64, changes: &RecordChanges) -> StorageResult<()>;

    /// Make every staged write durable. Dropping the batch without committing
    /// discards them.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
