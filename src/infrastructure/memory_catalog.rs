//! In-memory catalog store
//!
//! Backs `--dry-run` runs and the test suites. A batch works on a private
//! copy of the source's rows and swaps it in on commit, so an uncommitted
//! batch leaves no trace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::product::{CatalogListing, CatalogRecord, NewCatalogRecord, RecordChanges, Source};
use crate::domain::repositories::{CatalogBatch, CatalogStore, StorageError, StorageResult};

#[derive(Debug, Default)]
struct Collections {
    rows: HashMap<Source, Vec<CatalogRecord>>,
    next_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogStore {
    inner: Arc<Mutex<Collections>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(inner: &Mutex<Collections>) -> StorageResult<MutexGuard<'_, Collections>> {
        inner
            .lock()
            .map_err(|_| StorageError::Unavailable("in-memory catalog lock poisoned".to_string()))
    }

    /// Snapshot of the committed rows for `source`, in insertion order
    pub fn records(&self, source: Source) -> Vec<CatalogRecord> {
        Self::lock(&self.inner)
            .map(|guard| guard.rows.get(&source).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn begin(&self, source: Source) -> StorageResult<Box<dyn CatalogBatch>> {
        let guard = Self::lock(&self.inner)?;
        Ok(Box::new(InMemoryBatch {
            store: Arc::clone(&self.inner),
            source,
            staged: guard.rows.get(&source).cloned().unwrap_or_default(),
            next_id: guard.next_id,
        }))
    }

    async fn search_by_name(&self, fragment: &str, limit: u32) -> StorageResult<Vec<CatalogListing>> {
        let needle = fragment.to_lowercase();
        let guard = Self::lock(&self.inner)?;
        let mut listings: Vec<CatalogListing> = Source::ALL
            .iter()
            .flat_map(|source| {
                guard
                    .rows
                    .get(source)
                    .into_iter()
                    .flatten()
                    .filter(|record| record.name.to_lowercase().contains(&needle))
                    .map(|record| CatalogListing {
                        source: *source,
                        record: record.clone(),
                    })
            })
            .collect();
        listings.sort_by(|a, b| a.record.price.value().total_cmp(&b.record.price.value()));
        listings.truncate(limit as usize);
        Ok(listings)
    }

    async fn count(&self, source: Source) -> StorageResult<u64> {
        let guard = Self::lock(&self.inner)?;
        Ok(guard.rows.get(&source).map_or(0, |rows| rows.len() as u64))
    }
}

struct InMemoryBatch {
    store: Arc<Mutex<Collections>>,
    source: Source,
    staged: Vec<CatalogRecord>,
    next_id: i64,
}

#[async_trait]
impl CatalogBatch for InMemoryBatch {
    fn source(&self) -> Source {
        self.source
    }

    async fn find_by_name_and_link(&mut self, name: &str, link: &str) -> StorageResult<Option<CatalogRecord>> {
        Ok(self
            .staged
            .iter()
            .rev()
            .find(|record| record.name == name && record.link == link)
            .cloned())
    }

    async fn insert(&mut self, record: &NewCatalogRecord) -> StorageResult<i64> {
        self.next_id += 1;
        let id = self.next_id;
        self.staged.push(CatalogRecord {
            id,
            name: record.name.clone(),
            price: record.price,
            link: record.link.clone(),
            primary_image: record.primary_image.clone(),
            gallery_images: record.gallery_images.clone(),
            updated_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update(&mut self, id: i64, changes: &RecordChanges) -> StorageResult<()> {
        let record = self
            .staged
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StorageError::RecordNotFound {
                id,
                collection: self.source,
            })?;
        if let Some(price) = changes.price {
            record.price = price;
        }
        if let Some(image) = &changes.primary_image {
            record.primary_image = Some(image.clone());
        }
        if let Some(gallery) = &changes.gallery_images {
            record.gallery_images = Some(gallery.clone());
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let Self {
            store,
            source,
            staged,
            next_id,
        } = *self;
        let mut guard = InMemoryCatalogStore::lock(&store)?;
        guard.next_id = guard.next_id.max(next_id);
        guard.rows.insert(source, staged);
        Ok(())
    }
}
