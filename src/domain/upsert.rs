//! Dedup & upsert policies
//!
//! Both sources identify "the same listing" by the `(name, link)` natural
//! key, but react differently to a price change:
//!
//! - [`UpsertPolicy::Overwrite`] (Kabum) mutates the matched row in place.
//! - [`UpsertPolicy::HistoryAppend`] (Mercado Livre) leaves the matched row
//!   alone and appends a new row, building a price-over-time ledger.
//!
//! The decision itself is pure ([`UpsertPolicy::decide`]); the engine only
//! feeds it the current record and applies the outcome to a batch.

use serde::Serialize;
use tracing::{debug, info};

use super::product::{CatalogRecord, NewCatalogRecord, NormalizedItem, RecordChanges};
use super::repositories::{CatalogBatch, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertPolicy {
    /// Overwrite price and images of the matched record
    Overwrite,
    /// Insert a new record whenever the stored price differs
    HistoryAppend,
}

/// What to do with one incoming item
#[derive(Debug, Clone, PartialEq)]
pub enum WriteDecision {
    Insert(NewCatalogRecord),
    Overwrite { id: i64, changes: RecordChanges },
    AppendHistory {
        record: NewCatalogRecord,
        /// Image refresh applied to the previous row alongside the append
        image_refresh: Option<(i64, RecordChanges)>,
    },
    RefreshImage { id: i64, changes: RecordChanges },
    Skip,
}

impl UpsertPolicy {
    pub fn decide(self, existing: Option<&CatalogRecord>, item: &NormalizedItem) -> WriteDecision {
        let keep_gallery = matches!(self, Self::Overwrite);
        let Some(existing) = existing else {
            return WriteDecision::Insert(NewCatalogRecord::from_item(item, keep_gallery));
        };

        match self {
            Self::Overwrite => WriteDecision::Overwrite {
                id: existing.id,
                changes: RecordChanges {
                    price: Some(item.price),
                    primary_image: item.primary_image.clone(),
                    gallery_images: (!item.gallery_images.is_empty())
                        .then(|| item.gallery_images.clone()),
                },
            },
            Self::HistoryAppend => {
                let image_refresh = match &item.primary_image {
                    Some(image) if existing.primary_image.as_ref() != Some(image) => Some((
                        existing.id,
                        RecordChanges {
                            primary_image: Some(image.clone()),
                            ..RecordChanges::default()
                        },
                    )),
                    _ => None,
                };

                if existing.price.same_amount(item.price) {
                    match image_refresh {
                        Some((id, changes)) => WriteDecision::RefreshImage { id, changes },
                        None => WriteDecision::Skip,
                    }
                } else {
                    WriteDecision::AppendHistory {
                        record: NewCatalogRecord::from_item(item, false),
                        image_refresh,
                    }
                }
            }
        }
    }
}

/// Write counters for one or more batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub history_appended: usize,
    pub skipped: usize,
}

impl UpsertStats {
    pub const fn writes(&self) -> usize {
        self.inserted + self.updated + self.history_appended
    }

    pub fn absorb(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.history_appended += other.history_appended;
        self.skipped += other.skipped;
    }
}

/// Applies a policy to every item of a page, inside one batch
#[derive(Debug, Clone, Copy)]
pub struct UpsertEngine {
    policy: UpsertPolicy,
}

impl UpsertEngine {
    pub const fn new(policy: UpsertPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> UpsertPolicy {
        self.policy
    }

    /// Stage the writes for `items`; the caller commits the batch.
    pub async fn apply(
        &self,
        batch: &mut dyn CatalogBatch,
        items: &[NormalizedItem],
    ) -> StorageResult<UpsertStats> {
        let source = batch.source();
        let mut stats = UpsertStats::default();

        for item in items {
            let existing = batch.find_by_name_and_link(&item.name, &item.link).await?;
            match self.policy.decide(existing.as_ref(), item) {
                WriteDecision::Insert(record) => {
                    let id = batch.insert(&record).await?;
                    debug!(%source, id, name = %item.name, price = %item.price, "inserted");
                    stats.inserted += 1;
                }
                WriteDecision::Overwrite { id, changes } => {
                    batch.update(id, &changes).await?;
                    debug!(%source, id, name = %item.name, price = %item.price, "overwritten");
                    stats.updated += 1;
                }
                WriteDecision::AppendHistory { record, image_refresh } => {
                    if let Some((id, changes)) = image_refresh {
                        batch.update(id, &changes).await?;
                    }
                    let id = batch.insert(&record).await?;
                    info!(%source, id, name = %item.name, price = %item.price, "new price recorded");
                    stats.history_appended += 1;
                }
                WriteDecision::RefreshImage { id, changes } => {
                    batch.update(id, &changes).await?;
                    debug!(%source, id, name = %item.name, "image refreshed");
                    stats.updated += 1;
                }
                WriteDecision::Skip => {
                    debug!(%source, name = %item.name, "unchanged, skipped");
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::{Price, Source};
    use crate::domain::repositories::CatalogStore;
    use crate::infrastructure::memory_catalog::InMemoryCatalogStore;
    use chrono::Utc;

    fn item(price: f64, image: Option<&str>) -> NormalizedItem {
        NormalizedItem {
            name: "Teclado Mecânico".to_string(),
            price: Price::new(price).unwrap(),
            link: "https://produto.mercadolivre.com.br/MLB-1".to_string(),
            primary_image: image.map(str::to_string),
            gallery_images: Vec::new(),
            category: None,
        }
    }

    fn record(price: f64, image: Option<&str>) -> CatalogRecord {
        CatalogRecord {
            id: 7,
            name: "Teclado Mecânico".to_string(),
            price: Price::new(price).unwrap(),
            link: "https://produto.mercadolivre.com.br/MLB-1".to_string(),
            primary_image: image.map(str::to_string),
            gallery_images: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_key_is_inserted_under_both_policies() {
        for policy in [UpsertPolicy::Overwrite, UpsertPolicy::HistoryAppend] {
            assert!(matches!(policy.decide(None, &item(10.0, None)), WriteDecision::Insert(_)));
        }
    }

    #[test]
    fn history_append_skips_identical_price() {
        let existing = record(199.9, Some("https://img/a.jpg"));
        let decision = UpsertPolicy::HistoryAppend.decide(Some(&existing), &item(199.9, Some("https://img/a.jpg")));
        assert_eq!(decision, WriteDecision::Skip);
    }

    #[test]
    fn history_append_refreshes_changed_image_without_new_row() {
        let existing = record(199.9, Some("https://img/a.jpg"));
        let decision = UpsertPolicy::HistoryAppend.decide(Some(&existing), &item(199.9, Some("https://img/b.jpg")));
        match decision {
            WriteDecision::RefreshImage { id, changes } => {
                assert_eq!(id, 7);
                assert_eq!(changes.primary_image.as_deref(), Some("https://img/b.jpg"));
                assert!(changes.price.is_none());
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn history_append_appends_on_price_change() {
        let existing = record(199.9, Some("https://img/a.jpg"));
        let decision = UpsertPolicy::HistoryAppend.decide(Some(&existing), &item(149.9, Some("https://img/a.jpg")));
        match decision {
            WriteDecision::AppendHistory { record, image_refresh } => {
                assert_eq!(record.price.value(), 149.9);
                assert!(record.gallery_images.is_none());
                assert!(image_refresh.is_none());
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn overwrite_keeps_stored_image_when_item_has_none() {
        let existing = record(199.9, Some("https://img/a.jpg"));
        let decision = UpsertPolicy::Overwrite.decide(Some(&existing), &item(149.9, None));
        assert_eq!(
            decision,
            WriteDecision::Overwrite {
                id: 7,
                changes: RecordChanges {
                    price: Some(Price::new(149.9).unwrap()),
                    primary_image: None,
                    gallery_images: None,
                },
            }
        );
    }

    async fn run_page(store: &InMemoryCatalogStore, source: Source, items: &[NormalizedItem]) -> UpsertStats {
        let engine = UpsertEngine::new(source.upsert_policy());
        let mut batch = store.begin(source).await.unwrap();
        let stats = engine.apply(batch.as_mut(), items).await.unwrap();
        batch.commit().await.unwrap();
        stats
    }

    #[tokio::test]
    async fn repeated_item_with_same_price_causes_no_writes() {
        let store = InMemoryCatalogStore::new();
        run_page(&store, Source::MercadoLivre, &[item(89.0, None)]).await;
        let stats = run_page(&store, Source::MercadoLivre, &[item(89.0, None)]).await;

        assert_eq!(stats.writes(), 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.count(Source::MercadoLivre).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn price_change_appends_for_static_and_overwrites_for_rendered() {
        let store = InMemoryCatalogStore::new();

        run_page(&store, Source::MercadoLivre, &[item(89.0, None)]).await;
        let stats = run_page(&store, Source::MercadoLivre, &[item(79.0, None)]).await;
        assert_eq!(stats.history_appended, 1);
        assert_eq!(store.count(Source::MercadoLivre).await.unwrap(), 2);

        run_page(&store, Source::Kabum, &[item(89.0, None)]).await;
        let stats = run_page(&store, Source::Kabum, &[item(79.0, None)]).await;
        assert_eq!(stats.updated, 1);
        assert_eq!(store.count(Source::Kabum).await.unwrap(), 1);
        let rows = store.records(Source::Kabum);
        assert_eq!(rows[0].price.value(), 79.0);
    }

    #[tokio::test]
    async fn duplicates_within_one_page_are_deduplicated() {
        let store = InMemoryCatalogStore::new();
        let stats = run_page(&store, Source::MercadoLivre, &[item(89.0, None), item(89.0, None)]).await;
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn history_compares_against_latest_row() {
        let store = InMemoryCatalogStore::new();
        run_page(&store, Source::MercadoLivre, &[item(89.0, None)]).await;
        run_page(&store, Source::MercadoLivre, &[item(79.0, None)]).await;
        let stats = run_page(&store, Source::MercadoLivre, &[item(79.0, None)]).await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.count(Source::MercadoLivre).await.unwrap(), 2);
    }
}
