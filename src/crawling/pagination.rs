//! Pagination controller
//!
//! Drives one source adapter across the pages of one target (category or
//! search term):
//!
//! ```text
//! while pages_fetched < max_pages && budget left && !cancelled:
//!     fetch page -> normalize -> claim budget -> [gallery visits] -> upsert batch -> commit
//! ```
//!
//! An empty page ends the target. A skipped page (render timeout) only
//! consumes page budget. The item budget is shared by every target and
//! source of a run.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CrawlError, ListingSource, PageOutcome};
use crate::domain::normalizer::normalize_candidate;
use crate::domain::product::{NormalizedItem, Source};
use crate::domain::repositories::{CatalogStore, StorageResult};
use crate::domain::upsert::{UpsertEngine, UpsertStats};
use crate::infrastructure::config::{CrawlTarget, DelayRange};

/// Run-wide cap on collected items, shared between concurrent crawls
#[derive(Debug, Clone)]
pub struct ItemBudget {
    limit: usize,
    remaining: Arc<AtomicUsize>,
}

impl ItemBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            remaining: Arc::new(AtomicUsize::new(limit)),
        }
    }

    /// Take up to `wanted` items from the budget; returns how many were granted
    pub fn claim(&self, wanted: usize) -> usize {
        let mut granted = 0;
        let _ = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                granted = wanted.min(left);
                Some(left - granted)
            });
        granted
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }
}

/// Randomized courtesy pauses
#[derive(Debug, Clone, Copy)]
pub struct PageDelays {
    /// Before every listing page after the first
    pub page: DelayRange,
    /// Before every detail-page visit
    pub detail: DelayRange,
}

impl PageDelays {
    pub const fn none() -> Self {
        Self {
            page: DelayRange::none(),
            detail: DelayRange::none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxPages,
    MaxItems,
    EmptyPage,
    PageFailed,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaxPages => "max pages reached",
            Self::MaxItems => "max items reached",
            Self::EmptyPage => "empty page",
            Self::PageFailed => "page request failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Outcome of crawling one target
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub label: String,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    /// Valid items taken from the pages (within the item budget)
    pub items_collected: usize,
    /// Candidates dropped for a missing or invalid price
    pub items_dropped: usize,
    pub writes: UpsertStats,
    pub stop: StopReason,
}

impl TargetReport {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            pages_fetched: 0,
            pages_skipped: 0,
            items_collected: 0,
            items_dropped: 0,
            writes: UpsertStats::default(),
            stop: StopReason::MaxPages,
        }
    }
}

pub struct PaginationController {
    store: Arc<dyn CatalogStore>,
    engine: UpsertEngine,
    budget: ItemBudget,
    delays: PageDelays,
    max_pages: u32,
    collect_gallery: bool,
    cancel: CancellationToken,
}

impl PaginationController {
    pub fn new(store: Arc<dyn CatalogStore>, engine: UpsertEngine, budget: ItemBudget, max_pages: u32) -> Self {
        Self {
            store,
            engine,
            budget,
            delays: PageDelays::none(),
            max_pages: max_pages.max(1),
            collect_gallery: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_delays(mut self, delays: PageDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn with_gallery(mut self, collect: bool) -> Self {
        self.collect_gallery = collect;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Crawl `target` until a stop condition is hit.
    ///
    /// Only a failed batch commit is an error; pages committed before it
    /// stay committed.
    pub async fn crawl_target(
        &self,
        source: &mut dyn ListingSource,
        target: &CrawlTarget,
    ) -> Result<TargetReport, CrawlError> {
        let kind = source.source();
        let mut report = TargetReport::new(&target.label);
        let mut page_limit = self.max_pages;
        let mut page = 1;

        report.stop = loop {
            if page > page_limit {
                break StopReason::MaxPages;
            }
            if self.budget.is_exhausted() {
                break StopReason::MaxItems;
            }
            if page > 1 && !self.pause(self.delays.page).await {
                break StopReason::Cancelled;
            }
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let outcome = source.fetch_page(target, page, &self.cancel).await;
            report.pages_fetched += 1;

            let listing = match outcome {
                PageOutcome::Loaded(listing) => listing,
                PageOutcome::Skipped(reason) => {
                    debug!("[{}] Page {} skipped: {}", target.label, page, reason);
                    report.pages_skipped += 1;
                    page += 1;
                    continue;
                }
                PageOutcome::Failed(_) if self.cancel.is_cancelled() => break StopReason::Cancelled,
                PageOutcome::Failed(_) => break StopReason::PageFailed,
            };

            if let Some(advertised) = listing.page_count {
                if advertised < page_limit {
                    debug!("[{}] Listing advertises {} pages", target.label, advertised);
                    page_limit = advertised.max(page);
                }
            }

            if listing.candidates.is_empty() {
                info!("[{}] Page {} is empty, no more inventory", target.label, page);
                break StopReason::EmptyPage;
            }

            let found = listing.candidates.len();
            let mut items: Vec<NormalizedItem> = listing
                .candidates
                .into_iter()
                .filter_map(|candidate| normalize_candidate(candidate, kind, Some(&target.label)))
                .collect();
            report.items_dropped += found - items.len();

            let valid = items.len();
            let granted = self.budget.claim(valid);
            items.truncate(granted);

            if self.collect_gallery && source.supports_gallery() {
                for item in &mut items {
                    tokio::time::sleep(self.delays.detail.sample()).await;
                    let gallery = source.collect_gallery(&item.link).await;
                    item.attach_gallery(gallery);
                }
            }

            let writes = self
                .persist(kind, &items)
                .await
                .map_err(|source| CrawlError::Persistence {
                    target: target.label.clone(),
                    page,
                    source,
                })?;
            report.items_collected += items.len();
            report.writes.absorb(writes);

            info!(
                "[{}] Page {}: {} candidates, {} valid, {} kept ({} inserted, {} updated, {} history, {} unchanged)",
                target.label,
                page,
                found,
                valid,
                items.len(),
                writes.inserted,
                writes.updated,
                writes.history_appended,
                writes.skipped
            );

            if granted < valid {
                break StopReason::MaxItems;
            }
            page += 1;
        };

        info!(
            "[{}] Finished: {} ({} pages, {} items)",
            target.label, report.stop, report.pages_fetched, report.items_collected
        );
        Ok(report)
    }

    /// Apply one page's items as a single committed batch
    async fn persist(&self, kind: Source, items: &[NormalizedItem]) -> StorageResult<UpsertStats> {
        if items.is_empty() {
            return Ok(UpsertStats::default());
        }
        let mut batch = self.store.begin(kind).await?;
        let stats = self.engine.apply(batch.as_mut(), items).await?;
        batch.commit().await?;
        Ok(stats)
    }

    /// Sleep for a sampled delay; `false` if cancelled meanwhile
    async fn pause(&self, range: DelayRange) -> bool {
        let delay: Duration = range.sample();
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("Cancellation requested, stopping before next page");
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
