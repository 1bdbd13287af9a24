//! Rendered listing adapter (Kabum)
//!
//! Pages are loaded in a browser tab and read only once the product cards
//! are present. A render that does not finish within the timeout skips the
//! page; there is no retry.

use std::time::Duration;

use async_trait::async_trait;
use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CrawlError, ListingPage, ListingSource, PageOutcome};
use crate::domain::product::Source;
use crate::infrastructure::browser::PageRenderer;
use crate::infrastructure::config::{CrawlTarget, KabumConfig, kabum};
use crate::infrastructure::parsing::{GalleryCollector, ListingExtractor, listing_total};

pub struct RenderedSource {
    renderer: Option<Box<dyn PageRenderer>>,
    extractor: ListingExtractor,
    gallery: GalleryCollector,
    page_size: u32,
    render_timeout: Duration,
}

impl RenderedSource {
    pub fn new(renderer: Box<dyn PageRenderer>, config: &KabumConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            renderer: Some(renderer),
            extractor: ListingExtractor::new(&config.selectors, &config.origin)?,
            gallery: GalleryCollector::new(&config.gallery, &config.origin)?,
            page_size: config.page_size.max(1),
            render_timeout: config.render_timeout(),
        })
    }

    /// Candidates and advertised page count of a rendered listing
    fn parse_listing(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);
        let candidates = self.extractor.extract(&document);
        let page_count = match listing_total(&document, kabum::LISTING_COUNT_SELECTOR) {
            Ok(total) => total.map(|total| total.div_ceil(self.page_size).max(1)),
            Err(e) => {
                warn!("Listing counter unreadable: {}", e);
                None
            }
        };
        ListingPage { candidates, page_count }
    }
}

#[async_trait]
impl ListingSource for RenderedSource {
    fn source(&self) -> Source {
        Source::Kabum
    }

    async fn fetch_page(&mut self, target: &CrawlTarget, page: u32, _cancel: &CancellationToken) -> PageOutcome {
        let Some(renderer) = self.renderer.as_mut() else {
            return PageOutcome::Failed("browser session already closed".to_string());
        };
        let url = kabum::page_url(&target.url, page, self.page_size);
        info!("[{}] Loading page {}: {}", target.label, page, url);

        if let Err(e) = renderer.navigate(&url).await {
            warn!("[{}] Navigation to page {} failed: {}", target.label, page, e);
            return PageOutcome::Skipped(e.to_string());
        }
        match renderer.wait_for_selector(kabum::READY_SELECTOR, self.render_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "[{}] Product cards did not render within {:?} on page {}",
                    target.label, self.render_timeout, page
                );
                return PageOutcome::Skipped(format!("render timeout after {:?}", self.render_timeout));
            }
            Err(e) => {
                warn!("[{}] Readiness check failed on page {}: {}", target.label, page, e);
                return PageOutcome::Skipped(e.to_string());
            }
        }
        let html = match renderer.content().await {
            Ok(html) => html,
            Err(e) => {
                warn!("[{}] Could not read page {}: {}", target.label, page, e);
                return PageOutcome::Skipped(e.to_string());
            }
        };

        let listing = self.parse_listing(&html);
        debug!(
            "[{}] Page {} yielded {} candidates (page count {:?})",
            target.label,
            page,
            listing.candidates.len(),
            listing.page_count
        );
        PageOutcome::Loaded(listing)
    }

    fn supports_gallery(&self) -> bool {
        true
    }

    async fn collect_gallery(&mut self, link: &str) -> Vec<String> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Vec::new();
        };
        if let Err(e) = renderer.navigate(link).await {
            warn!("Failed to open product page {}: {}", link, e);
            return Vec::new();
        }
        match renderer.content().await {
            Ok(html) => {
                let images = self.gallery.collect_str(&html);
                debug!("Collected {} images for {}", images.len(), link);
                images
            }
            Err(e) => {
                warn!("Failed to read product page {}: {}", link, e);
                Vec::new()
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.close().await {
                warn!("Browser session did not close cleanly: {}", e);
            }
        }
    }
}
