//! Static listing adapter (Mercado Livre)
//!
//! Plain HTTP GET per page. Any transport failure or non-2xx answer is
//! logged and reported as a failed page; the controller moves on to the
//! next search term.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CrawlError, ListingPage, ListingSource, PageOutcome};
use crate::domain::product::Source;
use crate::infrastructure::config::{CrawlTarget, MercadoLivreConfig, mercadolivre};
use crate::infrastructure::http_client::HtmlFetcher;
use crate::infrastructure::parsing::ListingExtractor;

pub struct StaticSource {
    fetcher: Arc<dyn HtmlFetcher>,
    extractor: ListingExtractor,
    page_stride: u32,
}

impl StaticSource {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>, config: &MercadoLivreConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            fetcher,
            extractor: ListingExtractor::new(&config.selectors, &config.origin)?,
            page_stride: config.page_stride,
        })
    }
}

#[async_trait]
impl ListingSource for StaticSource {
    fn source(&self) -> Source {
        Source::MercadoLivre
    }

    async fn fetch_page(&mut self, target: &CrawlTarget, page: u32, cancel: &CancellationToken) -> PageOutcome {
        let url = mercadolivre::page_url(&target.url, page, self.page_stride);
        info!("[{}] Fetching page {}: {}", target.label, page, url);

        // Cancellation also aborts this request mid-flight; the controller then reports Cancelled
        match self.fetcher.fetch_html(&url, cancel).await {
            Ok(html) => {
                let candidates = self.extractor.extract_str(&html);
                debug!("[{}] Page {} yielded {} candidates", target.label, page, candidates.len());
                PageOutcome::Loaded(ListingPage {
                    candidates,
                    page_count: None,
                })
            }
            Err(e) => {
                warn!("[{}] Page {} failed: {}", target.label, page, e);
                PageOutcome::Failed(e.to_string())
            }
        }
    }
}
