//! Crawling layer
//!
//! Source adapters fetch one listing page at a time; the pagination
//! controller drives an adapter across pages, normalizes what it returns and
//! hands each page to the upsert engine as one batch.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::product::{RawCandidate, Source};
use crate::domain::repositories::StorageError;
use crate::infrastructure::browser::BrowserError;
use crate::infrastructure::config::CrawlTarget;
use crate::infrastructure::http_client::FetchError;
use crate::infrastructure::parsing::ParsingError;

pub mod pagination;
pub mod rendered;
pub mod static_listing;

pub use pagination::{ItemBudget, PageDelays, PaginationController, StopReason, TargetReport};
pub use rendered::RenderedSource;
pub use static_listing::StaticSource;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("browser session failed: {0}")]
    Browser(#[from] BrowserError),

    #[error("HTTP client setup failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("selector configuration is invalid: {0}")]
    Parsing(#[from] ParsingError),

    #[error("failed to persist page {page} of '{target}': {source}")]
    Persistence {
        target: String,
        page: u32,
        #[source]
        source: StorageError,
    },
}

/// One successfully loaded listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub candidates: Vec<RawCandidate>,
    /// Page count advertised by the page itself, when the source shows one
    pub page_count: Option<u32>,
}

/// Result of fetching one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Loaded(ListingPage),
    /// Timed out or otherwise unreadable; counts against the page budget only
    Skipped(String),
    /// The source refused or failed the request; ends the current target
    Failed(String),
}

/// Fetches listing pages of one source
#[async_trait]
pub trait ListingSource: Send {
    fn source(&self) -> Source;

    async fn fetch_page(&mut self, target: &CrawlTarget, page: u32, cancel: &CancellationToken) -> PageOutcome;

    /// Whether [`ListingSource::collect_gallery`] does anything
    fn supports_gallery(&self) -> bool {
        false
    }

    /// Image gallery of a product detail page; failures yield an empty list
    async fn collect_gallery(&mut self, _link: &str) -> Vec<String> {
        Vec::new()
    }

    /// Release whatever session the adapter holds
    async fn shutdown(&mut self) {}
}
