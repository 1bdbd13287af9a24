//! Infrastructure layer: configuration, logging, storage, fetching and parsing
//!
//! Everything here talks to the outside world (SQLite, HTTP, a browser, the
//! filesystem) or turns raw markup into domain candidates.

pub mod browser;
pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod memory_catalog;
pub mod parsing;

// Re-export commonly used items
pub use browser::{BrowserError, BrowserOptions, ChromiumLauncher, ChromiumSession, PageRenderer, RendererFactory};
pub use catalog_repository::SqliteCatalogStore;
pub use config::{AppConfig, ConfigError};
pub use database_connection::DatabaseConnection;
pub use http_client::{FetchError, HtmlFetcher, HttpClient, HttpClientConfig};
pub use logging::{init_logging, log_system_info};
pub use memory_catalog::InMemoryCatalogStore;
pub use parsing::{GalleryCollector, ListingExtractor, ParsingError};
