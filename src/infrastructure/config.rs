//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. compiled defaults (`AppConfig::default()`)
//! 2. an optional TOML file (`--config`, or `hunter.toml` in the working directory)
//! 3. `HUNTER__SECTION__KEY` environment variables

#![allow(clippy::derivable_impls)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::infrastructure::parsing::{GallerySelectors, ListingSelectors};

/// File picked up automatically when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "hunter.toml";

/// Environment variable prefix (`HUNTER__KABUM__MAX_PAGES=5`)
pub const ENV_PREFIX: &str = "HUNTER";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub crawl: CrawlLimits,
    pub kabum: KabumConfig,
    pub mercadolivre: MercadoLivreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs in the log file
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for log files; defaults to `<data dir>/logs`
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
        }
    }
}

/// Run-wide limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlLimits {
    /// Global cap on collected items across every source
    pub max_items_total: usize,

    /// Crawl independent sources concurrently
    pub parallel_sources: bool,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_items_total: defaults::MAX_ITEMS_TOTAL,
            parallel_sources: false,
        }
    }
}

/// One category (Kabum) or search term (Mercado Livre) to crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub label: String,
    pub url: String,
}

impl CrawlTarget {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Inclusive range for randomized courtesy delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Pick a delay uniformly inside the range
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(fastrand::u64(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KabumConfig {
    pub enabled: bool,
    /// Origin used to resolve relative links and images
    pub origin: String,
    pub targets: Vec<CrawlTarget>,
    pub max_pages: u32,
    pub page_size: u32,
    /// Bounded wait for the product cards to render
    pub render_timeout_secs: u64,
    pub page_delay: DelayRange,
    pub detail_delay: DelayRange,
    /// Visit every product page to collect its image gallery
    pub collect_gallery: bool,
    pub user_agent: String,
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
    pub selectors: ListingSelectors,
    pub gallery: GallerySelectors,
}

impl Default for KabumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: kabum::ORIGIN.to_string(),
            targets: vec![CrawlTarget::new("monitor", kabum::MONITORS_URL)],
            max_pages: kabum::MAX_PAGES_PER_CATEGORY,
            page_size: kabum::PAGE_SIZE,
            render_timeout_secs: kabum::RENDER_TIMEOUT_SECS,
            page_delay: DelayRange::new(1000, 1500),
            detail_delay: DelayRange::new(1500, 2500),
            collect_gallery: true,
            user_agent: defaults::BROWSER_USER_AGENT.to_string(),
            chrome_executable: None,
            headless: true,
            selectors: ListingSelectors::kabum(),
            gallery: GallerySelectors::default(),
        }
    }
}

impl KabumConfig {
    pub const fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MercadoLivreConfig {
    pub enabled: bool,
    pub origin: String,
    pub targets: Vec<CrawlTarget>,
    pub max_pages: u32,
    /// Listing offset step between pages (`_Desde_{offset}`)
    pub page_stride: u32,
    pub request_timeout_secs: u64,
    pub max_requests_per_second: u32,
    pub page_delay: DelayRange,
    pub user_agent: String,
    pub accept_language: String,
    pub selectors: ListingSelectors,
}

impl Default for MercadoLivreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: mercadolivre::ORIGIN.to_string(),
            targets: vec![CrawlTarget::new("teclado", mercadolivre::search_url("teclado"))],
            max_pages: mercadolivre::MAX_PAGES_PER_TERM,
            page_stride: mercadolivre::PAGE_STRIDE,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            page_delay: DelayRange::new(2000, 2000),
            user_agent: defaults::BROWSER_USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            selectors: ListingSelectors::mercadolivre(),
        }
    }
}

impl MercadoLivreConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    /// Load defaults, then `path` (or `hunter.toml` if present), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                builder = builder.add_source(
                    File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
                );
            }
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults (no environment)
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.crawl.max_items_total == 0 {
            return Err(invalid("crawl.max_items_total", "must be greater than 0"));
        }
        if self.kabum.max_pages == 0 {
            return Err(invalid("kabum.max_pages", "must be greater than 0"));
        }
        if self.kabum.page_size == 0 {
            return Err(invalid("kabum.page_size", "must be greater than 0"));
        }
        if self.mercadolivre.max_pages == 0 {
            return Err(invalid("mercadolivre.max_pages", "must be greater than 0"));
        }
        if self.mercadolivre.max_requests_per_second == 0 {
            return Err(invalid("mercadolivre.max_requests_per_second", "must be greater than 0"));
        }
        for (field, range) in [
            ("kabum.page_delay", self.kabum.page_delay),
            ("kabum.detail_delay", self.kabum.detail_delay),
            ("mercadolivre.page_delay", self.mercadolivre.page_delay),
        ] {
            if range.min_ms > range.max_ms {
                return Err(invalid(field, "min_ms must not exceed max_ms"));
            }
        }
        Ok(())
    }
}

/// Application data directory (`~/.local/share/hunter` on Linux)
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hunter")
}

fn default_database_url() -> String {
    format!("sqlite:{}", app_data_dir().join("hunter.db").display())
}

/// Kabum site constants
pub mod kabum {
    pub const ORIGIN: &str = "https://www.kabum.com.br";

    pub const MONITORS_URL: &str = "https://www.kabum.com.br/hardware/monitores";

    pub const MAX_PAGES_PER_CATEGORY: u32 = 20;

    /// Products per listing page (`page_size` query parameter)
    pub const PAGE_SIZE: u32 = 20;

    pub const RENDER_TIMEOUT_SECS: u64 = 12;

    /// Marker that the product grid has been rendered
    pub const READY_SELECTOR: &str = "article.productCard";

    /// Element holding the total product count of a category
    pub const LISTING_COUNT_SELECTOR: &str = "div#listingCount";

    /// Listing page URL for a category
    pub fn page_url(category_url: &str, page: u32, page_size: u32) -> String {
        format!(
            "{category_url}?page_number={page}&page_size={page_size}&facet_filters=&sort=most_searched"
        )
    }
}

/// Mercado Livre site constants
pub mod mercadolivre {
    pub const ORIGIN: &str = "https://lista.mercadolivre.com.br";

    pub const MAX_PAGES_PER_TERM: u32 = 10;

    pub const PAGE_STRIDE: u32 = 50;

    pub fn search_url(term: &str) -> String {
        format!("{ORIGIN}/{term}")
    }

    /// Listing page URL for a search term; pages start at 1
    pub fn page_url(term_url: &str, page: u32, stride: u32) -> String {
        let offset = page.saturating_sub(1).saturating_mul(stride);
        format!("{term_url}_Desde_{offset}")
    }
}

/// Default configuration values
pub mod defaults {
    pub const MAX_ITEMS_TOTAL: usize = 900;

    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 20;

    pub const MAX_REQUESTS_PER_SECOND: u32 = 1;

    pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    pub const ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7";

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_JSON_FORMAT: bool = false;

    pub const LOG_CONSOLE_OUTPUT: bool = true;

    pub const LOG_FILE_OUTPUT: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kabum.render_timeout(), Duration::from_secs(12));
        assert_eq!(config.kabum.targets[0].label, "monitor");
        assert_eq!(config.mercadolivre.targets[0].url, "https://lista.mercadolivre.com.br/teclado");
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = AppConfig::from_toml_str(
            r#"
            [crawl]
            max_items_total = 25

            [kabum]
            max_pages = 2
            targets = [{ label = "teclado", url = "https://www.kabum.com.br/perifericos/teclados" }]

            [mercadolivre]
            enabled = false
            page_delay = { min_ms = 10, max_ms = 20 }
            "#,
        )
        .unwrap();

        assert_eq!(config.crawl.max_items_total, 25);
        assert_eq!(config.kabum.max_pages, 2);
        assert_eq!(config.kabum.targets.len(), 1);
        assert_eq!(config.kabum.page_size, kabum::PAGE_SIZE);
        assert!(!config.mercadolivre.enabled);
        assert_eq!(config.mercadolivre.page_delay, DelayRange::new(10, 20));
    }

    #[test]
    fn rejects_inverted_delay_range() {
        let result = AppConfig::from_toml_str(
            r#"
            [kabum]
            detail_delay = { min_ms = 500, max_ms = 100 }
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "kabum.detail_delay"));
    }

    #[test]
    fn rejects_zero_page_limit() {
        let result = AppConfig::from_toml_str("[mercadolivre]\nmax_pages = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn delay_samples_stay_in_range() {
        let range = DelayRange::new(5, 9);
        for _ in 0..100 {
            let sampled = range.sample().as_millis();
            assert!((5..=9).contains(&sampled));
        }
        assert_eq!(DelayRange::none().sample(), Duration::ZERO);
    }

    #[test]
    fn page_urls_follow_site_conventions() {
        assert_eq!(
            kabum::page_url(kabum::MONITORS_URL, 3, 20),
            "https://www.kabum.com.br/hardware/monitores?page_number=3&page_size=20&facet_filters=&sort=most_searched"
        );
        assert_eq!(
            mercadolivre::page_url("https://lista.mercadolivre.com.br/teclado", 1, 50),
            "https://lista.mercadolivre.com.br/teclado_Desde_0"
        );
        assert_eq!(
            mercadolivre::page_url("https://lista.mercadolivre.com.br/teclado", 3, 50),
            "https://lista.mercadolivre.com.br/teclado_Desde_100"
        );
    }
}
