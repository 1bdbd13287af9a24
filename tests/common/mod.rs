//! Scripted collaborators shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hunter_crawler_lib::infrastructure::browser::{BrowserError, BrowserResult, PageRenderer, RendererFactory};
use hunter_crawler_lib::infrastructure::config::{AppConfig, CrawlTarget, DelayRange, kabum, mercadolivre};
use hunter_crawler_lib::infrastructure::http_client::{FetchError, FetchResult, HtmlFetcher};

pub const KABUM_CATEGORY: &str = "https://www.kabum.com.br/hardware/monitores";
pub const ML_TERM: &str = "https://lista.mercadolivre.com.br/teclado";

/// Three valid product cards and one without a price
pub const KABUM_LISTING: &str = r#"<html><body>
  <div id="listingCount"><b>4</b> produtos</div>
  <article class="productCard">
    <a href="/produto/101/monitor-lg"><img src="https://images.kabum.com.br/101.jpg"></a>
    <span class="nameCard">Monitor Gamer LG UltraGear 27"</span>
    <span class="priceCard">R$ 1.299,90</span>
  </article>
  <article class="productCard">
    <a href="/produto/102/monitor-aoc"><img src="https://images.kabum.com.br/102.jpg"></a>
    <span class="nameCard">Monitor AOC Hero 24"</span>
    <span class="priceCard">R$ 899,00</span>
  </article>
  <article class="productCard">
    <a href="/produto/103/monitor-samsung"><img src="https://images.kabum.com.br/103.jpg"></a>
    <span class="nameCard">Monitor Samsung Odyssey Série G5</span>
    <span class="priceCard">R$ 1.599,00</span>
  </article>
  <article class="productCard">
    <a href="/produto/104/monitor-sem-preco"></a>
    <span class="nameCard">Monitor Indisponível</span>
  </article>
</body></html>"#;

pub fn kabum_page_url(config: &AppConfig, page: u32) -> String {
    kabum::page_url(KABUM_CATEGORY, page, config.kabum.page_size)
}

pub fn ml_page_url(config: &AppConfig, page: u32) -> String {
    mercadolivre::page_url(ML_TERM, page, config.mercadolivre.page_stride)
}

/// Mercado Livre results page with `(name, link, price)` rows
pub fn ml_listing(rows: &[(&str, &str, &str)]) -> String {
    let items: String = rows
        .iter()
        .map(|(name, link, price)| {
            format!(
                r#"<li class="ui-search-layout__item">
                     <a class="ui-search-link" href="{link}">{name}</a>
                     <img src="{link}.webp">
                     <span class="andes-money-amount__fraction">{price}</span>
                   </li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ol class="ui-search-layout">{items}</ol></body></html>"#)
}

/// Defaults with no delays, one target per source and both sources enabled
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.kabum.targets = vec![CrawlTarget::new("monitor", KABUM_CATEGORY)];
    config.kabum.page_delay = DelayRange::none();
    config.kabum.detail_delay = DelayRange::none();
    config.kabum.collect_gallery = false;
    config.kabum.max_pages = 1;
    config.mercadolivre.targets = vec![CrawlTarget::new("teclado", ML_TERM)];
    config.mercadolivre.page_delay = DelayRange::none();
    config.mercadolivre.max_pages = 2;
    config
}

/// Serves canned markup per URL; unknown URLs fail navigation
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    pages: Arc<HashMap<String, String>>,
    slow: Arc<HashSet<String>>,
    visited: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBrowser {
    pub fn new(pages: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            ..Self::default()
        }
    }

    /// URLs whose product cards never render
    pub fn with_slow(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.slow = Arc::new(urls.into_iter().collect());
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl RendererFactory for ScriptedBrowser {
    async fn open(&self) -> BrowserResult<Box<dyn PageRenderer>> {
        Ok(Box::new(ScriptedTab {
            browser: self.clone(),
            current: None,
        }))
    }
}

struct ScriptedTab {
    browser: ScriptedBrowser,
    current: Option<String>,
}

#[async_trait]
impl PageRenderer for ScriptedTab {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.browser.visited.lock().unwrap().push(url.to_string());
        if !self.browser.pages.contains_key(url) {
            return Err(BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout: Duration::from_secs(45),
            });
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&mut self, _css: &str, _timeout: Duration) -> BrowserResult<bool> {
        let current = self.current.as_ref().ok_or(BrowserError::Closed)?;
        Ok(!self.browser.slow.contains(current))
    }

    async fn content(&mut self) -> BrowserResult<String> {
        let current = self.current.as_ref().ok_or(BrowserError::Closed)?;
        self.browser.pages.get(current).cloned().ok_or(BrowserError::Closed)
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        Ok(())
    }
}

/// A machine without a usable Chrome
pub struct NoBrowser;

#[async_trait]
impl RendererFactory for NoBrowser {
    async fn open(&self) -> BrowserResult<Box<dyn PageRenderer>> {
        Err(BrowserError::Launch("chrome executable not found".to_string()))
    }
}

/// Serves canned bodies per URL; unknown URLs answer 404-like failures
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    bodies: Arc<Mutex<HashMap<String, String>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn new(bodies: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            bodies: Arc::new(Mutex::new(bodies.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn serve(&self, url: String, body: String) {
        self.bodies.lock().unwrap().insert(url, body);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl HtmlFetcher for ScriptedFetcher {
    async fn fetch_html(&self, url: &str, cancel: &CancellationToken) -> FetchResult<String> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { url: url.to_string() });
        }
        self.requested.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Config(format!("no scripted body for {url}")))
    }
}
