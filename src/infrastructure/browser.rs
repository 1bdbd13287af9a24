//! Headless browser sessions for JavaScript-rendered listings
//!
//! A [`ChromiumSession`] owns one browser process and one tab. It is handed
//! to a single crawl and driven through `&mut self`, so there is never more
//! than one navigation in flight. `close` is the normal release path; `Drop`
//! spawns the same cleanup when a crawl bails out early.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::infrastructure::config::KabumConfig;

/// Interval between readiness probes while waiting for a selector
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("browser protocol error: {0}")]
    Cdp(#[from] CdpError),

    #[error("browser session already closed")]
    Closed,
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// One exclusively-owned rendering tab
#[async_trait]
pub trait PageRenderer: Send {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// Wait up to `timeout` for `css` to match; `Ok(false)` on timeout
    async fn wait_for_selector(&mut self, css: &str, timeout: Duration) -> BrowserResult<bool>;

    /// Serialized DOM of the current page
    async fn content(&mut self) -> BrowserResult<String>;

    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

/// Opens rendering sessions; one per crawl
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn open(&self) -> BrowserResult<Box<dyn PageRenderer>>;
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub user_agent: String,
}

impl From<&KabumConfig> for BrowserOptions {
    fn from(config: &KabumConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.chrome_executable.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Launches local Chromium instances
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl RendererFactory for ChromiumLauncher {
    async fn open(&self) -> BrowserResult<Box<dyn PageRenderer>> {
        Ok(Box::new(ChromiumSession::launch(&self.options).await?))
    }
}

pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    runtime: tokio::runtime::Handle,
}

impl ChromiumSession {
    pub async fn launch(options: &BrowserOptions) -> BrowserResult<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--window-size=1920,1080")
            .arg(format!("--user-agent={}", options.user_agent));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("Browser handler event error: {}", e);
                }
            }
        });

        let mut session = Self {
            browser: Some(browser),
            page: None,
            handler: Some(handler),
            runtime: tokio::runtime::Handle::current(),
        };
        let page = session.browser()?.new_page("about:blank").await?;
        session.page = Some(page);
        debug!(headless = options.headless, "Browser session started");
        Ok(session)
    }

    fn browser(&self) -> BrowserResult<&Browser> {
        self.browser.as_ref().ok_or(BrowserError::Closed)
    }

    fn page(&self) -> BrowserResult<&Page> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }
}

#[async_trait]
impl PageRenderer for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let page = self.page()?;
        match tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(url)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(BrowserError::NavigationTimeout {
                url: url.to_string(),
                timeout: NAVIGATION_TIMEOUT,
            }),
        }
    }

    async fn wait_for_selector(&mut self, css: &str, timeout: Duration) -> BrowserResult<bool> {
        let page = self.page()?;
        let probe = async {
            loop {
                if page.find_element(css).await.is_ok() {
                    return;
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };
        Ok(tokio::time::timeout(timeout, probe).await.is_ok())
    }

    async fn content(&mut self) -> BrowserResult<String> {
        Ok(self.page()?.content().await?)
    }

    async fn close(mut self: Box<Self>) -> BrowserResult<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close browser tab: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            browser.close().await?;
            if let Err(e) = browser.wait().await {
                warn!("Browser process did not exit cleanly: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        debug!("Browser session closed");
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        let page = self.page.take();
        let browser = self.browser.take();
        let handler = self.handler.take();
        if page.is_none() && browser.is_none() {
            return;
        }

        self.runtime.spawn(async move {
            if let Some(page) = page {
                let _ = page.close().await;
            }
            if let Some(mut browser) = browser {
                if browser.close().await.is_err() {
                    let _ = browser.kill().await;
                }
                let _ = browser.wait().await;
            }
            if let Some(handler) = handler {
                handler.abort();
            }
            trace!("Browser session cleaned up on drop");
        });
    }
}
