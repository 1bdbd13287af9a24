//! HTTP client for static listing pages with rate limiting and error handling
//!
//! One client is shared by every page of a source. Requests wait on a
//! `governor` quota, carry a browser-like identity, and are bounded by a
//! timeout. There are no retries: a failed page goes back to the caller,
//! which treats it as empty.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::infrastructure::config::MercadoLivreConfig;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid HTTP client configuration: {0}")]
    Config(String),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Source of raw HTML for static pages
#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str, cancel: &CancellationToken) -> FetchResult<String>;
}

/// HTTP client configuration for crawling
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout: Duration,
    pub max_requests_per_second: u32,
}

impl From<&MercadoLivreConfig> for HttpClientConfig {
    fn from(config: &MercadoLivreConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            timeout: config.request_timeout(),
            max_requests_per_second: config.max_requests_per_second,
        }
    }
}

/// reqwest client with a request-rate quota
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> FetchResult<Self> {
        let header = |value: &str, name: &str| {
            HeaderValue::from_str(value).map_err(|e| FetchError::Config(format!("invalid {name} header: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header(&config.user_agent, "User-Agent")?);
        headers.insert(ACCEPT_LANGUAGE, header(&config.accept_language, "Accept-Language")?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Config(e.to_string()))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second)
            .ok_or_else(|| FetchError::Config("rate limit must be greater than 0".to_string()))?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

#[async_trait]
impl HtmlFetcher for HttpClient {
    async fn fetch_html(&self, url: &str, cancel: &CancellationToken) -> FetchResult<String> {
        let cancelled = || FetchError::Cancelled { url: url.to_string() };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = self.rate_limiter.until_ready() => {},
        }

        debug!("Fetching {}", url);
        // An in-flight request is abandoned on cancellation; nothing of the page has been written yet
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            result = self.client.get(url).send() => result.map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            warn!("{} answered {}", url, status);
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            result = response.text() => result.map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            })?,
        };

        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}
