//! Fetch adapter
//!
//! The crawler never talks to the network directly. It goes through the
//! [`Fetcher`] trait so that rendering strategy and transport stay a
//! platform concern. [`HttpFetcher`] is the reqwest-backed implementation.

use crate::config::{RenderMode, UserAgentConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Final URL after redirects
    pub final_url: String,
    /// Page body content
    pub body: String,
    /// Set by the adapter when transport-level signals already reveal an
    /// anti-bot page (e.g. a redirect to a checkpoint)
    pub blocked_hint: bool,
}

/// Errors raised by a fetch adapter
///
/// Both variants are transient; HTTP error statuses are responses, not
/// errors, and are classified by the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} failed: {message}")]
    Transient { url: String, message: String },
}

/// Fetches a URL and returns its status code and body
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, mode: RenderMode) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version
    let user_agent = format!("{}/{}", config.crawler_name, config.crawler_version);

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
    );
    if let Ok(value) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// URL path fragments that only appear on anti-bot interstitials
const CHECKPOINT_PATHS: &[&str] = &["/checkpoint", "/captcha", "/authwall"];

/// reqwest-backed fetch adapter
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, mode: RenderMode) -> Result<FetchResponse, FetchError> {
        if mode == RenderMode::Browser {
            // No browser backend is wired in; the plain response is the best
            // available approximation.
            tracing::debug!("Browser rendering requested for {}, using plain GET", url);
        }

        let response = self.client.get(url).send().await.map_err(|e| classify(url, e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let blocked_hint = {
            let path = response.url().path().to_ascii_lowercase();
            CHECKPOINT_PATHS.iter().any(|p| path.starts_with(p))
        };

        let body = response.text().await.map_err(|e| classify(url, e))?;

        Ok(FetchResponse {
            status_code,
            final_url,
            body,
            blocked_hint,
        })
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transient {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
