//! Shared fixtures for crawler unit tests

use crate::config::{
    default_block_fingerprints, Budgets, CounterAttributes, DetailSelectors, Pagination,
    PlatformConfig, PlatformWindow, RenderMode, SelectorConfig,
};
use crate::crawler::{FetchError, FetchResponse, Fetcher};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub(crate) type Scripted = Result<FetchResponse, FetchError>;

/// Fetcher that replays canned responses in order
///
/// Once the script runs out every request gets an empty result page.
pub(crate) struct ScriptedFetcher {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _mode: RenderMode) -> Result<FetchResponse, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| ok(&list_html(&[])))
    }
}

pub(crate) fn response(status_code: u16, body: &str) -> Scripted {
    Ok(FetchResponse {
        status_code,
        final_url: "https://jobs.example.com/".to_string(),
        body: body.to_string(),
        blocked_hint: false,
    })
}

pub(crate) fn ok(body: &str) -> Scripted {
    response(200, body)
}

pub(crate) fn blocked() -> Scripted {
    response(429, "Too many requests")
}

pub(crate) fn timeout() -> Scripted {
    Err(FetchError::Timeout {
        url: "https://jobs.example.com/".to_string(),
    })
}

/// A result page listing the given ids as the main result set
pub(crate) fn list_html(ids: &[u32]) -> String {
    let mut html = format!(
        "<html><body><div data-results-total=\"{n}\" data-results-main-displayed=\"{n}\"></div>",
        n = ids.len()
    );
    for id in ids {
        html.push_str(&format!(
            "<article class=\"job\" id=\"job-item-{id}\"><a href=\"/jobs/{id}\">Job {id}</a></article>"
        ));
    }
    html.push_str("</body></html>");
    html
}

pub(crate) fn detail_html(title: &str) -> String {
    format!("<html><body><h1>{title}</h1><span class=\"company\">Acme</span></body></html>")
}

pub(crate) fn test_platform() -> PlatformConfig {
    PlatformConfig {
        name: "boardone".to_string(),
        search_url: "https://jobs.example.com/search".to_string(),
        keywords_param: "q".to_string(),
        location_param: Some("where".to_string()),
        pagination: Pagination::PageNumber {
            param: "page".to_string(),
            first: 1,
        },
        window: PlatformWindow {
            param: "age".to_string(),
            recent_code: "1".to_string(),
            fallback_code: "7".to_string(),
        },
        block_fingerprints: default_block_fingerprints(),
        request_delay_ms: 0,
        render_mode: RenderMode::Plain,
        selectors: SelectorConfig {
            item: "article.job".to_string(),
            job_id_attribute: "id".to_string(),
            job_id_prefix: Some("job-item-".to_string()),
            job_url: "a".to_string(),
            job_url_attribute: "href".to_string(),
            counters: Some("[data-results-total]".to_string()),
            counter_attributes: CounterAttributes::default(),
            markers: None,
            marker_patterns: Vec::new(),
            detail: DetailSelectors {
                title: "h1".to_string(),
                company: Some(".company".to_string()),
                location: None,
                description: None,
                posted_at: None,
            },
        },
    }
}

pub(crate) fn test_budgets() -> Budgets {
    Budgets::default()
}
