use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for job-crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub budgets: Budgets,
    #[serde(default)]
    pub details: DetailSettings,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    #[serde(default, rename = "platform")]
    pub platforms: Vec<PlatformConfig>,
    #[serde(default, rename = "search")]
    pub searches: Vec<SearchEntry>,
}

impl Config {
    /// Looks up a platform capability record by name
    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.name == name)
    }
}

/// Database location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// Extra `Accept-Language` header sent with every request
    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Per-search discovery budgets and the run wall-clock budget
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Budgets {
    /// Maximum pages fetched for one search definition (default 50)
    #[serde(rename = "max-pages-per-search")]
    pub max_pages_per_search: u32,

    /// Maximum postings retained for one search definition (default 2000)
    #[serde(rename = "max-jobs-discovered-per-search")]
    pub max_jobs_discovered_per_search: u32,

    /// Consecutive pages with no new postings before discovery stops (default 3)
    #[serde(rename = "duplicate-page-limit")]
    pub duplicate_page_limit: u32,

    /// Consecutive blocked responses that trip the circuit breaker (default 3)
    #[serde(rename = "circuit-breaker-blocks")]
    pub circuit_breaker_blocks: u32,

    /// Wall-clock budget for discovery plus details (default 7200s)
    #[serde(rename = "max-run-seconds")]
    pub max_run_seconds: u64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_pages_per_search: 50,
            max_jobs_discovered_per_search: 2000,
            duplicate_page_limit: 3,
            circuit_breaker_blocks: 3,
            max_run_seconds: 7200,
        }
    }
}

/// Details phase settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetailSettings {
    pub enabled: bool,

    /// Maximum postings whose details are fetched in one run (default 200)
    #[serde(rename = "max-job-details-per-run")]
    pub max_job_details_per_run: u32,

    /// Only postings seen within this many days are selected (default 60)
    #[serde(rename = "last-seen-window-days")]
    pub last_seen_window_days: i64,

    /// Existing details older than this are refreshed (default 7)
    #[serde(rename = "staleness-days")]
    pub staleness_days: i64,

    /// Blocked detail attempts are retried after this many hours (default 24)
    #[serde(rename = "blocked-retry-hours")]
    pub blocked_retry_hours: i64,
}

impl Default for DetailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_job_details_per_run: 200,
            last_seen_window_days: 60,
            staleness_days: 7,
            blocked_retry_hours: 24,
        }
    }
}

/// How the recency filter for discovery is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowPolicyMode {
    /// Choose the filter from search run history
    Auto,
    /// Use the definition's facets as-is
    Static,
}

/// Adaptive window policy settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub policy: WindowPolicyMode,

    /// A success newer than this selects the recent filter (default 30)
    #[serde(rename = "recent-hours")]
    pub recent_hours: f64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            policy: WindowPolicyMode::Auto,
            recent_hours: 30.0,
        }
    }
}

/// Lifecycle maintainer settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Postings unseen for this many days are soft-expired (default 60)
    #[serde(rename = "stale-after-days")]
    pub stale_after_days: i64,

    /// Postings unseen for this many days are deleted (default 120)
    #[serde(rename = "hard-delete-after-days")]
    pub hard_delete_after_days: i64,

    /// The latest successful crawl must be younger than this (default 36)
    #[serde(rename = "max-crawl-age-hours")]
    pub max_crawl_age_hours: i64,

    /// Count candidates without mutating anything
    #[serde(rename = "dry-run")]
    pub dry_run: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            stale_after_days: 60,
            hard_delete_after_days: 120,
            max_crawl_age_hours: 36,
            dry_run: false,
        }
    }
}

/// How a fetch should be rendered by the fetch adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    /// Plain HTTP GET
    #[default]
    Plain,
    /// Requires a browser-rendered page
    Browser,
}

/// Pagination style of a platform's search results
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "style", rename_all = "kebab-case")]
pub enum Pagination {
    /// `param` carries a result offset advancing by `page-size`
    Offset {
        param: String,
        #[serde(rename = "page-size")]
        page_size: u32,
    },
    /// `param` carries a page number starting at `first`
    PageNumber {
        param: String,
        #[serde(default = "default_first_page")]
        first: u32,
    },
}

impl Pagination {
    /// Returns the query parameter name and value for a zero-based page index
    pub fn query_pair(&self, page_index: u32) -> (&str, String) {
        match self {
            Self::Offset { param, page_size } => (param, (page_index * page_size).to_string()),
            Self::PageNumber { param, first } => (param, (first + page_index).to_string()),
        }
    }
}

/// Recency filter parameter and codes of a platform
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformWindow {
    /// Query parameter (and facet key) carrying the filter code
    pub param: String,

    /// Code for roughly the last 24 hours
    #[serde(rename = "recent-code")]
    pub recent_code: String,

    /// Code for roughly the last 7 days
    #[serde(rename = "fallback-code")]
    pub fallback_code: String,
}

/// Capability record of one platform
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub name: String,

    /// Base URL of the search results page
    #[serde(rename = "search-url")]
    pub search_url: String,

    #[serde(rename = "keywords-param", default = "default_keywords_param")]
    pub keywords_param: String,

    #[serde(rename = "location-param", default)]
    pub location_param: Option<String>,

    pub pagination: Pagination,

    pub window: PlatformWindow,

    /// Lowercase body substrings that identify an anti-bot page
    #[serde(rename = "block-fingerprints", default = "default_block_fingerprints")]
    pub block_fingerprints: Vec<String>,

    /// Pause between consecutive fetches (milliseconds)
    #[serde(rename = "request-delay-ms", default)]
    pub request_delay_ms: u64,

    #[serde(rename = "render-mode", default)]
    pub render_mode: RenderMode,

    pub selectors: SelectorConfig,
}

/// CSS selectors driving the built-in page extractor
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// One element per posting card
    pub item: String,

    #[serde(rename = "job-id-attribute", default = "default_id_attribute")]
    pub job_id_attribute: String,

    /// Prefix stripped from the id attribute (e.g. "job-item-")
    #[serde(rename = "job-id-prefix", default)]
    pub job_id_prefix: Option<String>,

    /// Link element inside the card
    #[serde(rename = "job-url", default = "default_job_url_selector")]
    pub job_url: String,

    #[serde(rename = "job-url-attribute", default = "default_href")]
    pub job_url_attribute: String,

    /// Element carrying the result counters as attributes
    #[serde(default)]
    pub counters: Option<String>,

    #[serde(rename = "counter-attributes", default)]
    pub counter_attributes: CounterAttributes,

    /// Headings scanned for diagnostic section markers
    #[serde(default)]
    pub markers: Option<String>,

    /// Lowercase substrings that make a heading a marker
    #[serde(rename = "marker-patterns", default)]
    pub marker_patterns: Vec<String>,

    pub detail: DetailSelectors,
}

/// Attribute names of the result counter element
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CounterAttributes {
    pub total: String,
    pub main: String,
    #[serde(rename = "main-displayed")]
    pub main_displayed: String,
    pub regional: String,
    pub semantic: String,
}

impl Default for CounterAttributes {
    fn default() -> Self {
        Self {
            total: "data-results-total".to_string(),
            main: "data-results-main".to_string(),
            main_displayed: "data-results-main-displayed".to_string(),
            regional: "data-results-regional".to_string(),
            semantic: "data-results-semantic".to_string(),
        }
    }
}

/// Selectors for the detail page fields
#[derive(Debug, Clone, Deserialize)]
pub struct DetailSelectors {
    /// Required; a detail page without a title is a parse failure
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "posted-at", default)]
    pub posted_at: Option<String>,
}

/// A search entry; expands to one definition per (location, keyword) pair
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntry {
    pub name: String,
    pub platform: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub facets: BTreeMap<String, String>,
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_first_page() -> u32 {
    1
}

fn default_keywords_param() -> String {
    "keywords".to_string()
}

fn default_id_attribute() -> String {
    "id".to_string()
}

fn default_job_url_selector() -> String {
    "a".to_string()
}

fn default_href() -> String {
    "href".to_string()
}

fn default_true() -> bool {
    true
}

/// Body fingerprints shared by the common anti-bot interstitials
pub fn default_block_fingerprints() -> Vec<String> {
    [
        "access denied",
        "verify you are a human",
        "security verification",
        "unusual activity",
        "captcha",
        "temporarily blocked",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_defaults() {
        let b = Budgets::default();
        assert_eq!(b.max_pages_per_search, 50);
        assert_eq!(b.max_jobs_discovered_per_search, 2000);
        assert_eq!(b.duplicate_page_limit, 3);
        assert_eq!(b.circuit_breaker_blocks, 3);
    }

    #[test]
    fn test_lifecycle_defaults() {
        let l = LifecycleSettings::default();
        assert_eq!(l.stale_after_days, 60);
        assert_eq!(l.hard_delete_after_days, 120);
        assert_eq!(l.max_crawl_age_hours, 36);
        assert!(!l.dry_run);
    }

    #[test]
    fn test_pagination_query_pair() {
        let offset = Pagination::Offset {
            param: "start".to_string(),
            page_size: 25,
        };
        assert_eq!(offset.query_pair(0), ("start", "0".to_string()));
        assert_eq!(offset.query_pair(2), ("start", "50".to_string()));

        let numbered = Pagination::PageNumber {
            param: "page".to_string(),
            first: 1,
        };
        assert_eq!(numbered.query_pair(0), ("page", "1".to_string()));
        assert_eq!(numbered.query_pair(4), ("page", "5".to_string()));
    }
}
