//! Paginated discovery of one search definition
//!
//! The engine walks result pages until one of its stop conditions fires:
//!
//! 1. `circuit_breaker_blocks` consecutive blocked (or failed) fetches
//! 2. A page whose main result set is empty
//! 3. `duplicate_page_limit` consecutive pages without new postings
//! 4. The page or job budget
//!
//! Conditions are checked after every page in that order. The run deadline
//! is checked before every fetch.

use crate::config::{Budgets, PlatformConfig};
use crate::crawler::block::is_blocked;
use crate::crawler::{Fetcher, PageExtractor, ResultCounters};
use crate::storage::SearchDefinition;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use url::Url;

/// Why discovery of a search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    CircuitBreaker,
    NoMainResults,
    DuplicatePages,
    PageBudget,
    JobBudget,
    Deadline,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitBreaker => "circuit_breaker",
            Self::NoMainResults => "no_main_results",
            Self::DuplicatePages => "duplicate_pages",
            Self::PageBudget => "page_budget",
            Self::JobBudget => "job_budget",
            Self::Deadline => "deadline",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one page fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct PageFetchEvent {
    /// 1-based page number within the search
    pub page: u32,
    pub url: String,
    pub status_code: Option<u16>,
    pub blocked: bool,
    /// Items in the page's main result set
    pub item_count: u32,
    /// Items not seen earlier in this search
    pub new_count: u32,
    pub counters: Option<ResultCounters>,
    pub markers: Vec<String>,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl PageFetchEvent {
    fn new(page: u32, url: &Url) -> Self {
        Self {
            page,
            url: url.to_string(),
            status_code: None,
            blocked: false,
            item_count: 0,
            new_count: 0,
            counters: None,
            markers: Vec::new(),
            error: None,
            fetched_at: Utc::now(),
        }
    }
}

/// A posting retained by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPosting {
    pub job_id: String,
    pub job_url: String,
    /// 1-based position in the cumulative discovery order
    pub rank: u32,
    /// Page the posting was first seen on
    pub page_start: u32,
}

/// Everything one search's discovery produced
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub events: Vec<PageFetchEvent>,
    pub postings: Vec<DiscoveredPosting>,
    /// Fetch attempts, blocked ones included
    pub pages_fetched: u32,
    pub unblocked_pages: u32,
    pub blocked_pages: u32,
    pub fetch_errors: u32,
    /// Items repeated within this search
    pub duplicates: u32,
    /// True when the circuit breaker stopped the search
    pub blocked: bool,
    pub stop_reason: StopReason,
}

impl DiscoveryOutcome {
    pub fn jobs_discovered(&self) -> u32 {
        self.postings.len() as u32
    }
}

/// Builds the result page URL of a search definition
///
/// The platform's window parameter is never taken from the facets; it is
/// appended from `window_code` when one is chosen.
pub fn build_search_url(
    platform: &PlatformConfig,
    definition: &SearchDefinition,
    window_code: Option<&str>,
    page_index: u32,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&platform.search_url)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(&platform.keywords_param, &definition.keywords);
        if let (Some(param), Some(location)) = (&platform.location_param, &definition.location) {
            if !location.is_empty() {
                query.append_pair(param, location);
            }
        }
        for (key, value) in &definition.facets {
            if key == &platform.window.param || value.is_empty() {
                continue;
            }
            query.append_pair(key, value);
        }
        if let Some(code) = window_code {
            query.append_pair(&platform.window.param, code);
        }
        let (param, value) = platform.pagination.query_pair(page_index);
        query.append_pair(param, &value);
    }
    Ok(url)
}

/// Paginates one search definition
pub struct DiscoveryEngine<'a> {
    platform: &'a PlatformConfig,
    budgets: &'a Budgets,
    fetcher: &'a dyn Fetcher,
    extractor: &'a dyn PageExtractor,
    deadline: Option<Instant>,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(
        platform: &'a PlatformConfig,
        budgets: &'a Budgets,
        fetcher: &'a dyn Fetcher,
        extractor: &'a dyn PageExtractor,
    ) -> Self {
        Self {
            platform,
            budgets,
            fetcher,
            extractor,
            deadline: None,
        }
    }

    /// Stops before any fetch that would start after `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Runs discovery for a definition
    ///
    /// # Returns
    ///
    /// * `Ok(DiscoveryOutcome)` - Postings in discovery order plus page audit events
    /// * `Err(url::ParseError)` - The search URL could not be built
    pub async fn discover(
        &self,
        definition: &SearchDefinition,
        window_code: Option<&str>,
    ) -> Result<DiscoveryOutcome, url::ParseError> {
        let max_jobs = self.budgets.max_jobs_discovered_per_search as usize;
        let delay = Duration::from_millis(self.platform.request_delay_ms);

        let mut events = Vec::new();
        let mut postings: Vec<DiscoveredPosting> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages_fetched = 0u32;
        let mut unblocked_pages = 0u32;
        let mut blocked_pages = 0u32;
        let mut fetch_errors = 0u32;
        let mut duplicates = 0u32;
        let mut block_streak = 0u32;
        let mut dup_streak = 0u32;
        let mut page_index = 0u32;

        let stop_reason = loop {
            if self.deadline_passed() {
                break StopReason::Deadline;
            }
            if page_index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let url = build_search_url(self.platform, definition, window_code, page_index)?;
            let page = page_index + 1;
            let mut event = PageFetchEvent::new(page, &url);
            let mut main_count = None;
            pages_fetched += 1;

            match self.fetcher.fetch(url.as_str(), self.platform.render_mode).await {
                Err(e) => {
                    tracing::warn!("{}: page {} fetch failed: {}", definition.name, page, e);
                    event.error = Some(e.to_string());
                    fetch_errors += 1;
                    block_streak += 1;
                }
                Ok(response) => {
                    event.status_code = Some(response.status_code);
                    if is_blocked(&response, &self.platform.block_fingerprints) {
                        tracing::warn!(
                            "{}: page {} blocked (status {})",
                            definition.name,
                            page,
                            response.status_code
                        );
                        event.blocked = true;
                        blocked_pages += 1;
                        block_streak += 1;
                    } else {
                        block_streak = 0;
                        unblocked_pages += 1;

                        let list = self.extractor.extract_list(&response.body, &url);
                        let main = list.main_items();
                        let mut new_count = 0u32;
                        for item in main {
                            if postings.len() >= max_jobs {
                                break;
                            }
                            if seen.insert(item.job_id.clone()) {
                                postings.push(DiscoveredPosting {
                                    job_id: item.job_id.clone(),
                                    job_url: item.job_url.clone(),
                                    rank: postings.len() as u32 + 1,
                                    page_start: page,
                                });
                                new_count += 1;
                            } else {
                                duplicates += 1;
                            }
                        }

                        if !main.is_empty() {
                            if new_count == 0 {
                                dup_streak += 1;
                            } else {
                                dup_streak = 0;
                            }
                        }

                        if !list.markers.is_empty() {
                            tracing::debug!(
                                "{}: page {} markers {:?}",
                                definition.name,
                                page,
                                list.markers
                            );
                        }

                        tracing::debug!(
                            "{}: page {} items={} new={} counters={:?}",
                            definition.name,
                            page,
                            main.len(),
                            new_count,
                            list.counters
                        );

                        event.item_count = main.len() as u32;
                        event.new_count = new_count;
                        main_count = Some(main.len());
                        event.counters = list.counters;
                        event.markers = list.markers;
                    }
                }
            }
            events.push(event);

            if block_streak >= self.budgets.circuit_breaker_blocks {
                break StopReason::CircuitBreaker;
            }
            if main_count == Some(0) {
                break StopReason::NoMainResults;
            }
            if dup_streak >= self.budgets.duplicate_page_limit {
                break StopReason::DuplicatePages;
            }
            if pages_fetched >= self.budgets.max_pages_per_search {
                break StopReason::PageBudget;
            }
            if postings.len() >= max_jobs {
                break StopReason::JobBudget;
            }
            page_index += 1;
        };

        tracing::info!(
            "{}: discovery stopped ({}) after {} pages, {} postings",
            definition.name,
            stop_reason,
            pages_fetched,
            postings.len()
        );

        Ok(DiscoveryOutcome {
            events,
            postings,
            pages_fetched,
            unblocked_pages,
            blocked_pages,
            fetch_errors,
            duplicates,
            blocked: stop_reason == StopReason::CircuitBreaker,
            stop_reason,
        })
    }
}
