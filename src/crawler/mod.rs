//! Crawler module for discovery and detail refresh
//!
//! This module contains the core crawling logic, including:
//! - The fetch adapter and anti-bot classification
//! - List and detail page extraction
//! - Paginated discovery with circuit breaking
//! - The adaptive recency window
//! - Overall crawl run orchestration

mod block;
mod controller;
mod details;
mod discovery;
mod extractor;
mod fetcher;
mod window;

#[cfg(test)]
pub(crate) mod test_support;

pub use block::{is_blocked, BLOCK_STATUS_CODES};
pub use controller::{CrawlController, CrawlRunSummary, RunOptions};
pub use details::DetailsPhase;
pub use discovery::{
    build_search_url, DiscoveredPosting, DiscoveryEngine, DiscoveryOutcome, PageFetchEvent,
    StopReason,
};
pub use extractor::{
    DetailRecord, ListItem, ListPage, PageExtractor, ResultCounters, SelectorExtractor,
    BLOCKED_DETAIL_ERROR,
};
pub use fetcher::{build_http_client, FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use window::{WindowDecision, WindowPolicy};

use crate::storage::{SqliteStorage, StorageResult};
use crate::{CrawlError, Result};
use std::sync::Mutex;

/// Runs `f` with exclusive access to the shared storage
///
/// The lock is held only for the duration of `f`, never across an await.
pub fn with_storage<T>(
    storage: &Mutex<SqliteStorage>,
    f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
) -> Result<T> {
    let mut guard = storage.lock().map_err(|_| CrawlError::LockPoisoned)?;
    Ok(f(&mut guard)?)
}
