//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::{DetailRecord, DiscoveredPosting, PageFetchEvent};
use crate::state::{PlatformAction, RunStatus, Trigger};
use crate::storage::{
    CrawlRunRecord, DetailCandidate, DetailSelection, DetailTotals, DiscoveryWrite,
    LifecycleCounts, LifecycleCutoffs, NewSearchDefinition, PostingDetailRecord, PostingRecord,
    SearchDefinition, SearchHitRecord, SearchRunOutcome, SearchRunRecord, SearchRunSummary,
    WindowHistory,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Crawl run not found: {0}")]
    CrawlRunNotFound(i64),

    #[error("Search run not found: {0}")]
    SearchRunNotFound(i64),

    #[error("Lifecycle run not found: {0}")]
    LifecycleRunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A lifecycle platform row to persist
#[derive(Debug, Clone)]
pub struct LifecyclePlatformRow<'a> {
    pub platform: &'a str,
    pub action: PlatformAction,
    pub latest_crawl_run_id: Option<i64>,
    pub latest_crawl_status: Option<RunStatus>,
    pub latest_crawl_finished_at: Option<DateTime<Utc>>,
    pub counts: LifecycleCounts,
    pub note: Option<&'a str>,
}

/// Trait for storage backend implementations
///
/// Every mutation takes an explicit `now` so that callers control the clock.
pub trait Storage {
    // ===== Search Definitions =====

    /// Upserts search definitions by `(platform, name)`
    ///
    /// # Returns
    ///
    /// The number of definitions written
    fn sync_search_definitions(
        &mut self,
        definitions: &[NewSearchDefinition],
        now: DateTime<Utc>,
    ) -> StorageResult<usize>;

    /// Loads the enabled definitions of a platform, ordered by id
    fn load_enabled_search_definitions(&self, platform: &str)
        -> StorageResult<Vec<SearchDefinition>>;

    // ===== Crawl Runs =====

    /// Creates a crawl run in `running` state
    fn create_crawl_run(
        &mut self,
        platform: &str,
        trigger: Trigger,
        discovery_enabled: bool,
        config_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Sets the terminal status, stats and finish time of a crawl run
    fn finish_crawl_run(
        &mut self,
        crawl_run_id: i64,
        status: RunStatus,
        stats: &serde_json::Value,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets a crawl run by ID
    fn get_crawl_run(&self, crawl_run_id: i64) -> StorageResult<CrawlRunRecord>;

    /// Gets the most recently started crawl run of a platform
    fn get_latest_crawl_run(&self, platform: &str) -> StorageResult<Option<CrawlRunRecord>>;

    /// Gets the most recently started crawl run that had discovery enabled
    fn get_latest_discovery_crawl_run(
        &self,
        platform: &str,
    ) -> StorageResult<Option<CrawlRunRecord>>;

    // ===== Search Runs =====

    /// Creates a search run in `running` state
    ///
    /// # Arguments
    ///
    /// * `crawl_run_id` - Owning crawl run
    /// * `search_definition_id` - The definition being executed
    /// * `window_code` - Recency filter code chosen for this run, if any
    fn create_search_run(
        &mut self,
        crawl_run_id: i64,
        search_definition_id: i64,
        window_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Writes the final values of a search run
    fn finish_search_run(
        &mut self,
        search_run_id: i64,
        outcome: &SearchRunOutcome,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets a search run by ID
    fn get_search_run(&self, search_run_id: i64) -> StorageResult<SearchRunRecord>;

    /// Gets the search runs of a crawl run, ordered by id
    fn get_search_runs(&self, crawl_run_id: i64) -> StorageResult<Vec<SearchRunRecord>>;

    /// Aggregates the search runs of a crawl run
    fn summarize_search_runs(&self, crawl_run_id: i64) -> StorageResult<SearchRunSummary>;

    /// Reads the finished discovery history of a search definition
    fn window_history(&self, search_definition_id: i64) -> StorageResult<WindowHistory>;

    /// Appends page fetch audit rows
    fn record_page_fetches(
        &mut self,
        search_run_id: i64,
        events: &[PageFetchEvent],
    ) -> StorageResult<()>;

    /// Counts the audit rows of a search run
    fn count_page_fetches(&self, search_run_id: i64) -> StorageResult<u64>;

    // ===== Postings =====

    /// Upserts discovered postings and inserts their search hits atomically
    ///
    /// Re-seeing an inactive posting reactivates it. `first_seen_at` is
    /// never changed once set, and `last_seen_at` never moves backwards.
    fn record_discovery(
        &mut self,
        platform: &str,
        search_run_id: i64,
        postings: &[DiscoveredPosting],
        now: DateTime<Utc>,
    ) -> StorageResult<DiscoveryWrite>;

    /// Gets a posting by key
    fn get_posting(&self, platform: &str, job_id: &str) -> StorageResult<Option<PostingRecord>>;

    /// Gets the search hits of a search run, ordered by rank
    fn get_search_hits(&self, search_run_id: i64) -> StorageResult<Vec<SearchHitRecord>>;

    /// Counts the postings of a platform
    fn count_postings(&self, platform: &str, active_only: bool) -> StorageResult<u64>;

    // ===== Details =====

    /// Selects postings whose details should be fetched
    ///
    /// Missing details first, then oldest snapshots, then oldest sightings.
    fn select_postings_for_details(
        &self,
        platform: &str,
        selection: &DetailSelection,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<DetailCandidate>>;

    /// Upserts the detail snapshot of a posting
    fn record_detail(
        &mut self,
        platform: &str,
        job_id: &str,
        detail: &DetailRecord,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets the detail snapshot of a posting
    fn get_detail(&self, platform: &str, job_id: &str)
        -> StorageResult<Option<PostingDetailRecord>>;

    /// Counts detail snapshots of a platform
    fn detail_totals(&self, platform: &str) -> StorageResult<DetailTotals>;

    // ===== Lifecycle =====

    /// Counts what a lifecycle pass would change, without mutating
    fn count_lifecycle_candidates(
        &self,
        platform: &str,
        cutoffs: &LifecycleCutoffs,
    ) -> StorageResult<LifecycleCounts>;

    /// Soft-expires and hard-deletes postings of one platform in a single
    /// transaction
    ///
    /// Deletion order is search hits, then details, then postings.
    fn apply_lifecycle(
        &mut self,
        platform: &str,
        cutoffs: &LifecycleCutoffs,
        now: DateTime<Utc>,
    ) -> StorageResult<LifecycleCounts>;

    /// Creates a lifecycle run in `running` state
    fn create_lifecycle_run(
        &mut self,
        trigger: Trigger,
        stale_after_days: i64,
        hard_delete_after_days: i64,
        max_crawl_age_hours: i64,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Upserts the outcome of one platform within a lifecycle run
    fn record_lifecycle_platform(
        &mut self,
        run_id: i64,
        row: &LifecyclePlatformRow<'_>,
    ) -> StorageResult<()>;

    /// Sets the terminal status and summary of a lifecycle run
    fn finish_lifecycle_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &serde_json::Value,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Gets the status and summary of a lifecycle run
    fn get_lifecycle_run(
        &self,
        run_id: i64,
    ) -> StorageResult<(RunStatus, Option<serde_json::Value>)>;

    /// Gets the per-platform action statuses of a lifecycle run
    fn get_lifecycle_platform_actions(
        &self,
        run_id: i64,
    ) -> StorageResult<Vec<(String, PlatformAction)>>;
}
