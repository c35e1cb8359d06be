//! Storage module for persisting crawl and lifecycle data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Search definition sync
//! - Crawl run and search run tracking
//! - Posting deduplication, search hits and detail snapshots
//! - Lifecycle maintenance and its audit records

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{LifecyclePlatformRow, Storage, StorageError, StorageResult};

use crate::state::{RunStatus, SearchRunStatus, Trigger};
use crate::CrawlError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlError> {
    SqliteStorage::new(path)
}

/// Formats a timestamp for storage
///
/// Fixed-width UTC with microseconds so that text comparison in SQL orders
/// timestamps chronologically.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
pub fn from_db_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A search definition as stored
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDefinition {
    pub id: i64,
    pub platform: String,
    pub name: String,
    pub keywords: String,
    pub location: Option<String>,
    pub facets: BTreeMap<String, String>,
    pub enabled: bool,
}

/// A search definition produced by the configuration sync
#[derive(Debug, Clone, PartialEq)]
pub struct NewSearchDefinition {
    pub platform: String,
    pub name: String,
    pub keywords: String,
    pub location: Option<String>,
    pub facets: BTreeMap<String, String>,
    pub enabled: bool,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct CrawlRunRecord {
    pub id: i64,
    pub platform: String,
    pub trigger: Trigger,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub discovery_enabled: bool,
    pub config_hash: String,
    pub stats: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Represents one search definition's run within a crawl run
#[derive(Debug, Clone)]
pub struct SearchRunRecord {
    pub id: i64,
    pub crawl_run_id: i64,
    pub search_definition_id: i64,
    pub status: SearchRunStatus,
    pub window_code: Option<String>,
    pub pages_fetched: u32,
    pub jobs_discovered: u32,
    pub blocked: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Final values written to a search run
#[derive(Debug, Clone)]
pub struct SearchRunOutcome {
    pub status: SearchRunStatus,
    pub pages_fetched: u32,
    pub jobs_discovered: u32,
    pub blocked: bool,
    pub error: Option<String>,
}

/// Canonical posting row
#[derive(Debug, Clone, PartialEq)]
pub struct PostingRecord {
    pub platform: String,
    pub job_id: String,
    pub job_url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_seen_search_run_id: Option<i64>,
    pub is_active: bool,
    pub stale_since_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub expire_reason: Option<String>,
}

/// One appearance of a posting in a search run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHitRecord {
    pub search_run_id: i64,
    pub platform: String,
    pub job_id: String,
    pub rank: u32,
    pub page_start: u32,
    pub scraped_at: DateTime<Utc>,
}

/// Latest detail snapshot of a posting
#[derive(Debug, Clone, PartialEq)]
pub struct PostingDetailRecord {
    pub platform: String,
    pub job_id: String,
    pub scraped_at: DateTime<Utc>,
    pub parse_ok: bool,
    pub last_error: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Counters returned by `Storage::record_discovery`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryWrite {
    pub postings_upserted: u32,
    pub new_postings: u32,
    pub reactivated: u32,
    pub hits_inserted: u32,
}

/// Parameters of the details selection
#[derive(Debug, Clone, Copy)]
pub struct DetailSelection {
    pub last_seen_window_days: i64,
    pub staleness_days: i64,
    pub blocked_retry_hours: i64,
    pub limit: u32,
}

/// A posting selected for the details phase
#[derive(Debug, Clone, PartialEq)]
pub struct DetailCandidate {
    pub job_id: String,
    pub job_url: String,
    pub last_seen_at: DateTime<Utc>,
    pub has_detail: bool,
}

/// Discovery history of one search definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowHistory {
    pub has_finished_history: bool,
    pub last_success_finished_at: Option<DateTime<Utc>>,
}

/// Cutoffs of one lifecycle pass
#[derive(Debug, Clone, Copy)]
pub struct LifecycleCutoffs {
    /// Postings last seen before this are soft-expired
    pub stale_before: DateTime<Utc>,
    /// Postings last seen before this are deleted
    pub delete_before: DateTime<Utc>,
}

/// Staged or applied lifecycle counts for one platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleCounts {
    pub stale_marked_count: u64,
    pub hard_delete_candidate_count: u64,
    pub deleted_hits_count: u64,
    pub deleted_details_count: u64,
    pub deleted_jobs_count: u64,
}

impl std::ops::AddAssign for LifecycleCounts {
    fn add_assign(&mut self, other: Self) {
        self.stale_marked_count += other.stale_marked_count;
        self.hard_delete_candidate_count += other.hard_delete_candidate_count;
        self.deleted_hits_count += other.deleted_hits_count;
        self.deleted_details_count += other.deleted_details_count;
        self.deleted_jobs_count += other.deleted_jobs_count;
    }
}

/// Aggregated search runs of one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRunSummary {
    pub runs_total: u64,
    pub runs_blocked: u64,
    pub pages_fetched_total: u64,
    pub jobs_discovered_total: u64,
    pub by_status: BTreeMap<String, u64>,
}

/// Detail snapshot totals of one platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailTotals {
    pub total: u64,
    pub parse_ok: u64,
    pub blocked: u64,
}
