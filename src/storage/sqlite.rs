//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{DetailRecord, DiscoveredPosting, PageFetchEvent, BLOCKED_DETAIL_ERROR};
use crate::state::{PlatformAction, RunStatus, SearchRunStatus, Trigger};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{LifecyclePlatformRow, Storage, StorageError, StorageResult};
use crate::storage::{
    from_db_time, to_db_time, CrawlRunRecord, DetailCandidate, DetailSelection, DetailTotals,
    DiscoveryWrite, LifecycleCounts, LifecycleCutoffs, NewSearchDefinition, PostingDetailRecord,
    PostingRecord, SearchDefinition, SearchHitRecord, SearchRunOutcome, SearchRunRecord,
    SearchRunSummary, WindowHistory,
};
use crate::CrawlError;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

// ===== Row helpers =====

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    from_db_time(&s).ok_or_else(|| conversion_error(idx, format!("invalid timestamp '{}'", s)))
}

fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => from_db_time(&s)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("invalid timestamp '{}'", s))),
        None => Ok(None),
    }
}

fn enum_col<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    parse(&s).ok_or_else(|| conversion_error(idx, format!("unknown value '{}'", s)))
}

fn json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_error(idx, e.to_string()))
}

fn opt_json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| conversion_error(idx, e.to_string())),
        None => Ok(None),
    }
}

const CRAWL_RUN_COLUMNS: &str = "id, platform, triggered_by, status, started_at, finished_at,
     discovery_enabled, config_hash, stats, error";

fn crawl_run_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRunRecord> {
    Ok(CrawlRunRecord {
        id: row.get(0)?,
        platform: row.get(1)?,
        trigger: enum_col(row, 2, Trigger::from_db_string)?,
        status: enum_col(row, 3, RunStatus::from_db_string)?,
        started_at: time_col(row, 4)?,
        finished_at: opt_time_col(row, 5)?,
        discovery_enabled: row.get(6)?,
        config_hash: row.get(7)?,
        stats: opt_json_col(row, 8)?,
        error: row.get(9)?,
    })
}

const SEARCH_RUN_COLUMNS: &str = "id, crawl_run_id, search_definition_id, status, window_code,
     pages_fetched, jobs_discovered, blocked, started_at, finished_at, error";

fn search_run_from_row(row: &Row<'_>) -> rusqlite::Result<SearchRunRecord> {
    Ok(SearchRunRecord {
        id: row.get(0)?,
        crawl_run_id: row.get(1)?,
        search_definition_id: row.get(2)?,
        status: enum_col(row, 3, SearchRunStatus::from_db_string)?,
        window_code: row.get(4)?,
        pages_fetched: row.get(5)?,
        jobs_discovered: row.get(6)?,
        blocked: row.get(7)?,
        started_at: time_col(row, 8)?,
        finished_at: opt_time_col(row, 9)?,
        error: row.get(10)?,
    })
}

const UPSERT_POSTING_SQL: &str = "
    INSERT INTO postings (platform, job_id, job_url, first_seen_at, last_seen_at,
                          last_seen_search_run_id, is_active)
    VALUES (?1, ?2, ?3, ?4, ?4, ?5, 1)
    ON CONFLICT(platform, job_id) DO UPDATE SET
        job_url = excluded.job_url,
        last_seen_at = MAX(postings.last_seen_at, excluded.last_seen_at),
        last_seen_search_run_id = excluded.last_seen_search_run_id,
        is_active = 1,
        stale_since_at = NULL,
        expired_at = NULL,
        expire_reason = NULL";

/// `expire_reason` written by the lifecycle soft-expire
pub const NOT_SEEN_REASON: &str = "not_seen_window";

impl Storage for SqliteStorage {
    // ===== Search Definitions =====

    fn sync_search_definitions(
        &mut self,
        definitions: &[NewSearchDefinition],
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let now = to_db_time(now);
        let tx = self.conn.transaction()?;
        for definition in definitions {
            let facets = serde_json::to_string(&definition.facets)?;
            tx.execute(
                "INSERT INTO search_definitions
                    (platform, name, keywords, location_text, facets, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(platform, name) DO UPDATE SET
                    keywords = excluded.keywords,
                    location_text = excluded.location_text,
                    facets = excluded.facets,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at",
                params![
                    definition.platform,
                    definition.name,
                    definition.keywords,
                    definition.location,
                    facets,
                    definition.enabled,
                    now
                ],
            )?;
        }
        tx.commit()?;
        Ok(definitions.len())
    }

    fn load_enabled_search_definitions(
        &self,
        platform: &str,
    ) -> StorageResult<Vec<SearchDefinition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, platform, name, keywords, location_text, facets, enabled
             FROM search_definitions WHERE platform = ?1 AND enabled = 1 ORDER BY id",
        )?;

        let definitions = stmt
            .query_map(params![platform], |row| {
                Ok(SearchDefinition {
                    id: row.get(0)?,
                    platform: row.get(1)?,
                    name: row.get(2)?,
                    keywords: row.get(3)?,
                    location: row.get(4)?,
                    facets: json_col(row, 5)?,
                    enabled: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(definitions)
    }

    // ===== Crawl Runs =====

    fn create_crawl_run(
        &mut self,
        platform: &str,
        trigger: Trigger,
        discovery_enabled: bool,
        config_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO crawl_runs (platform, triggered_by, status, started_at, discovery_enabled, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                platform,
                trigger.to_db_string(),
                RunStatus::Running.to_db_string(),
                to_db_time(now),
                discovery_enabled,
                config_hash
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_crawl_run(
        &mut self,
        crawl_run_id: i64,
        status: RunStatus,
        stats: &serde_json::Value,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, stats = ?3, error = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                to_db_time(now),
                serde_json::to_string(stats)?,
                error,
                crawl_run_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::CrawlRunNotFound(crawl_run_id));
        }
        Ok(())
    }

    fn get_crawl_run(&self, crawl_run_id: i64) -> StorageResult<CrawlRunRecord> {
        let sql = format!("SELECT {} FROM crawl_runs WHERE id = ?1", CRAWL_RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![crawl_run_id], crawl_run_from_row)
            .optional()?
            .ok_or(StorageError::CrawlRunNotFound(crawl_run_id))
    }

    fn get_latest_crawl_run(&self, platform: &str) -> StorageResult<Option<CrawlRunRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_runs WHERE platform = ?1
             ORDER BY started_at DESC, id DESC LIMIT 1",
            CRAWL_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![platform], crawl_run_from_row)
            .optional()?)
    }

    fn get_latest_discovery_crawl_run(
        &self,
        platform: &str,
    ) -> StorageResult<Option<CrawlRunRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_runs WHERE platform = ?1 AND discovery_enabled = 1
             ORDER BY started_at DESC, id DESC LIMIT 1",
            CRAWL_RUN_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![platform], crawl_run_from_row)
            .optional()?)
    }

    // ===== Search Runs =====

    fn create_search_run(
        &mut self,
        crawl_run_id: i64,
        search_definition_id: i64,
        window_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO search_runs (crawl_run_id, search_definition_id, status, window_code, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                crawl_run_id,
                search_definition_id,
                SearchRunStatus::Running.to_db_string(),
                window_code,
                to_db_time(now)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_search_run(
        &mut self,
        search_run_id: i64,
        outcome: &SearchRunOutcome,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE search_runs
             SET status = ?1, pages_fetched = ?2, jobs_discovered = ?3, blocked = ?4,
                 error = ?5, finished_at = ?6
             WHERE id = ?7",
            params![
                outcome.status.to_db_string(),
                outcome.pages_fetched,
                outcome.jobs_discovered,
                outcome.blocked,
                outcome.error,
                to_db_time(now),
                search_run_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::SearchRunNotFound(search_run_id));
        }
        Ok(())
    }

    fn get_search_run(&self, search_run_id: i64) -> StorageResult<SearchRunRecord> {
        let sql = format!("SELECT {} FROM search_runs WHERE id = ?1", SEARCH_RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![search_run_id], search_run_from_row)
            .optional()?
            .ok_or(StorageError::SearchRunNotFound(search_run_id))
    }

    fn get_search_runs(&self, crawl_run_id: i64) -> StorageResult<Vec<SearchRunRecord>> {
        let sql = format!(
            "SELECT {} FROM search_runs WHERE crawl_run_id = ?1 ORDER BY id",
            SEARCH_RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![crawl_run_id], search_run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn summarize_search_runs(&self, crawl_run_id: i64) -> StorageResult<SearchRunSummary> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*), SUM(blocked), SUM(pages_fetched), SUM(jobs_discovered)
             FROM search_runs WHERE crawl_run_id = ?1 GROUP BY status",
        )?;

        let mut summary = SearchRunSummary::default();
        let rows = stmt.query_map(params![crawl_run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        for row in rows {
            let (status, count, blocked, pages, jobs) = row?;
            summary.runs_total += count as u64;
            summary.runs_blocked += blocked as u64;
            summary.pages_fetched_total += pages as u64;
            summary.jobs_discovered_total += jobs as u64;
            summary.by_status.insert(status, count as u64);
        }
        Ok(summary)
    }

    fn window_history(&self, search_definition_id: i64) -> StorageResult<WindowHistory> {
        let (finished, last_success): (i64, Option<String>) = self.conn.query_row(
            "SELECT COUNT(finished_at),
                    MAX(CASE WHEN status = ?2 AND blocked = 0 THEN finished_at END)
             FROM search_runs WHERE search_definition_id = ?1",
            params![search_definition_id, SearchRunStatus::Success.to_db_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(WindowHistory {
            has_finished_history: finished > 0,
            last_success_finished_at: last_success.as_deref().and_then(from_db_time),
        })
    }

    fn record_page_fetches(
        &mut self,
        search_run_id: i64,
        events: &[PageFetchEvent],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        for event in events {
            let counters = event.counters.map(|c| serde_json::to_string(&c)).transpose()?;
            let markers = if event.markers.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&event.markers)?)
            };
            tx.execute(
                "INSERT INTO page_fetches
                    (search_run_id, page, url, status_code, blocked, item_count, new_count,
                     counters, markers, error, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    search_run_id,
                    event.page,
                    event.url,
                    event.status_code,
                    event.blocked,
                    event.item_count,
                    event.new_count,
                    counters,
                    markers,
                    event.error,
                    to_db_time(event.fetched_at)
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn count_page_fetches(&self, search_run_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM page_fetches WHERE search_run_id = ?1",
            params![search_run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Postings =====

    fn record_discovery(
        &mut self,
        platform: &str,
        search_run_id: i64,
        postings: &[DiscoveredPosting],
        now: DateTime<Utc>,
    ) -> StorageResult<DiscoveryWrite> {
        let now = to_db_time(now);
        let mut write = DiscoveryWrite::default();

        let tx = self.conn.transaction()?;
        for posting in postings {
            let was_active: Option<bool> = tx
                .query_row(
                    "SELECT is_active FROM postings WHERE platform = ?1 AND job_id = ?2",
                    params![platform, posting.job_id],
                    |row| row.get(0),
                )
                .optional()?;
            match was_active {
                None => write.new_postings += 1,
                Some(false) => write.reactivated += 1,
                Some(true) => {}
            }

            tx.execute(
                UPSERT_POSTING_SQL,
                params![platform, posting.job_id, posting.job_url, now, search_run_id],
            )?;
            write.postings_upserted += 1;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO search_hits
                    (search_run_id, platform, job_id, rank, page_start, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    search_run_id,
                    platform,
                    posting.job_id,
                    posting.rank,
                    posting.page_start,
                    now
                ],
            )?;
            write.hits_inserted += inserted as u32;
        }
        tx.commit()?;

        Ok(write)
    }

    fn get_posting(&self, platform: &str, job_id: &str) -> StorageResult<Option<PostingRecord>> {
        let posting = self
            .conn
            .query_row(
                "SELECT platform, job_id, job_url, first_seen_at, last_seen_at,
                        last_seen_search_run_id, is_active, stale_since_at, expired_at, expire_reason
                 FROM postings WHERE platform = ?1 AND job_id = ?2",
                params![platform, job_id],
                |row| {
                    Ok(PostingRecord {
                        platform: row.get(0)?,
                        job_id: row.get(1)?,
                        job_url: row.get(2)?,
                        first_seen_at: time_col(row, 3)?,
                        last_seen_at: time_col(row, 4)?,
                        last_seen_search_run_id: row.get(5)?,
                        is_active: row.get(6)?,
                        stale_since_at: opt_time_col(row, 7)?,
                        expired_at: opt_time_col(row, 8)?,
                        expire_reason: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(posting)
    }

    fn get_search_hits(&self, search_run_id: i64) -> StorageResult<Vec<SearchHitRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT search_run_id, platform, job_id, rank, page_start, scraped_at
             FROM search_hits WHERE search_run_id = ?1 ORDER BY rank",
        )?;
        let hits = stmt
            .query_map(params![search_run_id], |row| {
                Ok(SearchHitRecord {
                    search_run_id: row.get(0)?,
                    platform: row.get(1)?,
                    job_id: row.get(2)?,
                    rank: row.get(3)?,
                    page_start: row.get(4)?,
                    scraped_at: time_col(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    fn count_postings(&self, platform: &str, active_only: bool) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM postings WHERE platform = ?1 AND (?2 = 0 OR is_active = 1)",
            params![platform, active_only],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Details =====

    fn select_postings_for_details(
        &self,
        platform: &str,
        selection: &DetailSelection,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<DetailCandidate>> {
        let seen_after = to_db_time(now - Duration::days(selection.last_seen_window_days));
        let stale_before = to_db_time(now - Duration::days(selection.staleness_days));
        let blocked_before = to_db_time(now - Duration::hours(selection.blocked_retry_hours));

        let mut stmt = self.conn.prepare(
            "SELECT p.job_id, p.job_url, p.last_seen_at, d.job_id IS NOT NULL
             FROM postings p
             LEFT JOIN posting_details d ON d.platform = p.platform AND d.job_id = p.job_id
             WHERE p.platform = ?1
               AND p.is_active = 1
               AND p.last_seen_at > ?2
               AND (d.job_id IS NULL
                    OR d.scraped_at < ?3
                    OR (d.last_error = ?4 AND d.scraped_at < ?5))
             ORDER BY (d.job_id IS NULL) DESC, d.scraped_at ASC, p.last_seen_at ASC, p.job_id ASC
             LIMIT ?6",
        )?;

        let candidates = stmt
            .query_map(
                params![
                    platform,
                    seen_after,
                    stale_before,
                    BLOCKED_DETAIL_ERROR,
                    blocked_before,
                    selection.limit
                ],
                |row| {
                    Ok(DetailCandidate {
                        job_id: row.get(0)?,
                        job_url: row.get(1)?,
                        last_seen_at: time_col(row, 2)?,
                        has_detail: row.get(3)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(candidates)
    }

    fn record_detail(
        &mut self,
        platform: &str,
        job_id: &str,
        detail: &DetailRecord,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO posting_details (platform, job_id, scraped_at, parse_ok, last_error, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(platform, job_id) DO UPDATE SET
                scraped_at = excluded.scraped_at,
                parse_ok = excluded.parse_ok,
                last_error = excluded.last_error,
                fields = excluded.fields",
            params![
                platform,
                job_id,
                to_db_time(now),
                detail.parse_ok,
                detail.last_error,
                serde_json::to_string(&detail.fields)?
            ],
        )?;
        Ok(())
    }

    fn get_detail(
        &self,
        platform: &str,
        job_id: &str,
    ) -> StorageResult<Option<PostingDetailRecord>> {
        let detail = self
            .conn
            .query_row(
                "SELECT platform, job_id, scraped_at, parse_ok, last_error, fields
                 FROM posting_details WHERE platform = ?1 AND job_id = ?2",
                params![platform, job_id],
                |row| {
                    Ok(PostingDetailRecord {
                        platform: row.get(0)?,
                        job_id: row.get(1)?,
                        scraped_at: time_col(row, 2)?,
                        parse_ok: row.get(3)?,
                        last_error: row.get(4)?,
                        fields: json_col(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(detail)
    }

    fn detail_totals(&self, platform: &str) -> StorageResult<DetailTotals> {
        let (total, parse_ok, blocked): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(parse_ok), 0),
                    COALESCE(SUM(CASE WHEN last_error = ?2 THEN 1 ELSE 0 END), 0)
             FROM posting_details WHERE platform = ?1",
            params![platform, BLOCKED_DETAIL_ERROR],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(DetailTotals {
            total: total as u64,
            parse_ok: parse_ok as u64,
            blocked: blocked as u64,
        })
    }

    // ===== Lifecycle =====

    fn count_lifecycle_candidates(
        &self,
        platform: &str,
        cutoffs: &LifecycleCutoffs,
    ) -> StorageResult<LifecycleCounts> {
        let (stale, delete): (i64, i64) = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN is_active = 1 AND last_seen_at < ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN last_seen_at < ?3 THEN 1 ELSE 0 END), 0)
             FROM postings WHERE platform = ?1",
            params![
                platform,
                to_db_time(cutoffs.stale_before),
                to_db_time(cutoffs.delete_before)
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(LifecycleCounts {
            stale_marked_count: stale as u64,
            hard_delete_candidate_count: delete as u64,
            ..Default::default()
        })
    }

    fn apply_lifecycle(
        &mut self,
        platform: &str,
        cutoffs: &LifecycleCutoffs,
        now: DateTime<Utc>,
    ) -> StorageResult<LifecycleCounts> {
        let now = to_db_time(now);
        let stale_before = to_db_time(cutoffs.stale_before);
        let delete_before = to_db_time(cutoffs.delete_before);

        let tx = self.conn.transaction()?;

        let stale = tx.execute(
            "UPDATE postings
             SET is_active = 0,
                 stale_since_at = COALESCE(stale_since_at, ?3),
                 expired_at = ?3,
                 expire_reason = ?4
             WHERE platform = ?1 AND is_active = 1 AND last_seen_at < ?2",
            params![platform, stale_before, now, NOT_SEEN_REASON],
        )?;

        let candidates: i64 = tx.query_row(
            "SELECT COUNT(*) FROM postings WHERE platform = ?1 AND last_seen_at < ?2",
            params![platform, delete_before],
            |row| row.get(0),
        )?;

        // Children first; foreign keys reject any other order
        let hits = tx.execute(
            "DELETE FROM search_hits WHERE platform = ?1 AND job_id IN
                (SELECT job_id FROM postings WHERE platform = ?1 AND last_seen_at < ?2)",
            params![platform, delete_before],
        )?;
        let details = tx.execute(
            "DELETE FROM posting_details WHERE platform = ?1 AND job_id IN
                (SELECT job_id FROM postings WHERE platform = ?1 AND last_seen_at < ?2)",
            params![platform, delete_before],
        )?;
        let jobs = tx.execute(
            "DELETE FROM postings WHERE platform = ?1 AND last_seen_at < ?2",
            params![platform, delete_before],
        )?;

        tx.commit()?;

        Ok(LifecycleCounts {
            stale_marked_count: stale as u64,
            hard_delete_candidate_count: candidates as u64,
            deleted_hits_count: hits as u64,
            deleted_details_count: details as u64,
            deleted_jobs_count: jobs as u64,
        })
    }

    fn create_lifecycle_run(
        &mut self,
        trigger: Trigger,
        stale_after_days: i64,
        hard_delete_after_days: i64,
        max_crawl_age_hours: i64,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO lifecycle_runs
                (triggered_by, status, started_at, stale_after_days, hard_delete_after_days,
                 max_crawl_age_hours, dry_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                trigger.to_db_string(),
                RunStatus::Running.to_db_string(),
                to_db_time(now),
                stale_after_days,
                hard_delete_after_days,
                max_crawl_age_hours,
                dry_run
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn record_lifecycle_platform(
        &mut self,
        run_id: i64,
        row: &LifecyclePlatformRow<'_>,
    ) -> StorageResult<()> {
        let c = &row.counts;
        self.conn.execute(
            "INSERT INTO lifecycle_platform_stats
                (run_id, platform, action_status, latest_crawl_run_id, latest_crawl_status,
                 latest_crawl_finished_at, stale_marked_count, hard_delete_candidate_count,
                 deleted_hits_count, deleted_details_count, deleted_jobs_count, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(run_id, platform) DO UPDATE SET
                action_status = excluded.action_status,
                latest_crawl_run_id = excluded.latest_crawl_run_id,
                latest_crawl_status = excluded.latest_crawl_status,
                latest_crawl_finished_at = excluded.latest_crawl_finished_at,
                stale_marked_count = excluded.stale_marked_count,
                hard_delete_candidate_count = excluded.hard_delete_candidate_count,
                deleted_hits_count = excluded.deleted_hits_count,
                deleted_details_count = excluded.deleted_details_count,
                deleted_jobs_count = excluded.deleted_jobs_count,
                note = excluded.note",
            params![
                run_id,
                row.platform,
                row.action.to_db_string(),
                row.latest_crawl_run_id,
                row.latest_crawl_status.map(|s| s.to_db_string()),
                row.latest_crawl_finished_at.map(to_db_time),
                c.stale_marked_count as i64,
                c.hard_delete_candidate_count as i64,
                c.deleted_hits_count as i64,
                c.deleted_details_count as i64,
                c.deleted_jobs_count as i64,
                row.note
            ],
        )?;
        Ok(())
    }

    fn finish_lifecycle_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &serde_json::Value,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE lifecycle_runs SET status = ?1, finished_at = ?2, summary = ?3, error = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                to_db_time(now),
                serde_json::to_string(summary)?,
                error,
                run_id
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::LifecycleRunNotFound(run_id));
        }
        Ok(())
    }

    fn get_lifecycle_run(
        &self,
        run_id: i64,
    ) -> StorageResult<(RunStatus, Option<serde_json::Value>)> {
        self.conn
            .query_row(
                "SELECT status, summary FROM lifecycle_runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        enum_col(row, 0, RunStatus::from_db_string)?,
                        opt_json_col(row, 1)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StorageError::LifecycleRunNotFound(run_id))
    }

    fn get_lifecycle_platform_actions(
        &self,
        run_id: i64,
    ) -> StorageResult<Vec<(String, PlatformAction)>> {
        let mut stmt = self.conn.prepare(
            "SELECT platform, action_status FROM lifecycle_platform_stats
             WHERE run_id = ?1 ORDER BY platform",
        )?;
        let actions = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    enum_col(row, 1, PlatformAction::from_db_string)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(actions)
    }
}
