//! Database schema definitions
//!
//! One generic schema serves every platform; rows carry a `platform`
//! discriminator instead of living in per-platform tables.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Named, platform-scoped queries synced from configuration
CREATE TABLE IF NOT EXISTS search_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    name TEXT NOT NULL,
    keywords TEXT NOT NULL,
    location_text TEXT,
    facets TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(platform, name)
);

-- One execution of the orchestrator for a platform
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    triggered_by TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    discovery_enabled INTEGER NOT NULL DEFAULT 1,
    config_hash TEXT NOT NULL,
    stats TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_platform ON crawl_runs(platform, started_at);

-- One search definition's discovery within a crawl run
CREATE TABLE IF NOT EXISTS search_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_run_id INTEGER NOT NULL REFERENCES crawl_runs(id),
    search_definition_id INTEGER NOT NULL REFERENCES search_definitions(id),
    status TEXT NOT NULL,
    window_code TEXT,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    jobs_discovered INTEGER NOT NULL DEFAULT 0,
    blocked INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    error TEXT,
    UNIQUE(crawl_run_id, search_definition_id)
);

CREATE INDEX IF NOT EXISTS idx_search_runs_definition ON search_runs(search_definition_id);

-- Page fetch audit trail
CREATE TABLE IF NOT EXISTS page_fetches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    search_run_id INTEGER NOT NULL REFERENCES search_runs(id),
    page INTEGER NOT NULL,
    url TEXT NOT NULL,
    status_code INTEGER,
    blocked INTEGER NOT NULL,
    item_count INTEGER NOT NULL,
    new_count INTEGER NOT NULL,
    counters TEXT,
    markers TEXT,
    error TEXT,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_page_fetches_search_run ON page_fetches(search_run_id);

-- Canonical deduplicated postings
CREATE TABLE IF NOT EXISTS postings (
    platform TEXT NOT NULL,
    job_id TEXT NOT NULL,
    job_url TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    last_seen_search_run_id INTEGER REFERENCES search_runs(id),
    is_active INTEGER NOT NULL DEFAULT 1,
    stale_since_at TEXT,
    expired_at TEXT,
    expire_reason TEXT,
    PRIMARY KEY (platform, job_id)
);

CREATE INDEX IF NOT EXISTS idx_postings_last_seen ON postings(platform, last_seen_at);

-- Append-only appearances of postings in search runs
CREATE TABLE IF NOT EXISTS search_hits (
    search_run_id INTEGER NOT NULL REFERENCES search_runs(id),
    platform TEXT NOT NULL,
    job_id TEXT NOT NULL,
    rank INTEGER NOT NULL,
    page_start INTEGER NOT NULL,
    scraped_at TEXT NOT NULL,
    PRIMARY KEY (search_run_id, platform, job_id),
    FOREIGN KEY (platform, job_id) REFERENCES postings(platform, job_id)
);

CREATE INDEX IF NOT EXISTS idx_search_hits_posting ON search_hits(platform, job_id);

-- Latest detail snapshot per posting
CREATE TABLE IF NOT EXISTS posting_details (
    platform TEXT NOT NULL,
    job_id TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    parse_ok INTEGER NOT NULL,
    last_error TEXT,
    fields TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (platform, job_id),
    FOREIGN KEY (platform, job_id) REFERENCES postings(platform, job_id)
);

-- Lifecycle maintenance passes
CREATE TABLE IF NOT EXISTS lifecycle_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    triggered_by TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    stale_after_days INTEGER NOT NULL,
    hard_delete_after_days INTEGER NOT NULL,
    max_crawl_age_hours INTEGER NOT NULL,
    dry_run INTEGER NOT NULL,
    summary TEXT,
    error TEXT
);

CREATE TABLE IF NOT EXISTS lifecycle_platform_stats (
    run_id INTEGER NOT NULL REFERENCES lifecycle_runs(id),
    platform TEXT NOT NULL,
    action_status TEXT NOT NULL,
    latest_crawl_run_id INTEGER,
    latest_crawl_status TEXT,
    latest_crawl_finished_at TEXT,
    stale_marked_count INTEGER NOT NULL DEFAULT 0,
    hard_delete_candidate_count INTEGER NOT NULL DEFAULT 0,
    deleted_hits_count INTEGER NOT NULL DEFAULT 0,
    deleted_details_count INTEGER NOT NULL DEFAULT 0,
    deleted_jobs_count INTEGER NOT NULL DEFAULT 0,
    note TEXT,
    PRIMARY KEY (run_id, platform)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
        assert_eq!(get_schema_version(), 1);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "search_definitions",
            "crawl_runs",
            "search_runs",
            "page_fetches",
            "postings",
            "search_hits",
            "posting_details",
            "lifecycle_runs",
            "lifecycle_platform_stats",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
