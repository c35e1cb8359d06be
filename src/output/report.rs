//! Latest-run report
//!
//! Reads the most recent crawl run of a platform together with its search
//! runs and detail totals, and formats it for the terminal.

use crate::storage::{CrawlRunRecord, DetailTotals, SearchRunSummary, Storage};
use crate::Result;
use std::fmt;

/// Everything the `report` command shows for one platform
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: CrawlRunRecord,
    pub searches: SearchRunSummary,
    pub details: DetailTotals,
    pub active_postings: u64,
    pub total_postings: u64,
}

/// Loads the report of the latest crawl run
///
/// Returns `Ok(None)` when the platform has never been crawled.
pub fn load_run_report(storage: &dyn Storage, platform: &str) -> Result<Option<RunReport>> {
    let Some(run) = storage.get_latest_crawl_run(platform)? else {
        return Ok(None);
    };
    let searches = storage.summarize_search_runs(run.id)?;
    let details = storage.detail_totals(platform)?;
    let active_postings = storage.count_postings(platform, true)?;
    let total_postings = storage.count_postings(platform, false)?;

    Ok(Some(RunReport {
        run,
        searches,
        details,
        active_postings,
        total_postings,
    }))
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = &self.run;

        writeln!(f, "=== {} crawl run {} ===\n", run.platform, run.id)?;
        writeln!(f, "  Status: {}", run.status)?;
        writeln!(f, "  Trigger: {}", run.trigger)?;
        writeln!(f, "  Started: {}", run.started_at.to_rfc3339())?;
        match run.finished_at {
            Some(finished) => writeln!(
                f,
                "  Finished: {} ({}s)",
                finished.to_rfc3339(),
                (finished - run.started_at).num_seconds()
            )?,
            None if !run.status.is_terminal() => writeln!(f, "  Finished: - (still running)")?,
            None => writeln!(f, "  Finished: -")?,
        }
        writeln!(f, "  Discovery enabled: {}", run.discovery_enabled)?;
        writeln!(f, "  Config hash: {}", run.config_hash)?;
        if let Some(error) = &run.error {
            writeln!(f, "  Error: {}", error)?;
        }
        writeln!(f)?;

        let s = &self.searches;
        writeln!(f, "Searches:")?;
        writeln!(f, "  Total: {}", s.runs_total)?;
        writeln!(f, "  Blocked: {}", s.runs_blocked)?;
        writeln!(f, "  Pages fetched: {}", s.pages_fetched_total)?;
        writeln!(f, "  Postings discovered: {}", s.jobs_discovered_total)?;
        for (status, count) in &s.by_status {
            writeln!(f, "  {}: {}", status, count)?;
        }
        writeln!(f)?;

        let d = &self.details;
        writeln!(f, "Details:")?;
        writeln!(f, "  Snapshots: {}", d.total)?;
        writeln!(f, "  Parsed: {}", d.parse_ok)?;
        writeln!(f, "  Blocked: {}", d.blocked)?;
        writeln!(f)?;

        writeln!(
            f,
            "Postings: {} active / {} stored",
            self.active_postings, self.total_postings
        )
    }
}

/// Formats a report as plain text
pub fn format_run_report(report: &RunReport) -> String {
    report.to_string()
}

/// Prints a report to stdout
pub fn print_run_report(report: &RunReport) {
    println!("{}", report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunStatus, SearchRunStatus, Trigger};
    use crate::storage::{NewSearchDefinition, SearchRunOutcome, SqliteStorage};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    #[test]
    fn test_no_runs() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(load_run_report(&storage, "boardone").unwrap().is_none());
    }

    #[test]
    fn test_report_aggregates_latest_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap();
        let defs: Vec<_> = ["a", "b"]
            .iter()
            .map(|name| NewSearchDefinition {
                platform: "boardone".to_string(),
                name: name.to_string(),
                keywords: "rust".to_string(),
                location: None,
                facets: BTreeMap::new(),
                enabled: true,
            })
            .collect();
        storage.sync_search_definitions(&defs, now).unwrap();
        let defs = storage.load_enabled_search_definitions("boardone").unwrap();

        let crawl = storage
            .create_crawl_run("boardone", Trigger::Schedule, true, "cafe", now)
            .unwrap();
        for (def, status, pages) in [
            (&defs[0], SearchRunStatus::Success, 4),
            (&defs[1], SearchRunStatus::Blocked, 3),
        ] {
            let id = storage.create_search_run(crawl, def.id, None, now).unwrap();
            storage
                .finish_search_run(
                    id,
                    &SearchRunOutcome {
                        status,
                        pages_fetched: pages,
                        jobs_discovered: pages * 10,
                        blocked: status == SearchRunStatus::Blocked,
                        error: None,
                    },
                    now,
                )
                .unwrap();
        }
        storage
            .finish_crawl_run(
                crawl,
                RunStatus::Partial,
                &serde_json::json!({}),
                None,
                now + Duration::seconds(90),
            )
            .unwrap();

        let report = load_run_report(&storage, "boardone").unwrap().unwrap();
        assert_eq!(report.run.id, crawl);
        assert_eq!(report.searches.runs_total, 2);
        assert_eq!(report.searches.runs_blocked, 1);
        assert_eq!(report.searches.pages_fetched_total, 7);
        assert_eq!(report.searches.jobs_discovered_total, 70);
        assert_eq!(report.searches.by_status.get("blocked"), Some(&1));

        let text = format_run_report(&report);
        assert!(text.contains("Status: partial"));
        assert!(text.contains("(90s)"));
        assert!(text.contains("Pages fetched: 7"));
        assert!(text.ends_with("Postings: 0 active / 0 stored"));
    }

    #[test]
    fn test_report_of_running_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap();
        storage
            .create_crawl_run("boardone", Trigger::Manual, false, "cafe", now)
            .unwrap();

        let report = load_run_report(&storage, "boardone").unwrap().unwrap();
        let text = report.to_string();
        assert!(text.contains("Status: running"));
        assert!(text.contains("Finished: - (still running)"));
        assert!(text.contains("Discovery enabled: false"));
        assert!(!text.contains("Error:"));
        assert_eq!(text, format_run_report(&report));
    }
}
