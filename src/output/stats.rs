//! Crawl run statistics
//!
//! Counters accumulated by the controller while a run executes. They are
//! stored as JSON on the crawl run row and decide its final status.

use crate::state::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a phase of a crawl run ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Phase did not run
    #[default]
    Skipped,
    /// Phase ran to the end of its work
    Completed,
    /// Phase ended early on a circuit breaker or the run deadline
    Stopped,
    /// Phase aborted on an error
    Failed,
}

/// Discovery phase counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub phase: PhaseStatus,
    pub searches_total: u32,
    pub searches_succeeded: u32,
    pub searches_blocked: u32,
    pub searches_failed: u32,
    pub pages_fetched: u32,
    pub unblocked_pages: u32,
    pub blocked_pages: u32,
    pub fetch_errors: u32,
    pub jobs_discovered: u32,
    pub new_postings: u32,
    pub reactivated_postings: u32,
    pub duplicates: u32,
    pub hits_inserted: u32,
    /// Stop reason -> number of searches
    pub stop_reasons: BTreeMap<String, u32>,
    /// Window decision -> number of searches
    pub windows: BTreeMap<String, u32>,
}

impl DiscoveryStats {
    /// True when searches were blocked and not a single page got through
    pub fn blocked_from_start(&self) -> bool {
        self.searches_blocked > 0 && self.unblocked_pages == 0
    }
}

/// Details phase counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailStats {
    pub phase: PhaseStatus,
    pub selected: u32,
    pub attempted: u32,
    pub ok: u32,
    pub parse_failed: u32,
    pub blocked: u32,
    pub transient_errors: u32,
    pub retries: u32,
    pub circuit_breaker_tripped: bool,
    pub error: Option<String>,
}

/// Everything recorded about one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub synced_definitions: Option<usize>,
    pub discovery: DiscoveryStats,
    pub details: DetailStats,
    pub deadline_reached: bool,
}

impl RunStats {
    /// Final status of a run that was not aborted
    ///
    /// Partial when any search was blocked or failed, or when any detail
    /// could not be stored as parsed.
    pub fn final_status(&self) -> RunStatus {
        let d = &self.discovery;
        let t = &self.details;
        let degraded = d.searches_blocked > 0
            || d.searches_failed > 0
            || t.parse_failed > 0
            || t.blocked > 0
            || t.transient_errors > 0
            || t.phase == PhaseStatus::Failed;
        if degraded {
            RunStatus::Partial
        } else {
            RunStatus::Success
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Plain structs of integers and strings always serialize
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_run_is_success() {
        let stats = RunStats::default();
        assert_eq!(stats.final_status(), RunStatus::Success);
    }

    #[test]
    fn test_blocked_search_is_partial() {
        let mut stats = RunStats::default();
        stats.discovery.searches_blocked = 1;
        stats.discovery.unblocked_pages = 4;
        assert_eq!(stats.final_status(), RunStatus::Partial);
        assert!(!stats.discovery.blocked_from_start());
    }

    #[test]
    fn test_parse_failure_is_partial() {
        let mut stats = RunStats::default();
        stats.details.parse_failed = 2;
        assert_eq!(stats.final_status(), RunStatus::Partial);
    }

    #[test]
    fn test_blocked_from_start() {
        let mut stats = RunStats::default();
        stats.discovery.searches_blocked = 2;
        assert!(stats.discovery.blocked_from_start());
    }

    #[test]
    fn test_stats_json_shape() {
        let mut stats = RunStats::default();
        stats.discovery.phase = PhaseStatus::Completed;
        stats
            .discovery
            .stop_reasons
            .insert("no_main_results".to_string(), 1);
        let json = stats.to_json();

        assert_eq!(json["discovery"]["phase"], "completed");
        assert_eq!(json["discovery"]["stop_reasons"]["no_main_results"], 1);
        assert_eq!(json["details"]["phase"], "skipped");

        let back: RunStats = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }
}
