//! Lifecycle maintainer
//!
//! One pass over every configured platform:
//! - gate on the health of the latest discovery crawl
//! - soft-expire postings not seen for `stale_after_days`
//! - hard-delete postings not seen for `hard_delete_after_days`
//!
//! In dry-run mode candidate counts are recorded and nothing is mutated.

use crate::config::{Config, LifecycleSettings};
use crate::crawler::with_storage;
use crate::lifecycle::health::{evaluate_health, HealthGate};
use crate::state::{PlatformAction, RunStatus, Trigger};
use crate::storage::{
    LifecycleCounts, LifecycleCutoffs, LifecyclePlatformRow, SqliteStorage, Storage, StorageResult,
};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Outcome of one platform within a lifecycle pass
#[derive(Debug, Clone, Serialize)]
pub struct PlatformLifecycle {
    pub platform: String,
    #[serde(serialize_with = "serialize_action")]
    pub action: PlatformAction,
    pub latest_crawl_run_id: Option<i64>,
    #[serde(skip)]
    pub latest_crawl_status: Option<RunStatus>,
    pub latest_crawl_finished_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub counts: LifecycleCounts,
}

fn serialize_action<S: serde::Serializer>(
    action: &PlatformAction,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(action.to_db_string())
}

/// Result of a lifecycle pass
#[derive(Debug, Clone)]
pub struct LifecycleSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub dry_run: bool,
    pub platforms: Vec<PlatformLifecycle>,
    pub totals: LifecycleCounts,
}

impl LifecycleSummary {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status.to_db_string(),
            "dry_run": self.dry_run,
            "platforms": self.platforms,
            "totals": self.totals,
        })
    }
}

/// Final status of a pass from its platform actions
///
/// Success when no platform failed, failed when every platform failed.
fn pass_status(platforms: &[PlatformLifecycle]) -> RunStatus {
    let failed = platforms
        .iter()
        .filter(|p| p.action == PlatformAction::Failed)
        .count();
    if failed == 0 {
        RunStatus::Success
    } else if failed == platforms.len() {
        RunStatus::Failed
    } else {
        RunStatus::Partial
    }
}

/// Demotes stale postings and deletes old ones
pub struct LifecycleMaintainer {
    storage: Arc<Mutex<SqliteStorage>>,
    settings: LifecycleSettings,
    platforms: Vec<String>,
}

impl LifecycleMaintainer {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        settings: LifecycleSettings,
        platforms: Vec<String>,
    ) -> Self {
        Self {
            storage,
            settings,
            platforms,
        }
    }

    /// Maintainer over every platform of the configuration
    pub fn from_config(config: &Config, storage: Arc<Mutex<SqliteStorage>>) -> Self {
        let platforms = config.platforms.iter().map(|p| p.name.clone()).collect();
        Self::new(storage, config.lifecycle.clone(), platforms)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.settings.dry_run = dry_run;
        self
    }

    fn cutoffs(&self, now: DateTime<Utc>) -> LifecycleCutoffs {
        LifecycleCutoffs {
            stale_before: now - Duration::days(self.settings.stale_after_days),
            delete_before: now - Duration::days(self.settings.hard_delete_after_days),
        }
    }

    /// Runs one pass and records it as a lifecycle run
    ///
    /// A platform whose processing fails is rolled back and recorded as
    /// `failed`; the pass continues with the next platform.
    pub fn run(&self, trigger: Trigger, now: DateTime<Utc>) -> Result<LifecycleSummary> {
        let s = &self.settings;
        let run_id = with_storage(&self.storage, |st| {
            st.create_lifecycle_run(
                trigger,
                s.stale_after_days,
                s.hard_delete_after_days,
                s.max_crawl_age_hours,
                s.dry_run,
                now,
            )
        })?;
        tracing::info!(
            "Started lifecycle run {} ({}, dry_run={})",
            run_id,
            trigger,
            s.dry_run
        );

        match self.process_all(run_id, now) {
            Ok(platforms) => {
                let mut totals = LifecycleCounts::default();
                for p in &platforms {
                    totals += p.counts;
                }
                let summary = LifecycleSummary {
                    run_id,
                    status: pass_status(&platforms),
                    dry_run: s.dry_run,
                    platforms,
                    totals,
                };
                with_storage(&self.storage, |st| {
                    st.finish_lifecycle_run(run_id, summary.status, &summary.to_json(), None, now)
                })?;
                let skipped = summary
                    .platforms
                    .iter()
                    .filter(|p| p.action.is_skipped())
                    .count();
                tracing::info!(
                    "Lifecycle run {} finished: {} ({} marked stale, {} deleted, {} platforms skipped)",
                    run_id,
                    summary.status,
                    summary.totals.stale_marked_count,
                    summary.totals.deleted_jobs_count,
                    skipped
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Lifecycle run {} aborted: {}", run_id, e);
                let message = e.to_string();
                let finished = with_storage(&self.storage, |st| {
                    st.finish_lifecycle_run(
                        run_id,
                        RunStatus::Failed,
                        &serde_json::Value::Null,
                        Some(&message),
                        now,
                    )
                });
                if let Err(finish_err) = finished {
                    tracing::error!("Could not finish lifecycle run {}: {}", run_id, finish_err);
                }
                Err(e)
            }
        }
    }

    fn process_all(&self, run_id: i64, now: DateTime<Utc>) -> Result<Vec<PlatformLifecycle>> {
        let cutoffs = self.cutoffs(now);
        let mut results = Vec::with_capacity(self.platforms.len());

        for platform in &self.platforms {
            let result = with_storage(&self.storage, |st| {
                let outcome = match self.process_platform(st, platform, &cutoffs, now) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("{}: lifecycle failed: {}", platform, e);
                        PlatformLifecycle {
                            platform: platform.clone(),
                            action: PlatformAction::Failed,
                            latest_crawl_run_id: None,
                            latest_crawl_status: None,
                            latest_crawl_finished_at: None,
                            note: Some(e.to_string()),
                            counts: LifecycleCounts::default(),
                        }
                    }
                };
                st.record_lifecycle_platform(
                    run_id,
                    &LifecyclePlatformRow {
                        platform,
                        action: outcome.action,
                        latest_crawl_run_id: outcome.latest_crawl_run_id,
                        latest_crawl_status: outcome.latest_crawl_status,
                        latest_crawl_finished_at: outcome.latest_crawl_finished_at,
                        counts: outcome.counts,
                        note: outcome.note.as_deref(),
                    },
                )?;
                Ok(outcome)
            })?;
            results.push(result);
        }

        Ok(results)
    }

    fn process_platform(
        &self,
        st: &mut SqliteStorage,
        platform: &str,
        cutoffs: &LifecycleCutoffs,
        now: DateTime<Utc>,
    ) -> StorageResult<PlatformLifecycle> {
        let latest = st.get_latest_discovery_crawl_run(platform)?;
        let latest_crawl_run_id = latest.as_ref().map(|r| r.id);
        let latest_crawl_status = latest.as_ref().map(|r| r.status);
        let latest_crawl_finished_at = latest.as_ref().and_then(|r| r.finished_at);

        if let HealthGate::Skip { action, note } =
            evaluate_health(latest.as_ref(), now, self.settings.max_crawl_age_hours)
        {
            tracing::warn!("{}: lifecycle skipped: {}", platform, note);
            return Ok(PlatformLifecycle {
                platform: platform.to_string(),
                action,
                latest_crawl_run_id,
                latest_crawl_status,
                latest_crawl_finished_at,
                note: Some(note),
                counts: LifecycleCounts::default(),
            });
        }

        let (counts, note) = if self.settings.dry_run {
            (
                st.count_lifecycle_candidates(platform, cutoffs)?,
                Some("dry run".to_string()),
            )
        } else {
            (st.apply_lifecycle(platform, cutoffs, now)?, None)
        };

        tracing::info!(
            "{}: {} stale, {} hard-delete candidates, {} deleted",
            platform,
            counts.stale_marked_count,
            counts.hard_delete_candidate_count,
            counts.deleted_jobs_count
        );

        Ok(PlatformLifecycle {
            platform: platform.to_string(),
            action: PlatformAction::Processed,
            latest_crawl_run_id,
            latest_crawl_status,
            latest_crawl_finished_at,
            note,
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::DiscoveredPosting;
    use crate::storage::NewSearchDefinition;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 4, 0, 0).unwrap()
    }

    fn settings(dry_run: bool) -> LifecycleSettings {
        LifecycleSettings {
            stale_after_days: 60,
            hard_delete_after_days: 120,
            max_crawl_age_hours: 36,
            dry_run,
        }
    }

    /// Records a finished crawl run that saw `job_ids` at `seen_at`
    fn seed_run(
        storage: &mut SqliteStorage,
        platform: &str,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        job_ids: &[&str],
        seen_at: DateTime<Utc>,
    ) -> i64 {
        storage
            .sync_search_definitions(
                &[NewSearchDefinition {
                    platform: platform.to_string(),
                    name: "all".to_string(),
                    keywords: "engineer".to_string(),
                    location: None,
                    facets: BTreeMap::new(),
                    enabled: true,
                }],
                seen_at,
            )
            .unwrap();
        let definition = storage.load_enabled_search_definitions(platform).unwrap()[0].id;
        let crawl = storage
            .create_crawl_run(platform, Trigger::Schedule, true, "h", seen_at)
            .unwrap();
        let search = storage
            .create_search_run(crawl, definition, None, seen_at)
            .unwrap();
        let postings: Vec<_> = job_ids
            .iter()
            .enumerate()
            .map(|(i, id)| DiscoveredPosting {
                job_id: id.to_string(),
                job_url: format!("https://jobs.example.com/{}", id),
                rank: i as u32 + 1,
                page_start: 1,
            })
            .collect();
        storage
            .record_discovery(platform, search, &postings, seen_at)
            .unwrap();
        storage
            .finish_crawl_run(crawl, status, &serde_json::json!({}), None, finished_at)
            .unwrap();
        crawl
    }

    fn boardone_maintainer(storage: Arc<Mutex<SqliteStorage>>) -> LifecycleMaintainer {
        LifecycleMaintainer::new(storage, settings(false), vec!["boardone".to_string()])
    }

    fn shared(storage: SqliteStorage) -> Arc<Mutex<SqliteStorage>> {
        Arc::new(Mutex::new(storage))
    }

    #[test]
    fn test_healthy_platform_is_processed() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        seed_run(
            &mut storage,
            "boardone",
            RunStatus::Success,
            now() - Duration::days(130),
            &["ancient"],
            now() - Duration::days(130),
        );
        seed_run(
            &mut storage,
            "boardone",
            RunStatus::Success,
            now() - Duration::days(70),
            &["old"],
            now() - Duration::days(70),
        );
        seed_run(
            &mut storage,
            "boardone",
            RunStatus::Success,
            now() - Duration::hours(2),
            &["fresh"],
            now() - Duration::hours(3),
        );
        let storage = shared(storage);

        let summary = boardone_maintainer(storage.clone())
            .run(Trigger::Manual, now())
            .unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.platforms[0].action, PlatformAction::Processed);
        assert_eq!(summary.totals.stale_marked_count, 2);
        assert_eq!(summary.totals.deleted_jobs_count, 1);
        assert_eq!(summary.totals.deleted_hits_count, 1);

        let s = storage.lock().unwrap();
        assert!(s.get_posting("boardone", "ancient").unwrap().is_none());
        let old = s.get_posting("boardone", "old").unwrap().unwrap();
        assert!(!old.is_active);
        assert_eq!(old.expired_at, Some(now()));
        assert!(s.get_posting("boardone", "fresh").unwrap().unwrap().is_active);

        let (status, stored) = s.get_lifecycle_run(summary.run_id).unwrap();
        assert_eq!(status, RunStatus::Success);
        let stored = stored.unwrap();
        assert_eq!(stored["totals"]["deleted_jobs_count"], 1);
        assert_eq!(stored["platforms"][0]["action"], "processed");
    }

    #[test]
    fn test_failed_latest_run_blocks_mutation() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        seed_run(
            &mut storage,
            "boardone",
            RunStatus::Failed,
            now() - Duration::hours(1),
            &["old"],
            now() - Duration::days(200),
        );
        let storage = shared(storage);

        let summary = boardone_maintainer(storage.clone())
            .run(Trigger::Schedule, now())
            .unwrap();

        let platform = &summary.platforms[0];
        assert_eq!(platform.action, PlatformAction::SkippedUnhealthy);
        assert!(platform.note.as_deref().unwrap_or("").contains("failed"));
        assert_eq!(summary.totals, LifecycleCounts::default());
        // A skip is not a failure of the pass
        assert_eq!(summary.status, RunStatus::Success);

        let s = storage.lock().unwrap();
        let posting = s.get_posting("boardone", "old").unwrap().unwrap();
        assert!(posting.is_active);
    }

    #[test]
    fn test_dry_run_counts_without_mutating() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        seed_run(
            &mut storage,
            "boardone",
            RunStatus::Success,
            now() - Duration::hours(1),
            &["a", "b"],
            now() - Duration::days(150),
        );
        let storage = shared(storage);

        let summary = boardone_maintainer(storage.clone())
            .with_dry_run(true)
            .run(Trigger::Manual, now())
            .unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.totals.stale_marked_count, 2);
        assert_eq!(summary.totals.hard_delete_candidate_count, 2);
        assert_eq!(summary.totals.deleted_jobs_count, 0);

        let s = storage.lock().unwrap();
        assert_eq!(s.count_postings("boardone", true).unwrap(), 2);
    }

    #[test]
    fn test_platform_without_runs_is_skipped() {
        let storage = shared(SqliteStorage::open_in_memory().unwrap());
        let summary = LifecycleMaintainer::new(
            storage.clone(),
            settings(false),
            vec!["boardone".to_string(), "boardtwo".to_string()],
        )
        .run(Trigger::Schedule, now())
        .unwrap();

        assert_eq!(summary.platforms.len(), 2);
        assert!(summary.platforms.iter().all(|p| p.action == PlatformAction::SkippedNoRecentRun));

        let s = storage.lock().unwrap();
        let actions = s.get_lifecycle_platform_actions(summary.run_id).unwrap();
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn test_details_only_runs_ignored_by_gate() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        seed_run(
            &mut storage,
            "boardone",
            RunStatus::Success,
            now() - Duration::days(5),
            &["a"],
            now() - Duration::days(100),
        );
        let details_only = storage
            .create_crawl_run("boardone", Trigger::Manual, false, "h", now() - Duration::hours(2))
            .unwrap();
        storage
            .finish_crawl_run(
                details_only,
                RunStatus::Success,
                &serde_json::json!({}),
                None,
                now() - Duration::hours(1),
            )
            .unwrap();
        let storage = shared(storage);

        let summary = boardone_maintainer(storage)
            .run(Trigger::Schedule, now())
            .unwrap();
        assert_eq!(summary.platforms[0].action, PlatformAction::SkippedUnhealthy);
        assert_ne!(summary.platforms[0].latest_crawl_run_id, Some(details_only));
    }

    #[test]
    fn test_pass_status() {
        let row = |action| PlatformLifecycle {
            platform: "p".to_string(),
            action,
            latest_crawl_run_id: None,
            latest_crawl_status: None,
            latest_crawl_finished_at: None,
            note: None,
            counts: LifecycleCounts::default(),
        };
        assert_eq!(pass_status(&[]), RunStatus::Success);
        assert_eq!(
            pass_status(&[row(PlatformAction::Processed), row(PlatformAction::Failed)]),
            RunStatus::Partial
        );
        assert_eq!(pass_status(&[row(PlatformAction::Failed)]), RunStatus::Failed);
        assert_eq!(
            pass_status(&[row(PlatformAction::SkippedUnhealthy)]),
            RunStatus::Success
        );
    }
}
