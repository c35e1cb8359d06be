//! Crawl health gate
//!
//! Lifecycle decisions are only as good as the discovery signal behind them.
//! A platform is processed only when its latest crawl run with discovery
//! enabled succeeded recently.

use crate::state::{PlatformAction, RunStatus};
use crate::storage::CrawlRunRecord;
use chrono::{DateTime, Duration, Utc};

/// Verdict of the health gate for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthGate {
    Pass,
    Skip { action: PlatformAction, note: String },
}

impl HealthGate {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Evaluates the gate against the latest crawl run with discovery enabled
///
/// A run still in progress counts as unhealthy. The age limit is inclusive.
pub fn evaluate_health(
    latest: Option<&CrawlRunRecord>,
    now: DateTime<Utc>,
    max_crawl_age_hours: i64,
) -> HealthGate {
    let Some(run) = latest else {
        return HealthGate::Skip {
            action: PlatformAction::SkippedNoRecentRun,
            note: "no crawl run with discovery enabled".to_string(),
        };
    };

    if run.status != RunStatus::Success {
        return HealthGate::Skip {
            action: PlatformAction::SkippedUnhealthy,
            note: format!("latest crawl run {} is {}", run.id, run.status),
        };
    }

    let Some(finished_at) = run.finished_at else {
        return HealthGate::Skip {
            action: PlatformAction::SkippedUnhealthy,
            note: format!("latest crawl run {} has no finish time", run.id),
        };
    };

    if now - finished_at > Duration::hours(max_crawl_age_hours) {
        return HealthGate::Skip {
            action: PlatformAction::SkippedUnhealthy,
            note: format!(
                "latest crawl run {} finished {}h ago (limit {}h)",
                run.id,
                (now - finished_at).num_hours(),
                max_crawl_age_hours
            ),
        };
    }

    HealthGate::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Trigger;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 6, 0, 0).unwrap()
    }

    fn run(status: RunStatus, finished_hours_ago: Option<i64>) -> CrawlRunRecord {
        CrawlRunRecord {
            id: 7,
            platform: "boardone".to_string(),
            trigger: Trigger::Schedule,
            status,
            started_at: now() - Duration::hours(48),
            finished_at: finished_hours_ago.map(|h| now() - Duration::hours(h)),
            discovery_enabled: true,
            config_hash: "h".to_string(),
            stats: None,
            error: None,
        }
    }

    #[test]
    fn test_no_run_skips() {
        let gate = evaluate_health(None, now(), 36);
        assert!(matches!(
            gate,
            HealthGate::Skip {
                action: PlatformAction::SkippedNoRecentRun,
                ..
            }
        ));
    }

    #[test]
    fn test_recent_success_passes() {
        assert!(evaluate_health(Some(&run(RunStatus::Success, Some(2))), now(), 36).passed());
        assert!(evaluate_health(Some(&run(RunStatus::Success, Some(36))), now(), 36).passed());
    }

    #[test]
    fn test_unhealthy_runs_skip() {
        for record in [
            run(RunStatus::Failed, Some(1)),
            run(RunStatus::Partial, Some(1)),
            run(RunStatus::Running, None),
            run(RunStatus::Success, Some(37)),
        ] {
            match evaluate_health(Some(&record), now(), 36) {
                HealthGate::Skip { action, note } => {
                    assert_eq!(action, PlatformAction::SkippedUnhealthy);
                    assert!(note.contains("crawl run 7"));
                }
                HealthGate::Pass => panic!("{:?} should not pass", record.status),
            }
        }
    }
}
