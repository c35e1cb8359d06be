//! Lifecycle passes over crawled data

use crate::common::{mount_job_board, test_config};
use chrono::{Duration, Utc};
use job_crawler::config::LifecycleSettings;
use job_crawler::crawler::{CrawlController, RunOptions};
use job_crawler::lifecycle::LifecycleMaintainer;
use job_crawler::state::PlatformAction;
use job_crawler::storage::{SqliteStorage, Storage};
use job_crawler::{RunStatus, Trigger};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::MockServer;

fn settings(stale_after_days: i64) -> LifecycleSettings {
    LifecycleSettings {
        stale_after_days,
        hard_delete_after_days: 120,
        max_crawl_age_hours: 36,
        dry_run: false,
    }
}

fn crawl_options() -> RunOptions {
    RunOptions {
        trigger: Trigger::Schedule,
        details: false,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_expire_and_reactivate() {
    let server = MockServer::start().await;
    mount_job_board(&server).await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");
    let storage = Arc::new(Mutex::new(SqliteStorage::new(&db_path).unwrap()));
    let config = test_config(&server.uri(), 200);

    let controller = CrawlController::from_config(&config, "boardone", "hash", storage.clone())
        .expect("controller");
    let crawl = controller.run(&crawl_options()).await.unwrap();
    assert_eq!(crawl.status, RunStatus::Success);

    // Everything seen before the pass counts as stale
    let later = Utc::now() + Duration::hours(1);
    let summary = LifecycleMaintainer::new(storage.clone(), settings(0), vec!["boardone".to_string()])
        .run(Trigger::Schedule, later)
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.platforms[0].action, PlatformAction::Processed);
    assert_eq!(summary.platforms[0].latest_crawl_run_id, Some(crawl.crawl_run_id));
    assert_eq!(summary.totals.stale_marked_count, 30);
    assert_eq!(summary.totals.deleted_jobs_count, 0);
    {
        let s = storage.lock().unwrap();
        assert_eq!(s.count_postings("boardone", true).unwrap(), 0);
        let posting = s.get_posting("boardone", "7").unwrap().unwrap();
        assert_eq!(posting.expire_reason.as_deref(), Some("not_seen_window"));
    }

    // Rediscovery wins over staleness
    let again = controller.run(&crawl_options()).await.unwrap();
    assert_eq!(again.stats.discovery.reactivated_postings, 30);
    assert_eq!(again.stats.discovery.new_postings, 0);

    let s = storage.lock().unwrap();
    assert_eq!(s.count_postings("boardone", true).unwrap(), 30);
    let posting = s.get_posting("boardone", "7").unwrap().unwrap();
    assert!(posting.is_active);
    assert!(posting.expired_at.is_none());
}

#[tokio::test]
async fn test_stale_crawl_blocks_lifecycle() {
    let server = MockServer::start().await;
    mount_job_board(&server).await;
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Mutex::new(
        SqliteStorage::new(&dir.path().join("jobs.db")).unwrap(),
    ));
    let config = test_config(&server.uri(), 200);

    CrawlController::from_config(&config, "boardone", "hash", storage.clone())
        .expect("controller")
        .run(&crawl_options())
        .await
        .unwrap();

    // Three days later the crawl is too old to trust
    let summary = LifecycleMaintainer::new(storage.clone(), settings(0), vec!["boardone".to_string()])
        .run(Trigger::Schedule, Utc::now() + Duration::days(3))
        .unwrap();

    assert_eq!(summary.platforms[0].action, PlatformAction::SkippedUnhealthy);
    assert_eq!(summary.totals.stale_marked_count, 0);

    let s = storage.lock().unwrap();
    assert_eq!(s.count_postings("boardone", true).unwrap(), 30);
    let actions = s.get_lifecycle_platform_actions(summary.run_id).unwrap();
    assert_eq!(
        actions,
        vec![("boardone".to_string(), PlatformAction::SkippedUnhealthy)]
    );
}
