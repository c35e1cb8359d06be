//! End-to-end crawl runs against a mock job board

use crate::common::{memory_storage, mount_job_board, test_config};
use chrono::Utc;
use job_crawler::crawler::{CrawlController, RunOptions};
use job_crawler::storage::{DetailSelection, Storage};
use job_crawler::{RunStatus, SearchRunStatus, Trigger};
use std::collections::HashSet;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn discovery_only() -> RunOptions {
    RunOptions {
        trigger: Trigger::Manual,
        details: false,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_discovery_then_details() {
    let server = MockServer::start().await;
    mount_job_board(&server).await;
    let config = test_config(&server.uri(), 200);
    let storage = memory_storage();

    let controller = CrawlController::from_config(&config, "boardone", "hash", storage.clone())
        .expect("controller");
    let summary = controller.run(&discovery_only()).await.expect("run recorded");

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.stats.discovery.jobs_discovered, 30);
    assert_eq!(summary.stats.discovery.pages_fetched, 3);
    assert_eq!(summary.stats.discovery.new_postings, 30);
    assert_eq!(
        summary.stats.discovery.stop_reasons.get("no_main_results"),
        Some(&1)
    );

    {
        let s = storage.lock().unwrap();
        let searches = s.get_search_runs(summary.crawl_run_id).unwrap();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].status, SearchRunStatus::Success);
        assert_eq!(searches[0].pages_fetched, 3);
        assert_eq!(searches[0].jobs_discovered, 30);
        assert!(!searches[0].blocked);
        assert_eq!(s.count_page_fetches(searches[0].id).unwrap(), 3);

        let hits = s.get_search_hits(searches[0].id).unwrap();
        assert_eq!(hits.len(), 30);
        assert_eq!(hits[15].rank, 16);
        assert_eq!(hits[15].page_start, 2);

        let candidates = s
            .select_postings_for_details(
                "boardone",
                &DetailSelection {
                    last_seen_window_days: 60,
                    staleness_days: 7,
                    blocked_retry_hours: 24,
                    limit: 200,
                },
                Utc::now(),
            )
            .unwrap();
        let ids: HashSet<String> = candidates.into_iter().map(|c| c.job_id).collect();
        let expected: HashSet<String> = (1..=30).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    // Details-only run capped at ten postings
    let config = test_config(&server.uri(), 10);
    let controller = CrawlController::from_config(&config, "boardone", "hash", storage.clone())
        .expect("controller");
    let summary = controller
        .run(&RunOptions {
            trigger: Trigger::Manual,
            sync_definitions: false,
            discovery: false,
            details: true,
        })
        .await
        .expect("run recorded");

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.stats.details.selected, 10);
    assert_eq!(summary.stats.details.ok, 10);

    let s = storage.lock().unwrap();
    let totals = s.detail_totals("boardone").unwrap();
    assert_eq!(totals.total, 10);
    assert_eq!(totals.parse_ok, 10);
    let run = s.get_crawl_run(summary.crawl_run_id).unwrap();
    assert!(!run.discovery_enabled);
}

#[tokio::test]
async fn test_second_run_uses_recent_window() {
    let server = MockServer::start().await;
    mount_job_board(&server).await;
    let config = test_config(&server.uri(), 200);
    let storage = memory_storage();
    let controller = CrawlController::from_config(&config, "boardone", "hash", storage.clone())
        .expect("controller");

    let first = controller.run(&discovery_only()).await.unwrap();
    assert_eq!(first.stats.discovery.windows.get("none"), Some(&1));

    let second = controller.run(&discovery_only()).await.unwrap();
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.stats.discovery.windows.get("recent"), Some(&1));
    assert_eq!(second.stats.discovery.jobs_discovered, 30);
    assert_eq!(second.stats.discovery.new_postings, 0);

    let requests = server.received_requests().await.unwrap();
    let with_window = requests
        .iter()
        .filter(|r| r.url.query_pairs().any(|(k, v)| k == "age" && v == "1"))
        .count();
    assert_eq!(with_window, 3);

    let s = storage.lock().unwrap();
    assert_eq!(s.count_postings("boardone", true).unwrap(), 30);
    let runs = s.get_search_runs(second.crawl_run_id).unwrap();
    assert_eq!(runs[0].window_code.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_blocked_board_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
        .mount(&server)
        .await;
    let config = test_config(&server.uri(), 200);
    let storage = memory_storage();

    let controller = CrawlController::from_config(&config, "boardone", "hash", storage.clone())
        .expect("controller");
    let summary = controller.run(&RunOptions::default()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.error.is_some());
    assert_eq!(summary.stats.discovery.searches_blocked, 1);
    assert_eq!(summary.stats.discovery.blocked_pages, 3);
    // Details never ran
    assert_eq!(summary.stats.details.attempted, 0);

    let s = storage.lock().unwrap();
    let searches = s.get_search_runs(summary.crawl_run_id).unwrap();
    assert_eq!(searches[0].status, SearchRunStatus::Blocked);
    assert!(searches[0].blocked);
    assert_eq!(searches[0].pages_fetched, 3);
    assert_eq!(s.count_postings("boardone", false).unwrap(), 0);
}
