//! Crawl run controller
//!
//! Drives one platform through a crawl run:
//! 1. Create the run row (`running`)
//! 2. Optionally sync search definitions from configuration
//! 3. Discovery for every enabled search definition
//! 4. Details phase for recently seen postings
//! 5. Finish the run with its status and stats
//!
//! Blocked searches and failed details degrade the run to `partial`;
//! anything that aborts the controller marks it `failed`.

use crate::config::{
    expand_search_entries, Budgets, Config, DetailSettings, PlatformConfig, WindowSettings,
};
use crate::crawler::details::DetailsPhase;
use crate::crawler::discovery::{DiscoveryEngine, StopReason};
use crate::crawler::window::WindowPolicy;
use crate::crawler::{with_storage, Fetcher, HttpFetcher, PageExtractor, SelectorExtractor};
use crate::output::{PhaseStatus, RunStats};
use crate::state::{RunStatus, SearchRunStatus, Trigger};
use crate::storage::{
    NewSearchDefinition, SearchDefinition, SearchRunOutcome, SqliteStorage, Storage,
};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What a crawl run should do
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub trigger: Trigger,
    /// Upsert search definitions from configuration before discovery
    pub sync_definitions: bool,
    pub discovery: bool,
    pub details: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trigger: Trigger::Schedule,
            sync_definitions: true,
            discovery: true,
            details: true,
        }
    }
}

/// Result of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlRunSummary {
    pub crawl_run_id: i64,
    pub platform: String,
    pub status: RunStatus,
    pub stats: RunStats,
    pub error: Option<String>,
}

/// Orchestrates crawl runs of a single platform
pub struct CrawlController {
    platform: PlatformConfig,
    budgets: Budgets,
    details: DetailSettings,
    window: WindowSettings,
    definitions: Vec<NewSearchDefinition>,
    config_hash: String,
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn PageExtractor>,
}

impl CrawlController {
    /// Creates a controller with explicit fetch and extraction adapters
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration
    /// * `platform` - Name of the platform to crawl
    /// * `config_hash` - Hash stored on every crawl run
    /// * `storage` - Shared storage handle
    /// * `fetcher` - Fetch adapter
    /// * `extractor` - Page extractor of the platform
    pub fn new(
        config: &Config,
        platform: &str,
        config_hash: &str,
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn PageExtractor>,
    ) -> Result<Self> {
        let platform_config = config
            .platform(platform)
            .cloned()
            .ok_or_else(|| CrawlError::UnknownPlatform(platform.to_string()))?;

        let definitions = expand_search_entries(&config.searches)
            .into_iter()
            .filter(|d| d.platform == platform)
            .collect();

        Ok(Self {
            platform: platform_config,
            budgets: config.budgets.clone(),
            details: config.details.clone(),
            window: config.window.clone(),
            definitions,
            config_hash: config_hash.to_string(),
            storage,
            fetcher,
            extractor,
        })
    }

    /// Creates a controller using the HTTP fetcher and the selector extractor
    pub fn from_config(
        config: &Config,
        platform: &str,
        config_hash: &str,
        storage: Arc<Mutex<SqliteStorage>>,
    ) -> Result<Self> {
        let platform_config = config
            .platform(platform)
            .ok_or_else(|| CrawlError::UnknownPlatform(platform.to_string()))?;
        let fetcher = Arc::new(HttpFetcher::new(&config.user_agent)?);
        let extractor = Arc::new(SelectorExtractor::new(&platform_config.selectors)?);
        Self::new(config, platform, config_hash, storage, fetcher, extractor)
    }

    pub fn platform(&self) -> &str {
        &self.platform.name
    }

    /// Executes one crawl run and records its outcome
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlRunSummary)` - The run was recorded; its status tells how it went
    /// * `Err(CrawlError)` - The run row itself could not be created or finished
    pub async fn run(&self, options: &RunOptions) -> Result<CrawlRunSummary> {
        let deadline = Instant::now() + Duration::from_secs(self.budgets.max_run_seconds);

        let crawl_run_id = with_storage(&self.storage, |s| {
            s.create_crawl_run(
                &self.platform.name,
                options.trigger,
                options.discovery,
                &self.config_hash,
                Utc::now(),
            )
        })?;
        tracing::info!(
            "Started crawl run {} for {} ({})",
            crawl_run_id,
            self.platform.name,
            options.trigger
        );

        let mut stats = RunStats::default();
        let result = self.execute(crawl_run_id, options, deadline, &mut stats).await;
        let (status, error) = match result {
            Ok(()) if stats.discovery.blocked_from_start() => (
                RunStatus::Failed,
                Some("blocked before any result page was fetched".to_string()),
            ),
            Ok(()) => (stats.final_status(), None),
            Err(e) => {
                tracing::error!("Crawl run {} aborted: {}", crawl_run_id, e);
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        with_storage(&self.storage, |s| {
            s.finish_crawl_run(
                crawl_run_id,
                status,
                &stats.to_json(),
                error.as_deref(),
                Utc::now(),
            )
        })?;
        tracing::info!(
            "Crawl run {} for {} finished: {} ({} postings discovered, {} details)",
            crawl_run_id,
            self.platform.name,
            status,
            stats.discovery.jobs_discovered,
            stats.details.ok
        );

        Ok(CrawlRunSummary {
            crawl_run_id,
            platform: self.platform.name.clone(),
            status,
            stats,
            error,
        })
    }

    async fn execute(
        &self,
        crawl_run_id: i64,
        options: &RunOptions,
        deadline: Instant,
        stats: &mut RunStats,
    ) -> Result<()> {
        if options.sync_definitions {
            let synced = with_storage(&self.storage, |s| {
                s.sync_search_definitions(&self.definitions, Utc::now())
            })?;
            tracing::debug!("Synced {} search definitions", synced);
            stats.synced_definitions = Some(synced);
        }

        if options.discovery {
            let searches = with_storage(&self.storage, |s| {
                s.load_enabled_search_definitions(&self.platform.name)
            })?;
            if searches.is_empty() {
                return Err(CrawlError::NoSearches(self.platform.name.clone()));
            }

            self.run_discovery(crawl_run_id, &searches, deadline, stats)
                .await;

            if stats.discovery.blocked_from_start() {
                tracing::error!(
                    "{}: every search was blocked, skipping details",
                    self.platform.name
                );
                return Ok(());
            }
        }

        if options.details && self.details.enabled && !stats.deadline_reached {
            let phase = DetailsPhase::new(
                &self.platform,
                &self.details,
                self.budgets.circuit_breaker_blocks,
                self.fetcher.as_ref(),
                self.extractor.as_ref(),
            )
            .with_deadline(deadline);

            match phase
                .run(&self.storage, Utc::now(), &mut stats.deadline_reached)
                .await
            {
                Ok(details) => stats.details = details,
                Err(e) => {
                    tracing::error!("{}: details phase failed: {}", self.platform.name, e);
                    stats.details.phase = PhaseStatus::Failed;
                    stats.details.error = Some(e.to_string());
                }
            }
        }

        Ok(())
    }

    async fn run_discovery(
        &self,
        crawl_run_id: i64,
        searches: &[SearchDefinition],
        deadline: Instant,
        stats: &mut RunStats,
    ) {
        let policy = WindowPolicy::new(&self.window, &self.platform.window);
        let engine = DiscoveryEngine::new(
            &self.platform,
            &self.budgets,
            self.fetcher.as_ref(),
            self.extractor.as_ref(),
        )
        .with_deadline(deadline);

        stats.discovery.searches_total = searches.len() as u32;
        stats.discovery.phase = PhaseStatus::Completed;

        for definition in searches {
            if Instant::now() >= deadline {
                tracing::warn!("{}: run deadline reached during discovery", self.platform.name);
                stats.deadline_reached = true;
                stats.discovery.phase = PhaseStatus::Stopped;
                break;
            }

            if let Err(e) = self
                .run_search(crawl_run_id, definition, &policy, &engine, stats)
                .await
            {
                tracing::error!("{}: search failed: {}", definition.name, e);
                stats.discovery.searches_failed += 1;
            }
        }

        if stats.deadline_reached {
            stats.discovery.phase = PhaseStatus::Stopped;
        }
    }

    async fn run_search(
        &self,
        crawl_run_id: i64,
        definition: &SearchDefinition,
        policy: &WindowPolicy<'_>,
        engine: &DiscoveryEngine<'_>,
        stats: &mut RunStats,
    ) -> Result<()> {
        let now = Utc::now();
        let decision = with_storage(&self.storage, |s| policy.resolve(&*s, definition, now))?;
        let search_run_id = with_storage(&self.storage, |s| {
            s.create_search_run(crawl_run_id, definition.id, decision.code(), now)
        })?;
        *stats
            .discovery
            .windows
            .entry(decision.label().to_string())
            .or_default() += 1;
        tracing::info!(
            "{}: discovery with window {} ({:?})",
            definition.name,
            decision.label(),
            decision.code()
        );

        let outcome = match engine.discover(definition, decision.code()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_search_run(search_run_id, &e.to_string());
                return Err(e.into());
            }
        };

        let write = with_storage(&self.storage, |s| {
            s.record_page_fetches(search_run_id, &outcome.events)?;
            s.record_discovery(
                &self.platform.name,
                search_run_id,
                &outcome.postings,
                Utc::now(),
            )
        });
        let write = match write {
            Ok(write) => write,
            Err(e) => {
                self.fail_search_run(search_run_id, &e.to_string());
                return Err(e);
            }
        };

        let status = if outcome.blocked {
            SearchRunStatus::Blocked
        } else {
            SearchRunStatus::Success
        };
        with_storage(&self.storage, |s| {
            s.finish_search_run(
                search_run_id,
                &SearchRunOutcome {
                    status,
                    pages_fetched: outcome.pages_fetched,
                    jobs_discovered: outcome.jobs_discovered(),
                    blocked: outcome.blocked,
                    error: outcome
                        .blocked
                        .then(|| "circuit breaker tripped".to_string()),
                },
                Utc::now(),
            )
        })?;

        let d = &mut stats.discovery;
        if outcome.blocked {
            d.searches_blocked += 1;
        } else {
            d.searches_succeeded += 1;
        }
        d.pages_fetched += outcome.pages_fetched;
        d.unblocked_pages += outcome.unblocked_pages;
        d.blocked_pages += outcome.blocked_pages;
        d.fetch_errors += outcome.fetch_errors;
        d.jobs_discovered += outcome.jobs_discovered();
        d.duplicates += outcome.duplicates;
        d.new_postings += write.new_postings;
        d.reactivated_postings += write.reactivated;
        d.hits_inserted += write.hits_inserted;
        *d.stop_reasons
            .entry(outcome.stop_reason.as_str().to_string())
            .or_default() += 1;

        if outcome.stop_reason == StopReason::Deadline {
            stats.deadline_reached = true;
        }

        tracing::info!(
            "{}: {} ({} pages, {} postings, {} new)",
            definition.name,
            status,
            outcome.pages_fetched,
            outcome.jobs_discovered(),
            write.new_postings
        );
        Ok(())
    }

    /// Best-effort transition of a search run to `failed`
    fn fail_search_run(&self, search_run_id: i64, error: &str) {
        let result = with_storage(&self.storage, |s| {
            s.finish_search_run(
                search_run_id,
                &SearchRunOutcome {
                    status: SearchRunStatus::Failed,
                    pages_fetched: 0,
                    jobs_discovered: 0,
                    blocked: false,
                    error: Some(error.to_string()),
                },
                Utc::now(),
            )
        });
        if let Err(e) = result {
            tracing::error!("Could not mark search run {} failed: {}", search_run_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchEntry;
    use crate::crawler::test_support::{
        blocked, detail_html, list_html, ok, test_platform, Scripted, ScriptedFetcher,
    };
    use std::collections::BTreeMap;

    fn config(keywords: &[&str]) -> Config {
        Config {
            database: crate::config::DatabaseConfig {
                path: ":memory:".to_string(),
            },
            user_agent: crate::config::UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                accept_language: "en-US".to_string(),
                timeout_secs: 5,
            },
            budgets: Budgets::default(),
            details: DetailSettings::default(),
            window: WindowSettings::default(),
            lifecycle: Default::default(),
            platforms: vec![test_platform()],
            searches: vec![SearchEntry {
                name: "rust".to_string(),
                platform: "boardone".to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                locations: Vec::new(),
                enabled: true,
                facets: BTreeMap::new(),
            }],
        }
    }

    fn controller(config: &Config, script: Vec<Scripted>) -> (CrawlController, Arc<Mutex<SqliteStorage>>) {
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let platform = test_platform();
        let controller = CrawlController::new(
            config,
            "boardone",
            "hash",
            storage.clone(),
            Arc::new(ScriptedFetcher::new(script)),
            Arc::new(SelectorExtractor::new(&platform.selectors).unwrap()),
        )
        .unwrap();
        (controller, storage)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let config = config(&["rust"]);
        let (controller, storage) = controller(
            &config,
            vec![
                ok(&list_html(&[1, 2])),
                ok(&list_html(&[])),
                ok(&detail_html("One")),
                ok(&detail_html("Two")),
            ],
        );

        let summary = controller.run(&RunOptions::default()).await.unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.stats.discovery.jobs_discovered, 2);
        assert_eq!(summary.stats.discovery.new_postings, 2);
        assert_eq!(summary.stats.details.ok, 2);
        assert_eq!(summary.stats.synced_definitions, Some(1));

        let s = storage.lock().unwrap();
        let run = s.get_crawl_run(summary.crawl_run_id).unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.finished_at.is_some());
        let stats = run.stats.unwrap();
        assert_eq!(stats["discovery"]["jobs_discovered"], 2);

        let searches = s.get_search_runs(summary.crawl_run_id).unwrap();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].status, SearchRunStatus::Success);
        assert_eq!(searches[0].pages_fetched, 2);
        assert_eq!(searches[0].window_code, None);
    }

    #[tokio::test]
    async fn test_blocked_search_makes_run_partial() {
        let config = config(&["rust", "go"]);
        let (controller, storage) = controller(
            &config,
            vec![
                // "rust" search: one good page, then empty
                ok(&list_html(&[1])),
                ok(&list_html(&[])),
                // "go" search: breaker
                blocked(),
                blocked(),
                blocked(),
                ok(&detail_html("One")),
            ],
        );
        let options = RunOptions {
            trigger: Trigger::Manual,
            ..RunOptions::default()
        };

        let summary = controller.run(&options).await.unwrap();
        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.stats.discovery.searches_blocked, 1);

        let s = storage.lock().unwrap();
        let searches = s.get_search_runs(summary.crawl_run_id).unwrap();
        let statuses: Vec<_> = searches.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![SearchRunStatus::Success, SearchRunStatus::Blocked]
        );
        assert!(searches[1].blocked);
    }

    #[tokio::test]
    async fn test_blocked_from_first_page_fails_run() {
        let config = config(&["rust"]);
        let (controller, _storage) =
            controller(&config, vec![blocked(), blocked(), blocked()]);

        let summary = controller.run(&RunOptions::default()).await.unwrap();
        assert_eq!(summary.status, RunStatus::Failed);
        assert!(summary.error.is_some());
        assert_eq!(summary.stats.details.phase, PhaseStatus::Skipped);
    }

    #[tokio::test]
    async fn test_no_enabled_searches_fails_run() {
        let config = config(&["rust"]);
        let (controller, storage) = controller(&config, vec![]);
        let options = RunOptions {
            sync_definitions: false,
            ..RunOptions::default()
        };

        let summary = controller.run(&options).await.unwrap();
        assert_eq!(summary.status, RunStatus::Failed);

        let s = storage.lock().unwrap();
        let run = s.get_crawl_run(summary.crawl_run_id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("boardone"));
    }

    #[tokio::test]
    async fn test_details_only_run() {
        let config = config(&["rust"]);
        let (controller, _storage) = controller(&config, vec![]);
        let options = RunOptions {
            discovery: false,
            ..RunOptions::default()
        };

        let summary = controller.run(&options).await.unwrap();
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.stats.discovery.phase, PhaseStatus::Skipped);
        assert_eq!(summary.stats.details.selected, 0);
    }

    #[test]
    fn test_unknown_platform() {
        let config = config(&["rust"]);
        let storage = Arc::new(Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let result = CrawlController::from_config(&config, "nowhere", "hash", storage);
        assert!(matches!(result, Err(CrawlError::UnknownPlatform(_))));
    }
}
