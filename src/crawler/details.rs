//! Details phase: refresh detail snapshots of recently seen postings

use crate::config::{DetailSettings, PlatformConfig};
use crate::crawler::block::is_blocked;
use crate::crawler::{with_storage, DetailRecord, FetchError, FetchResponse, Fetcher, PageExtractor};
use crate::output::{DetailStats, PhaseStatus};
use crate::storage::{DetailSelection, SqliteStorage, Storage};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fetches and stores detail pages for one platform
pub struct DetailsPhase<'a> {
    platform: &'a PlatformConfig,
    settings: &'a DetailSettings,
    breaker_blocks: u32,
    fetcher: &'a dyn Fetcher,
    extractor: &'a dyn PageExtractor,
    deadline: Option<Instant>,
}

impl<'a> DetailsPhase<'a> {
    pub fn new(
        platform: &'a PlatformConfig,
        settings: &'a DetailSettings,
        breaker_blocks: u32,
        fetcher: &'a dyn Fetcher,
        extractor: &'a dyn PageExtractor,
    ) -> Self {
        Self {
            platform,
            settings,
            breaker_blocks,
            fetcher,
            extractor,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn selection(&self) -> DetailSelection {
        DetailSelection {
            last_seen_window_days: self.settings.last_seen_window_days,
            staleness_days: self.settings.staleness_days,
            blocked_retry_hours: self.settings.blocked_retry_hours,
            limit: self.settings.max_job_details_per_run,
        }
    }

    /// Fetches once, retrying a single time on a transient error
    async fn fetch_with_retry(
        &self,
        url: &str,
        stats: &mut DetailStats,
    ) -> std::result::Result<FetchResponse, FetchError> {
        match self.fetcher.fetch(url, self.platform.render_mode).await {
            Err(e) => {
                tracing::debug!("Retrying detail {} after: {}", url, e);
                stats.retries += 1;
                let delay = Duration::from_millis(self.platform.request_delay_ms);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.fetcher.fetch(url, self.platform.render_mode).await
            }
            ok => ok,
        }
    }

    /// Runs the phase
    ///
    /// Storage failures abort the phase and are returned; everything else is
    /// counted in the returned stats. `deadline_reached` is set when the run
    /// deadline cut the phase short.
    pub async fn run(
        &self,
        storage: &Mutex<SqliteStorage>,
        now: DateTime<Utc>,
        deadline_reached: &mut bool,
    ) -> Result<DetailStats> {
        let mut stats = DetailStats::default();
        let selection = self.selection();
        let candidates = with_storage(storage, |s| {
            s.select_postings_for_details(&self.platform.name, &selection, now)
        })?;
        stats.selected = candidates.len() as u32;
        tracing::info!(
            "{}: {} postings selected for details",
            self.platform.name,
            candidates.len()
        );

        let delay = Duration::from_millis(self.platform.request_delay_ms);
        let mut block_streak = 0u32;
        let mut phase = PhaseStatus::Completed;

        for (i, candidate) in candidates.iter().enumerate() {
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!("{}: run deadline reached during details", self.platform.name);
                *deadline_reached = true;
                phase = PhaseStatus::Stopped;
                break;
            }
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            stats.attempted += 1;
            let record = match self.fetch_with_retry(&candidate.job_url, &mut stats).await {
                Err(e) => {
                    tracing::warn!("{}: detail {} skipped: {}", self.platform.name, candidate.job_id, e);
                    stats.transient_errors += 1;
                    block_streak += 1;
                    None
                }
                Ok(response) if is_blocked(&response, &self.platform.block_fingerprints) => {
                    tracing::warn!(
                        "{}: detail {} blocked (status {})",
                        self.platform.name,
                        candidate.job_id,
                        response.status_code
                    );
                    stats.blocked += 1;
                    block_streak += 1;
                    Some(DetailRecord::blocked())
                }
                Ok(response) => {
                    block_streak = 0;
                    let record = if response.status_code >= 400 {
                        DetailRecord::failed(format!("http_{}", response.status_code))
                    } else {
                        self.extractor.extract_detail(&response.body)
                    };
                    if record.parse_ok {
                        stats.ok += 1;
                    } else {
                        stats.parse_failed += 1;
                    }
                    Some(record)
                }
            };

            if let Some(record) = record {
                with_storage(storage, |s| {
                    s.record_detail(&self.platform.name, &candidate.job_id, &record, Utc::now())
                })?;
            }

            if block_streak >= self.breaker_blocks {
                tracing::warn!(
                    "{}: details circuit breaker tripped after {} consecutive failures",
                    self.platform.name,
                    block_streak
                );
                stats.circuit_breaker_tripped = true;
                phase = PhaseStatus::Stopped;
                break;
            }
        }

        stats.phase = phase;
        Ok(stats)
    }
}
