//! Adaptive recency window for discovery
//!
//! Chooses which date filter a search run sends, based on how recently the
//! same definition last completed successfully.

use crate::config::{PlatformWindow, WindowPolicyMode, WindowSettings};
use crate::storage::{SearchDefinition, Storage, StorageResult, WindowHistory};
use chrono::{DateTime, Duration, Utc};

/// Filter chosen for one search run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowDecision {
    /// No date filter; first crawl of the definition or an explicit "any time"
    NoFilter,
    /// The definition pins its own filter code
    Explicit(String),
    /// Last success is recent; the short window is enough
    Recent(String),
    /// Last success is old or missing; the wider window catches up
    Fallback(String),
}

impl WindowDecision {
    /// Code to send, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::NoFilter => None,
            Self::Explicit(code) | Self::Recent(code) | Self::Fallback(code) => Some(code),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoFilter => "none",
            Self::Explicit(_) => "explicit",
            Self::Recent(_) => "recent",
            Self::Fallback(_) => "fallback",
        }
    }
}

/// Window policy of one platform
pub struct WindowPolicy<'a> {
    settings: &'a WindowSettings,
    window: &'a PlatformWindow,
}

impl<'a> WindowPolicy<'a> {
    pub fn new(settings: &'a WindowSettings, window: &'a PlatformWindow) -> Self {
        Self { settings, window }
    }

    /// Decides the filter for a definition given its history
    ///
    /// A facet under the platform's window parameter always wins; an empty
    /// value there means "any time". In static mode nothing else is added.
    pub fn decide(
        &self,
        definition: &SearchDefinition,
        history: &WindowHistory,
        now: DateTime<Utc>,
    ) -> WindowDecision {
        if let Some(value) = definition.facets.get(&self.window.param) {
            let value = value.trim();
            return if value.is_empty() {
                WindowDecision::NoFilter
            } else {
                WindowDecision::Explicit(value.to_string())
            };
        }

        if self.settings.policy == WindowPolicyMode::Static {
            return WindowDecision::NoFilter;
        }

        if !history.has_finished_history {
            return WindowDecision::NoFilter;
        }

        let recent = Duration::milliseconds((self.settings.recent_hours * 3_600_000.0) as i64);
        match history.last_success_finished_at {
            Some(at) if now - at <= recent => {
                WindowDecision::Recent(self.window.recent_code.clone())
            }
            _ => WindowDecision::Fallback(self.window.fallback_code.clone()),
        }
    }

    /// Reads the definition's history and decides its filter
    pub fn resolve(
        &self,
        storage: &dyn Storage,
        definition: &SearchDefinition,
        now: DateTime<Utc>,
    ) -> StorageResult<WindowDecision> {
        let history = storage.window_history(definition.id)?;
        Ok(self.decide(definition, &history, now))
    }
}
