use std::fmt;

/// Outcome of one platform within a lifecycle pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformAction {
    /// Health gate passed; candidates were counted (dry run) or mutated
    Processed,

    /// No crawl run with discovery enabled exists for the platform
    SkippedNoRecentRun,

    /// Latest crawl run is not successful or too old
    SkippedUnhealthy,

    /// Processing raised an error and was rolled back
    Failed,
}

impl PlatformAction {
    /// Returns true if the health gate declined to act on the platform
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedNoRecentRun | Self::SkippedUnhealthy)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::SkippedNoRecentRun => "skipped_no_recent_run",
            Self::SkippedUnhealthy => "skipped_unhealthy",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(Self::Processed),
            "skipped_no_recent_run" => Some(Self::SkippedNoRecentRun),
            "skipped_unhealthy" => Some(Self::SkippedUnhealthy),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PlatformAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
