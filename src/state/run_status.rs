/// Run state definitions for crawl, search and lifecycle runs
///
/// Every enum here is stored as text in SQLite and round-trips through
/// `to_db_string`/`from_db_string`.
use std::fmt;

/// Status of a crawl run or a lifecycle run
///
/// A run is created as `Running` and moves exactly once to one of the
/// terminal states when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// Run is in progress
    Running,

    /// Every phase completed without blocked searches or failed details
    Success,

    /// The run completed but some units were blocked or failed
    Partial,

    /// An unrecoverable error aborted the run
    Failed,
}

impl RunStatus {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible run states
    pub fn all_states() -> Vec<Self> {
        vec![Self::Running, Self::Success, Self::Partial, Self::Failed]
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Status of one search definition's discovery within a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchRunStatus {
    /// Discovery for this search is in progress
    Running,

    /// Discovery finished without tripping the circuit breaker
    Success,

    /// The circuit breaker stopped discovery
    Blocked,

    /// Discovery could not be recorded (storage or setup failure)
    Failed,
}

impl SearchRunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "blocked" => Some(Self::Blocked),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![Self::Running, Self::Success, Self::Blocked, Self::Failed]
    }
}

impl fmt::Display for SearchRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Schedule,
    Manual,
}

impl Trigger {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "schedule" => Some(Self::Schedule),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
