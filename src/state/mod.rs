//! State module for crawl and lifecycle runs
//!
//! This module provides the state enums persisted alongside run records.
//!
//! # Components
//!
//! - `RunStatus`: Status of a crawl run or lifecycle run (running, success, partial, failed)
//! - `SearchRunStatus`: Status of a single search definition's discovery within a crawl run
//! - `Trigger`: What started a run (schedule or manual)
//! - `PlatformAction`: Outcome of one platform within a lifecycle pass

mod lifecycle_state;
mod run_status;

// Re-export main types
pub use lifecycle_state::PlatformAction;
pub use run_status::{RunStatus, SearchRunStatus, Trigger};
