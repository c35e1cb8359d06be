//! Output module for run statistics and reports
//!
//! This module handles:
//! - Counters accumulated during a crawl run and stored as JSON on its row
//! - Loading and printing the report of a platform's latest crawl run

mod report;
pub mod stats;

pub use report::{format_run_report, load_run_report, print_run_report, RunReport};
pub use stats::{DetailStats, DiscoveryStats, PhaseStatus, RunStats};
