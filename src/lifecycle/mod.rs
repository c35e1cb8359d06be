//! Lifecycle maintenance of postings
//!
//! A periodic pass, separate from crawling, that moves postings through
//! active → stale → expired → deleted based on when discovery last saw them.
//! Each platform is gated on the health of its latest discovery crawl.

mod health;
mod maintainer;

pub use health::{evaluate_health, HealthGate};
pub use maintainer::{LifecycleMaintainer, LifecycleSummary, PlatformLifecycle};
