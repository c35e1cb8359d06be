//! Configuration module for the job crawler
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! file, and expanding its `[[search]]` entries into search definitions.
//!
//! # Example
//!
//! ```no_run
//! use job_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Max pages per search: {}", config.budgets.max_pages_per_search);
//! ```

mod parser;
mod sync;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_block_fingerprints, Budgets, Config, CounterAttributes, DatabaseConfig,
    DetailSelectors, DetailSettings, LifecycleSettings, Pagination, PlatformConfig,
    PlatformWindow, RenderMode, SearchEntry, SelectorConfig, UserAgentConfig, WindowPolicyMode,
    WindowSettings,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use sync::{build_search_definition_name, expand_search_entries, slugify};
