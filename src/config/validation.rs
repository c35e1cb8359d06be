use crate::config::types::{
    Budgets, Config, DetailSettings, LifecycleSettings, PlatformConfig, SearchEntry,
    SelectorConfig, UserAgentConfig, WindowSettings,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }
    validate_user_agent_config(&config.user_agent)?;
    validate_budgets(&config.budgets)?;
    validate_detail_settings(&config.details)?;
    validate_window_settings(&config.window)?;
    validate_lifecycle_settings(&config.lifecycle)?;
    validate_platforms(&config.platforms)?;
    validate_searches(&config.searches, &config.platforms)?;
    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_budgets(budgets: &Budgets) -> Result<(), ConfigError> {
    let checks = [
        ("max_pages_per_search", budgets.max_pages_per_search),
        (
            "max_jobs_discovered_per_search",
            budgets.max_jobs_discovered_per_search,
        ),
        ("duplicate_page_limit", budgets.duplicate_page_limit),
        ("circuit_breaker_blocks", budgets.circuit_breaker_blocks),
    ];
    for (name, value) in checks {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if budgets.max_run_seconds < 1 {
        return Err(ConfigError::Validation(
            "max_run_seconds must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_detail_settings(details: &DetailSettings) -> Result<(), ConfigError> {
    if details.last_seen_window_days < 1 {
        return Err(ConfigError::Validation(format!(
            "last_seen_window_days must be >= 1, got {}",
            details.last_seen_window_days
        )));
    }
    if details.staleness_days < 0 || details.blocked_retry_hours < 0 {
        return Err(ConfigError::Validation(
            "detail staleness_days and blocked_retry_hours cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_window_settings(window: &WindowSettings) -> Result<(), ConfigError> {
    if !window.recent_hours.is_finite() || window.recent_hours <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "recent_hours must be a positive number, got {}",
            window.recent_hours
        )));
    }
    Ok(())
}

fn validate_lifecycle_settings(lifecycle: &LifecycleSettings) -> Result<(), ConfigError> {
    if lifecycle.stale_after_days < 1 {
        return Err(ConfigError::Validation(format!(
            "stale_after_days must be >= 1, got {}",
            lifecycle.stale_after_days
        )));
    }

    if lifecycle.hard_delete_after_days < lifecycle.stale_after_days {
        return Err(ConfigError::Validation(format!(
            "hard_delete_after_days ({}) must be >= stale_after_days ({})",
            lifecycle.hard_delete_after_days, lifecycle.stale_after_days
        )));
    }

    if lifecycle.max_crawl_age_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "max_crawl_age_hours must be >= 1, got {}",
            lifecycle.max_crawl_age_hours
        )));
    }

    Ok(())
}

fn validate_platforms(platforms: &[PlatformConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for platform in platforms {
        if platform.name.is_empty()
            || !platform
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "platform name must be lowercase alphanumeric or '_', got '{}'",
                platform.name
            )));
        }

        if !seen.insert(platform.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "platform '{}' is defined more than once",
                platform.name
            )));
        }

        let url = Url::parse(&platform.search_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid search_url '{}': {}", platform.search_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "search_url '{}' must use http or https",
                platform.search_url
            )));
        }

        if platform.window.param.is_empty()
            || platform.window.recent_code.is_empty()
            || platform.window.fallback_code.is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "platform '{}' window param and codes cannot be empty",
                platform.name
            )));
        }

        validate_selectors(&platform.name, &platform.selectors)?;
    }

    Ok(())
}

fn validate_selectors(platform: &str, selectors: &SelectorConfig) -> Result<(), ConfigError> {
    let mut all = vec![selectors.item.as_str(), selectors.job_url.as_str()];
    all.push(selectors.detail.title.as_str());
    all.extend(selectors.counters.as_deref());
    all.extend(selectors.markers.as_deref());
    all.extend(selectors.detail.company.as_deref());
    all.extend(selectors.detail.location.as_deref());
    all.extend(selectors.detail.description.as_deref());
    all.extend(selectors.detail.posted_at.as_deref());

    for css in all {
        validate_selector(css)
            .map_err(|e| ConfigError::InvalidSelector(format!("platform '{}': {}", platform, e)))?;
    }

    Ok(())
}

/// Checks that a CSS selector parses
pub(crate) fn validate_selector(css: &str) -> Result<(), String> {
    Selector::parse(css)
        .map(|_| ())
        .map_err(|e| format!("'{}': {:?}", css, e))
}

fn validate_searches(
    searches: &[SearchEntry],
    platforms: &[PlatformConfig],
) -> Result<(), ConfigError> {
    for entry in searches {
        if entry.name.is_empty() {
            return Err(ConfigError::Validation(
                "search name cannot be empty".to_string(),
            ));
        }

        if !platforms.iter().any(|p| p.name == entry.platform) {
            return Err(ConfigError::Validation(format!(
                "search '{}' references unknown platform '{}'",
                entry.name, entry.platform
            )));
        }

        if entry.keywords.is_empty() || entry.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "search '{}' must have at least one non-empty keyword",
                entry.name
            )));
        }
    }

    Ok(())
}
