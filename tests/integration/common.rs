//! Shared fixtures for the integration tests

use job_crawler::config::{parse_config, Config};
use job_crawler::storage::SqliteStorage;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration with one platform served by `server_uri`
pub fn test_config(server_uri: &str, max_details: u32) -> Config {
    let toml = format!(
        r#"
[database]
path = "./unused.db"

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
timeout-secs = 5

[details]
max-job-details-per-run = {max_details}

[[platform]]
name = "boardone"
search-url = "{server_uri}/search"
keywords-param = "q"
location-param = "where"

[platform.pagination]
style = "page-number"
param = "page"

[platform.window]
param = "age"
recent-code = "1"
fallback-code = "7"

[platform.selectors]
item = "article.job"
job-id-prefix = "job-item-"
counters = "[data-results-total]"

[platform.selectors.detail]
title = "h1"
company = ".company"

[[search]]
name = "rust"
platform = "boardone"
keywords = ["rust developer"]
"#
    );
    parse_config(&toml).expect("test config should be valid")
}

/// A result page whose main result set is `ids`
pub fn list_page(ids: impl IntoIterator<Item = u32>) -> String {
    let ids: Vec<u32> = ids.into_iter().collect();
    let mut html = format!(
        "<html><body><div data-results-total=\"{n}\" data-results-main-displayed=\"{n}\"></div>",
        n = ids.len()
    );
    for id in &ids {
        html.push_str(&format!(
            "<article class=\"job\" id=\"job-item-{id}\"><a href=\"/jobs/{id}\">Job {id}</a></article>"
        ));
    }
    html.push_str("</body></html>");
    html
}

pub fn detail_page(title: &str) -> String {
    format!("<html><body><h1>{title}</h1><span class=\"company\">Acme GmbH</span></body></html>")
}

/// Serves three result pages of 15, 15 and 0 postings plus detail pages
pub async fn mount_job_board(server: &MockServer) {
    for (page, ids) in [("1", 1..=15), ("2", 16..=30), ("3", 1..=0)] {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(list_page(ids)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/jobs/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("Rust Developer")))
        .mount(server)
        .await;
}

pub fn memory_storage() -> Arc<Mutex<SqliteStorage>> {
    Arc::new(Mutex::new(
        SqliteStorage::open_in_memory().expect("in-memory database"),
    ))
}
