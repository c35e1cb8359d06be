//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for a job board and run the full
//! crawl and lifecycle cycle through the public API.

mod common;
mod crawl_tests;
mod lifecycle_tests;
