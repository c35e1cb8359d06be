//! Page extraction for result lists and detail pages
//!
//! Platform-specific parsing lives behind [`PageExtractor`]. The built-in
//! [`SelectorExtractor`] is driven entirely by the CSS selectors of a
//! platform's configuration.

use crate::config::{DetailSelectors, SelectorConfig};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

/// `last_error` recorded for a detail attempt that hit an anti-bot page
pub const BLOCKED_DETAIL_ERROR: &str = "blocked";

/// Result counters reported by a list page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounters {
    pub total: Option<u32>,
    pub main: Option<u32>,
    pub main_displayed: Option<u32>,
    pub regional: Option<u32>,
    pub semantic: Option<u32>,
}

/// One posting card on a list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub job_id: String,
    pub job_url: String,
    /// 1-based position on the page
    pub rank: u32,
}

/// Everything extracted from one list page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub counters: Option<ResultCounters>,
    pub items: Vec<ListItem>,
    /// Diagnostic section headings; never used for control flow
    pub markers: Vec<String>,
}

impl ListPage {
    /// Items belonging to the main result set
    ///
    /// When the page reports how many main results it displays, trailing
    /// items (regional or semantic suggestions) are cut off.
    pub fn main_items(&self) -> &[ListItem] {
        match self.counters.and_then(|c| c.main_displayed) {
            Some(n) => &self.items[..(n as usize).min(self.items.len())],
            None => &self.items,
        }
    }
}

/// Parsed detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub fields: BTreeMap<String, String>,
    pub parse_ok: bool,
    pub last_error: Option<String>,
}

impl DetailRecord {
    /// Record stored when the detail page was an anti-bot response
    pub fn blocked() -> Self {
        Self {
            fields: BTreeMap::new(),
            parse_ok: false,
            last_error: Some(BLOCKED_DETAIL_ERROR.to_string()),
        }
    }

    /// Record stored when parsing failed
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            parse_ok: false,
            last_error: Some(error.into()),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.last_error.as_deref() == Some(BLOCKED_DETAIL_ERROR)
    }
}

/// Platform-specific page parsing
pub trait PageExtractor: Send + Sync {
    /// Extracts counters, posting cards and markers from a list page
    ///
    /// Relative job URLs are resolved against `page_url`.
    fn extract_list(&self, body: &str, page_url: &Url) -> ListPage;

    /// Extracts the fields of a detail page
    fn extract_detail(&self, body: &str) -> DetailRecord;
}

struct CompiledDetail {
    title: Selector,
    optional: Vec<(&'static str, Selector)>,
}

/// CSS-selector driven extractor
pub struct SelectorExtractor {
    config: SelectorConfig,
    item: Selector,
    job_url: Selector,
    counters: Option<Selector>,
    markers: Option<Selector>,
    detail: CompiledDetail,
}

fn compile(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}

impl SelectorExtractor {
    /// Compiles the selectors of a platform
    pub fn new(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            item: compile(&config.item)?,
            job_url: compile(&config.job_url)?,
            counters: config.counters.as_deref().map(compile).transpose()?,
            markers: config.markers.as_deref().map(compile).transpose()?,
            detail: compile_detail(&config.detail)?,
            config: config.clone(),
        })
    }

    fn job_id(&self, card: &ElementRef<'_>) -> Option<String> {
        let raw = card.value().attr(&self.config.job_id_attribute)?.trim();
        let id = match &self.config.job_id_prefix {
            Some(prefix) => raw.strip_prefix(prefix.as_str())?,
            None => raw,
        };
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    fn job_url(&self, card: &ElementRef<'_>, page_url: &Url) -> Option<String> {
        let attr = &self.config.job_url_attribute;
        // The card itself may be the link
        let href = card.value().attr(attr).or_else(|| {
            card.select(&self.job_url)
                .find_map(|link| link.value().attr(attr))
        })?;
        let resolved = page_url.join(href.trim()).ok()?;
        match resolved.scheme() {
            "http" | "https" => Some(resolved.to_string()),
            _ => None,
        }
    }

    fn counters(&self, document: &Html) -> Option<ResultCounters> {
        let selector = self.counters.as_ref()?;
        let element = document.select(selector).next()?;
        let names = &self.config.counter_attributes;
        let read = |name: &str| {
            element
                .value()
                .attr(name)
                .and_then(|v| v.trim().parse::<u32>().ok())
        };
        Some(ResultCounters {
            total: read(&names.total),
            main: read(&names.main),
            main_displayed: read(&names.main_displayed),
            regional: read(&names.regional),
            semantic: read(&names.semantic),
        })
    }

    fn markers(&self, document: &Html) -> Vec<String> {
        let Some(selector) = &self.markers else {
            return Vec::new();
        };
        document
            .select(selector)
            .map(|el| normalize_text(el))
            .filter(|text| !text.is_empty())
            .filter(|text| {
                let lower = text.to_lowercase();
                self.config.marker_patterns.is_empty()
                    || self
                        .config
                        .marker_patterns
                        .iter()
                        .any(|p| lower.contains(&p.to_lowercase()))
            })
            .collect()
    }
}

fn compile_detail(config: &DetailSelectors) -> Result<CompiledDetail, ConfigError> {
    let mut optional = Vec::new();
    let named = [
        ("company", &config.company),
        ("location", &config.location),
        ("description", &config.description),
        ("posted_at", &config.posted_at),
    ];
    for (name, css) in named {
        if let Some(css) = css {
            optional.push((name, compile(css)?));
        }
    }
    Ok(CompiledDetail {
        title: compile(&config.title)?,
        optional,
    })
}

/// Collapses the text of an element into single-spaced form
fn normalize_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

impl PageExtractor for SelectorExtractor {
    fn extract_list(&self, body: &str, page_url: &Url) -> ListPage {
        let document = Html::parse_document(body);

        let mut items = Vec::new();
        for card in document.select(&self.item) {
            let Some(job_id) = self.job_id(&card) else {
                continue;
            };
            let Some(job_url) = self.job_url(&card, page_url) else {
                continue;
            };
            items.push(ListItem {
                job_id,
                job_url,
                rank: items.len() as u32 + 1,
            });
        }

        ListPage {
            counters: self.counters(&document),
            items,
            markers: self.markers(&document),
        }
    }

    fn extract_detail(&self, body: &str) -> DetailRecord {
        let document = Html::parse_document(body);

        let Some(title) = document
            .select(&self.detail.title)
            .map(normalize_text)
            .find(|t| !t.is_empty())
        else {
            return DetailRecord::failed("missing_title");
        };

        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), title);
        for (name, selector) in &self.detail.optional {
            if let Some(value) = document
                .select(selector)
                .map(normalize_text)
                .find(|t| !t.is_empty())
            {
                fields.insert(name.to_string(), value);
            }
        }

        DetailRecord {
            fields,
            parse_ok: true,
            last_error: None,
        }
    }
}
