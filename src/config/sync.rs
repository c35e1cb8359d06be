//! Expansion of `[[search]]` entries into stored search definitions

use crate::config::types::SearchEntry;
use crate::storage::NewSearchDefinition;

const SLUG_MAX_LEN: usize = 40;

/// Lower-case slug with runs of non-alphanumerics collapsed to `_`
///
/// Capped at 40 characters; an empty slug becomes `x`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug: String = slug.trim_matches('_').chars().take(SLUG_MAX_LEN).collect();
    if slug.is_empty() {
        "x".to_string()
    } else {
        slug
    }
}

/// Name of one expanded definition
///
/// Indices are zero-based positions within the entry's location and
/// keyword lists.
pub fn build_search_definition_name(
    base: &str,
    location: Option<(usize, &str)>,
    keyword: (usize, &str),
) -> String {
    let (kw_idx, keyword) = keyword;
    match location {
        Some((loc_idx, location)) => format!(
            "{}__loc{}_{}__kw{}_{}",
            base,
            loc_idx,
            slugify(location),
            kw_idx,
            slugify(keyword)
        ),
        None => format!("{}__locall__kw{}_{}", base, kw_idx, slugify(keyword)),
    }
}

/// Expands every entry into one definition per (location, keyword) pair
///
/// An entry with one keyword and no locations keeps its own name. Blank
/// keywords are skipped. Order follows the configuration: entries, then
/// locations, then keywords.
pub fn expand_search_entries(entries: &[SearchEntry]) -> Vec<NewSearchDefinition> {
    let mut definitions = Vec::new();

    for entry in entries {
        let keywords: Vec<(usize, &str)> = entry
            .keywords
            .iter()
            .map(|k| k.trim())
            .enumerate()
            .filter(|(_, k)| !k.is_empty())
            .collect();

        let locations: Vec<Option<(usize, &str)>> = if entry.locations.is_empty() {
            vec![None]
        } else {
            entry
                .locations
                .iter()
                .map(|l| l.trim())
                .enumerate()
                .map(Some)
                .collect()
        };

        let keep_base_name = entry.locations.is_empty() && keywords.len() == 1;

        for location in &locations {
            for &keyword in &keywords {
                let name = if keep_base_name {
                    entry.name.clone()
                } else {
                    build_search_definition_name(&entry.name, *location, keyword)
                };
                definitions.push(NewSearchDefinition {
                    platform: entry.platform.clone(),
                    name,
                    keywords: keyword.1.to_string(),
                    location: location
                        .map(|(_, l)| l.to_string())
                        .filter(|l| !l.is_empty()),
                    facets: entry.facets.clone(),
                    enabled: entry.enabled,
                });
            }
        }
    }

    definitions
}
