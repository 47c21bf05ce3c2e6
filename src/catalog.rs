// src/catalog.rs
// Item catalog offered to subscribers: distinct names from column C.

use std::collections::BTreeSet;

use crate::sheet::layout::CATALOG_COLUMN;
use crate::sheet::Row;

/// Distinct, trimmed, non-empty catalog names below the header row, sorted.
pub fn available_items(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .skip(1)
        .filter_map(|r| r.get(CATALOG_COLUMN))
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Case-insensitive substring search over the catalog.
pub fn search_items(rows: &[Row], keyword: &str) -> Vec<String> {
    filter_items(&available_items(rows), keyword)
}

/// Same search over an already extracted catalog.
pub fn filter_items(items: &[String], keyword: &str) -> Vec<String> {
    let needle = keyword.trim().to_lowercase();
    items
        .iter()
        .filter(|item| item.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
