//! Data extracted from storefront pages.

use serde::{Deserialize, Serialize};

/// Metadata snapshot of one app listing.
///
/// Fields mirror what a Play Store details page exposes; anything the page
/// did not carry stays at its default rather than failing the fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppMetadata {
    pub package_name: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews_count: u64,
    #[serde(default)]
    pub installs: String,
    /// Locale ("hl-gl") the snapshot was served from.
    #[serde(default)]
    pub locale: String,
}

/// One row of a keyword-search or similar-apps listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchEntry {
    pub package_name: String,
    pub name: String,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub rating: f64,
    /// 1-based position in the listing.
    pub rank: u32,
}
