use serde::Deserialize;

use crate::models::Platform;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub platform: Option<Platform>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}
fn default_search_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}
fn default_list_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

/// Clamp client paging input to something the database can serve cheaply.
pub fn page(skip: i64, limit: i64) -> (i64, i64) {
    (skip.max(0), limit.clamp(1, 100))
}
