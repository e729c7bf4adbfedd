//! Storefront lookup routes (search, similar apps).

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use playstore_client::SearchEntry;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

/// Create the apps router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_apps))
        .route("/apps/{package}/similar", get(similar_apps))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EntryListResponse {
    results: Vec<SearchEntry>,
    count: usize,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Keyword search against the storefront.
async fn search_apps(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<EntryListResponse>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::validation("query parameter 'q' must not be empty"));
    }

    let results = state
        .source
        .search(query, clamp_limit(params.limit))
        .await
        .map_err(crate::Error::from)?;

    let count = results.len();
    Ok(Json(EntryListResponse { results, count }))
}

/// Apps the storefront lists alongside the given package.
async fn similar_apps(
    State(state): State<AppState>,
    Path(package): Path<String>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Json<EntryListResponse>> {
    let results = state
        .source
        .similar(&package, clamp_limit(params.limit))
        .await
        .map_err(crate::Error::from)?;

    let count = results.len();
    Ok(Json(EntryListResponse { results, count }))
}
