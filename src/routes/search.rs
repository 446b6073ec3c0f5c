use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    middleware::{rate_limit::ClientIp, RequireRole, ViewRole},
    search::{
        find_target, group_by_type, sanitize_search_term, search_all, sort_results, split_terms, SearchResult,
        SearchTarget, SEARCH_TARGETS, SIMPLE_SEARCH_TARGETS,
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search_term: Option<String>,
    /// Comma-separated subset of the searchable types; all types when absent.
    #[serde(default)]
    pub search_types: Option<String>,
}

/// Display label of a searched type, so clients can title each result group.
#[derive(Debug, Serialize, PartialEq)]
pub struct SearchTypeInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct GroupedSearchResponse {
    pub search_terms: Vec<String>,
    pub search_types: Vec<SearchTypeInfo>,
    pub search_results: BTreeMap<String, Vec<SearchResult>>,
}

#[derive(Debug, Serialize)]
pub struct SimpleSearchResponse {
    pub search_terms: Vec<String>,
    pub search_results: Vec<SearchResult>,
}

/// Resolves `search_types` against the full target set. Unknown names are rejected.
pub fn requested_targets(search_types: Option<&str>) -> AppResult<Vec<SearchTarget>> {
    let names: Vec<&str> = search_types
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(SEARCH_TARGETS.to_vec());
    }
    let mut targets: Vec<SearchTarget> = Vec::with_capacity(names.len());
    for name in names {
        let target = find_target(SEARCH_TARGETS, name).ok_or_else(|| AppError::ValidationError {
            field: "search_types".to_string(),
            message: format!("unknown search type '{}'", name),
        })?;
        if !targets.iter().any(|t| t.kind == target.kind) {
            targets.push(target);
        }
    }
    Ok(targets)
}

pub fn describe_targets(targets: &[SearchTarget]) -> Vec<SearchTypeInfo> {
    targets.iter().map(|t| SearchTypeInfo { kind: t.kind, description: t.description }).collect()
}

pub async fn search(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<GroupedSearchResponse>> {
    state.endpoint_limiter.check_endpoint_limit("/search", ip).await?;

    let search_term = sanitize_search_term(query.search_term.as_deref().unwrap_or_default())?;
    let targets = requested_targets(query.search_types.as_deref())?;
    let cfg = &state.config.search;
    let terms = split_terms(&search_term, cfg.min_term_length);
    let max_per_type = if targets.len() == 1 { cfg.single_type_max_results } else { cfg.max_results_per_type };

    let mut outcome =
        search_all(&state.db, &targets, &search_term, &terms, cfg.column_limit, targets.len()).await;
    record_search(&state, outcome.failed);
    sort_results(&mut outcome.results);

    let mut grouped = group_by_type(&outcome.results, max_per_type);
    for target in &targets {
        grouped.entry(target.kind.to_string()).or_default();
    }

    Ok(Json(GroupedSearchResponse {
        search_terms: terms,
        search_types: describe_targets(&targets),
        search_results: grouped,
    }))
}

pub async fn simple_search(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<SimpleSearchResponse>> {
    state.endpoint_limiter.check_endpoint_limit("/search/simple", ip).await?;

    let search_term = sanitize_search_term(query.search_term.as_deref().unwrap_or_default())?;
    let cfg = &state.config.search;
    let terms = split_terms(&search_term, cfg.min_term_length);

    let mut outcome = search_all(
        &state.db,
        SIMPLE_SEARCH_TARGETS,
        &search_term,
        &terms,
        cfg.column_limit,
        SIMPLE_SEARCH_TARGETS.len(),
    )
    .await;
    record_search(&state, outcome.failed);
    sort_results(&mut outcome.results);
    outcome.results.truncate(cfg.simple_max_results);

    Ok(Json(SimpleSearchResponse { search_terms: terms, search_results: outcome.results }))
}

fn record_search(state: &AppState, failed: usize) {
    state.metrics.inc_searches();
    if failed > 0 {
        state.metrics.add_search_failures(failed as u64);
    }
}
