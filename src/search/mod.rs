//! Ranked multi-entity search and the bounded fan-out shared with the activity feed.
//!
//! Every searchable entity type is described by a static [`SearchTarget`]. A query is
//! split into terms; each term is matched case-insensitively against every searchable
//! column of every requested type, and each match carries the `pg_trgm` similarity of
//! the column to the term. Scores are then biased per type (mines outrank documents)
//! and boosted for prefix and exact matches of the whole query. Results are merged
//! without de-duplication; callers sort and truncate.

pub mod activity;

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::error::{AppError, AppResult};

/// Multiplier applied when the display value starts with the search string.
pub const PREFIX_MULTIPLIER: f64 = 3.0;
/// Additional multiplier when the display value equals the search string.
pub const EXACT_MULTIPLIER: f64 = 10.0;
/// Longest accepted search string, in characters.
pub const MAX_QUERY_CHARS: usize = 500;

const LIKE_ESCAPE: char = '!';

/// Anything fanned out over the worker pool is identified by its entity kind in logs.
pub trait Target {
    fn kind(&self) -> &'static str;
}

/// A searchable entity type.
#[derive(Debug, Clone, Copy)]
pub struct SearchTarget {
    pub kind: &'static str,
    pub description: &'static str,
    pub table: &'static str,
    /// SQL expression returned as the hit id.
    pub id_expr: &'static str,
    /// SQL expression returned as the hit's display value; prefix/exact boosts compare against it.
    pub value_expr: &'static str,
    pub columns: &'static [&'static str],
    pub has_deleted_ind: bool,
    pub score_multiplier: f64,
}

impl Target for SearchTarget {
    fn kind(&self) -> &'static str {
        self.kind
    }
}

const MINE: SearchTarget = SearchTarget {
    kind: "mine",
    description: "Mines",
    table: "mine",
    id_expr: "mine_guid",
    value_expr: "mine_name",
    columns: &["mine_name", "mine_no"],
    has_deleted_ind: true,
    score_multiplier: 500.0,
};

const PARTY: SearchTarget = SearchTarget {
    kind: "party",
    description: "Contacts",
    table: "party",
    id_expr: "party_guid",
    value_expr: "concat_ws(' ', first_name, party_name)",
    columns: &["first_name", "party_name", "email", "phone_no"],
    has_deleted_ind: true,
    score_multiplier: 150.0,
};

const PERMIT: SearchTarget = SearchTarget {
    kind: "permit",
    description: "Permits",
    table: "permit",
    id_expr: "permit_guid",
    value_expr: "permit_no",
    columns: &["permit_no"],
    has_deleted_ind: false,
    score_multiplier: 1000.0,
};

/// Quick search links permits to their mine.
const PERMIT_BY_MINE: SearchTarget = SearchTarget { id_expr: "mine_guid", ..PERMIT };

const MINE_DOCUMENTS: SearchTarget = SearchTarget {
    kind: "mine_documents",
    description: "Mine Documents",
    table: "mine_document",
    id_expr: "mine_document_guid",
    value_expr: "document_name",
    columns: &["document_name"],
    has_deleted_ind: true,
    score_multiplier: 250.0,
};

const PERMIT_DOCUMENTS: SearchTarget = SearchTarget {
    kind: "permit_documents",
    description: "Permit Documents",
    table: "permit_amendment_document",
    id_expr: "permit_amendment_document_guid",
    value_expr: "document_name",
    columns: &["document_name"],
    has_deleted_ind: false,
    score_multiplier: 250.0,
};

/// Targets of the full search page.
pub const SEARCH_TARGETS: &[SearchTarget] = &[MINE, PARTY, PERMIT, MINE_DOCUMENTS, PERMIT_DOCUMENTS];

/// Targets of the header quick search.
pub const SIMPLE_SEARCH_TARGETS: &[SearchTarget] = &[MINE, PARTY, PERMIT_BY_MINE];

pub fn find_target(targets: &[SearchTarget], kind: &str) -> Option<SearchTarget> {
    targets.iter().copied().find(|t| t.kind == kind)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub score: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub result: SearchHit,
}

/// Whitespace-delimited terms of at least `min_len` characters.
pub fn split_terms(query: &str, min_len: usize) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|t| t.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

/// `similarity × base`, ×3 when `value` starts with the search string and a further ×10 when
/// it equals it. Both comparisons are case-insensitive and use the whole search string.
pub fn score_result(similarity: f64, search_term: &str, value: &str, base_multiplier: f64) -> f64 {
    let value = value.to_lowercase();
    let term = search_term.to_lowercase();
    let mut multiplier = base_multiplier;
    if value.starts_with(&term) {
        multiplier *= PREFIX_MULTIPLIER;
    }
    if value == term {
        multiplier *= EXACT_MULTIPLIER;
    }
    similarity * multiplier
}

/// Highest score first; ties keep their merge order.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Per-type top results keyed by id; expects `results` already sorted.
pub fn group_by_type(results: &[SearchResult], max_per_type: usize) -> BTreeMap<String, Vec<SearchResult>> {
    let mut grouped: BTreeMap<String, Vec<SearchResult>> = BTreeMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for r in results {
        let bucket = grouped.entry(r.kind.clone()).or_default();
        if bucket.len() >= max_per_type {
            continue;
        }
        if seen.insert((r.kind.as_str(), r.result.id.as_str())) {
            bucket.push(r.clone());
        }
    }
    grouped
}

/// Escapes LIKE metacharacters with `!`; pair with `ESCAPE '!'`.
pub(crate) fn escape_like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

/// Trims the query and strips control characters; empty or over-long queries are rejected.
pub fn sanitize_search_term(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Search query cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::InvalidInput("Search query too long".to_string()));
    }
    let sanitized: String = trimmed.chars().filter(|ch| !ch.is_control() || ch.is_whitespace()).collect();
    if sanitized.trim().is_empty() {
        return Err(AppError::InvalidInput("Search query contains only control characters".to_string()));
    }
    Ok(sanitized)
}

/// One similarity query for a single column. Identifiers come from the static target table.
pub fn build_column_query<'a>(
    target: &SearchTarget,
    column: &str,
    term: &'a str,
    limit: Option<i64>,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("SELECT similarity(");
    qb.push(column)
        .push(", ")
        .push_bind(term)
        .push(")::float8 AS score, ")
        .push(target.id_expr)
        .push("::text AS id, ")
        .push(target.value_expr)
        .push("::text AS value FROM ")
        .push(target.table)
        .push(" WHERE ")
        .push(column)
        .push(" ILIKE ")
        .push_bind(format!("%{}%", escape_like_pattern(term)))
        .push(" ESCAPE '!'");
    if target.has_deleted_ind {
        qb.push(" AND deleted_ind = FALSE");
    }
    qb.push(" ORDER BY score DESC");
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    qb
}

/// Runs every term against every column of `target` and scores each row.
pub async fn execute_search(
    pool: &PgPool,
    search_term: &str,
    terms: &[String],
    target: SearchTarget,
    limit: Option<i64>,
) -> Result<Vec<SearchResult>, sqlx::Error> {
    let mut results = Vec::new();
    for term in terms {
        for column in target.columns {
            let rows = build_column_query(&target, column, term, limit).build().fetch_all(pool).await?;
            for row in rows {
                let similarity: Option<f64> = row.try_get("score")?;
                let id: Option<String> = row.try_get("id")?;
                let value: Option<String> = row.try_get("value")?;
                let value = value.unwrap_or_default();
                results.push(SearchResult {
                    score: score_result(similarity.unwrap_or(0.0), search_term, &value, target.score_multiplier),
                    kind: target.kind.to_string(),
                    result: SearchHit { id: id.unwrap_or_default(), value },
                });
            }
        }
    }
    Ok(results)
}

/// Searches all `targets` concurrently; a failing type is logged and left out.
pub async fn search_all(
    pool: &PgPool,
    targets: &[SearchTarget],
    search_term: &str,
    terms: &[String],
    limit: Option<i64>,
    max_workers: usize,
) -> FanOut<SearchResult> {
    let search_term: Arc<str> = Arc::from(search_term);
    let terms: Arc<[String]> = Arc::from(terms);
    fan_out(targets, max_workers, |target| {
        let pool = pool.clone();
        let search_term = search_term.clone();
        let terms = terms.clone();
        async move { execute_search(&pool, &search_term, &terms, target, limit).await }
    })
    .await
}

/// Merged output of a fan-out.
#[derive(Debug)]
pub struct FanOut<T> {
    pub results: Vec<T>,
    /// Number of tasks that failed or panicked.
    pub failed: usize,
}

/// Runs `task` once per item on a pool of at most `max_workers` concurrent tasks.
///
/// Task output is merged in completion order. Failed tasks are logged and counted;
/// their partial output is dropped and nothing is retried.
pub async fn fan_out<I, T, E, F, Fut>(items: &[I], max_workers: usize, task: F) -> FanOut<T>
where
    I: Target + Copy + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut set = JoinSet::new();
    for &item in items {
        let semaphore = semaphore.clone();
        let fut = task(item);
        set.spawn(async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = semaphore.acquire_owned().await;
            (item.kind(), fut.await)
        });
    }

    let mut out = FanOut { results: Vec::new(), failed: 0 };
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(rows))) => out.results.extend(rows),
            Ok((kind, Err(e))) => {
                tracing::error!(kind, "{} task generated an exception: {}", kind, e);
                out.failed += 1;
            }
            Err(e) => {
                tracing::error!("fan-out task panicked: {}", e);
                out.failed += 1;
            }
        }
    }
    out
}
