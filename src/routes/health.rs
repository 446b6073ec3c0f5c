use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::time::{Duration, Instant};

const READINESS_TIMEOUT: Duration = Duration::from_secs(5);
const REQUIRED_EXTENSIONS: [&str; 2] = ["pg_trgm", "btree_gist"];

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready once the database answers and has the extensions search and appointments rely on.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let probe = sqlx::query_scalar::<_, String>("SELECT extname::text FROM pg_extension WHERE extname = ANY($1)")
        .bind(REQUIRED_EXTENSIONS.map(String::from).to_vec())
        .fetch_all(&state.db);

    let (status, database, missing) = match tokio::time::timeout(READINESS_TIMEOUT, probe).await {
        Ok(Ok(installed)) => {
            let missing: Vec<&str> =
                REQUIRED_EXTENSIONS.iter().copied().filter(|ext| !installed.iter().any(|i| i == ext)).collect();
            if missing.is_empty() {
                (StatusCode::OK, "up", missing)
            } else {
                tracing::warn!(?missing, "Readiness check: database extensions missing");
                (StatusCode::SERVICE_UNAVAILABLE, "degraded", missing)
            }
        }
        Ok(Err(e)) => {
            tracing::warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "down", Vec::new())
        }
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "timeout", Vec::new()),
    };

    let body = json!({
        "ready": status == StatusCode::OK,
        "database": database,
        "missing_extensions": missing,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });
    (status, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.get_snapshot().to_prometheus();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    let search = &state.config.search;
    let body = json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "search": {
            "types": crate::search::SEARCH_TARGETS.iter().map(|t| t.kind).collect::<Vec<_>>(),
            "min_term_length": search.min_term_length,
            "max_results_per_type": search.max_results_per_type,
        },
        "activity_window_days": state.config.activity.window_days,
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
        }
    });
    (StatusCode::OK, Json(body))
}
