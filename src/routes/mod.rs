//! HTTP route handlers for the MDS API.
//!
//! - `activity`: per-mine recent-change feed
//! - `health`: health, readiness, metrics and version endpoints
//! - `mines`: mine listing and detail
//! - `party_appointments`: mine/party role appointments
//! - `reports`: mine reports
//! - `search`: ranked cross-entity search

pub mod activity;
pub mod health;
pub mod mines;
pub mod party_appointments;
pub mod reports;
pub mod search;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Json, Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::error::{AppError, AppResult};
use crate::middleware::{self, validation::MAX_BODY_BYTES};
use crate::state::AppState;

/// Unwraps a JSON body, reporting malformed input through the standard error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Builds the full application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let cfg = state.config.clone();
    let limiter = state.rate_limiter.clone();

    let app = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/mines", get(mines::list_mines))
        .route("/mines/{mine_guid}", get(mines::get_mine))
        .route("/mines/{mine_guid}/reports", get(reports::list_reports).post(reports::create_report))
        .route(
            "/mines/{mine_guid}/reports/{mine_report_guid}",
            get(reports::get_report).put(reports::update_report),
        )
        .route(
            "/party-appointments",
            get(party_appointments::list_appointments).post(party_appointments::create_appointment),
        )
        .route(
            "/party-appointments/{mine_party_appt_guid}",
            get(party_appointments::get_appointment)
                .put(party_appointments::update_appointment)
                .delete(party_appointments::delete_appointment),
        )
        .route("/activity/mine/{mine_guid}", get(activity::mine_activity))
        .route("/search", get(search::search))
        .route("/search/simple", get(search::simple_search))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit_middleware))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware));

    // Permissive CORS only for local development against a separately served frontend.
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
