use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{
    error::{validation::parse_guid, AppResult},
    middleware::{RequireRole, ViewRole},
    search::activity::{collect_mine_activity, ActivityEntry, ACTIVITY_TARGETS},
    state::AppState,
    types::Records,
};

/// Recent changes to a mine, its permits and its incidents, newest first.
///
/// Tables whose query fails are left out of the feed; the caller still gets a 200.
pub async fn mine_activity(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Path(mine_guid): Path<String>,
) -> AppResult<Json<Records<ActivityEntry>>> {
    let mine_guid = parse_guid(&mine_guid, "Mine")?;
    let cfg = &state.config.activity;

    let feed = collect_mine_activity(&state.db, ACTIVITY_TARGETS, mine_guid, Utc::now(), cfg.window_days, cfg.max_workers)
        .await;
    if feed.failed > 0 {
        state.metrics.add_activity_failures(feed.failed as u64);
    }
    state.metrics.inc_activity_feeds();
    tracing::debug!(mine = %mine_guid, entries = feed.results.len(), failed = feed.failed, "Served activity feed");

    Ok(Json(feed.results.into()))
}
