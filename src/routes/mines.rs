use axum::{
    extract::{Path, Query, State},
    Json,
};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{validation::parse_guid, AppResult, OptionExt},
    middleware::{RequireRole, ViewRole},
    search::escape_like_pattern,
    state::AppState,
    types::{Mine, PageQuery, Paginated},
};

const MINE_COLUMNS: &str = "mine_guid, mine_no, mine_name, create_user, update_user, update_timestamp";

fn push_mine_filter(qb: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    qb.push(" FROM mine WHERE deleted_ind = FALSE");
    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", escape_like_pattern(term));
        qb.push(" AND (mine_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '!' OR mine_no ILIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '!')");
    }
}

pub async fn list_mines(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Paginated<Mine>>> {
    let (page, per_page, offset) = query.normalized();

    let mut count = QueryBuilder::new("SELECT COUNT(*)");
    push_mine_filter(&mut count, query.search.as_deref());
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(MINE_COLUMNS);
    push_mine_filter(&mut qb, query.search.as_deref());
    qb.push(" ORDER BY mine_name, mine_no LIMIT ").push_bind(per_page).push(" OFFSET ").push_bind(offset);
    let records: Vec<Mine> = qb.build_query_as().fetch_all(&state.db).await?;

    Ok(Json(Paginated::new(records, page, per_page, total)))
}

pub async fn get_mine(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Path(mine_guid): Path<String>,
) -> AppResult<Json<Mine>> {
    let mine_guid = parse_guid(&mine_guid, "Mine")?;
    let mine = find_mine(&state.db, mine_guid).await?.ok_or_not_found("Mine")?;
    Ok(Json(mine))
}

/// Looks up a live (not soft-deleted) mine.
pub(crate) async fn find_mine(db: &sqlx::PgPool, mine_guid: Uuid) -> Result<Option<Mine>, sqlx::Error> {
    sqlx::query_as::<_, Mine>(&format!(
        "SELECT {} FROM mine WHERE mine_guid = $1 AND deleted_ind = FALSE",
        MINE_COLUMNS
    ))
    .bind(mine_guid)
    .fetch_optional(db)
    .await
}
