use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::{json_body, mines::find_mine};
use crate::{
    error::{
        validation::{parse_guid, require},
        AppError, AppResult, OptionExt,
    },
    middleware::{CreateRole, RequireRole, ViewRole},
    state::AppState,
    types::{parse_datetime, CreateMineReportRequest, MineReport, Permit, Records, UpdateMineReportRequest},
};

const REPORT_SELECT: &str = r#"
    SELECT r.mine_report_id, r.mine_report_guid, r.mine_report_definition_id,
           d.mine_report_definition_guid, d.report_name, r.mine_guid, r.permit_id,
           p.permit_guid, r.received_date, r.due_date, r.submission_year,
           r.create_user, r.update_user, r.update_timestamp
    FROM mine_report r
    JOIN mine_report_definition d ON d.mine_report_definition_id = r.mine_report_definition_id
    LEFT JOIN permit p ON p.permit_id = r.permit_id
"#;

async fn find_report(db: &PgPool, mine_guid: Uuid, report_guid: Uuid) -> Result<Option<MineReport>, sqlx::Error> {
    sqlx::query_as::<_, MineReport>(&format!(
        "{} WHERE r.mine_report_guid = $1 AND r.mine_guid = $2 AND r.deleted_ind = FALSE",
        REPORT_SELECT
    ))
    .bind(report_guid)
    .bind(mine_guid)
    .fetch_optional(db)
    .await
}

const PERMIT_SELECT: &str = "SELECT permit_id, permit_guid, mine_guid, permit_no, permit_status_code, \
                             issue_date, expiry_date FROM permit";

/// Resolves a permit by guid or, failing that, by permit number. Permit numbers repeat
/// across mines, so a number held by `mine_guid` wins over the same number elsewhere.
async fn find_permit(db: &PgPool, mine_guid: Uuid, guid_or_no: &str) -> Result<Option<Permit>, sqlx::Error> {
    let value = guid_or_no.trim();
    match Uuid::parse_str(value) {
        Ok(guid) => {
            sqlx::query_as::<_, Permit>(&format!("{} WHERE permit_guid = $1", PERMIT_SELECT))
                .bind(guid)
                .fetch_optional(db)
                .await
        }
        Err(_) => {
            sqlx::query_as::<_, Permit>(&format!(
                "{} WHERE permit_no = $1 ORDER BY (mine_guid = $2) DESC, permit_id LIMIT 1",
                PERMIT_SELECT
            ))
            .bind(value)
            .bind(mine_guid)
            .fetch_optional(db)
            .await
        }
    }
}

fn parse_timestamp_field(raw: &str, field: &str) -> AppResult<chrono::DateTime<chrono::Utc>> {
    parse_datetime(raw).ok_or_else(|| AppError::ValidationError {
        field: field.to_string(),
        message: format!("'{}' is not a valid date", raw),
    })
}

pub async fn list_reports(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Path(mine_guid): Path<String>,
) -> AppResult<Json<Records<MineReport>>> {
    let mine_guid = parse_guid(&mine_guid, "Mine")?;
    let reports = sqlx::query_as::<_, MineReport>(&format!(
        "{} WHERE r.mine_guid = $1 AND r.deleted_ind = FALSE ORDER BY r.due_date, r.mine_report_id",
        REPORT_SELECT
    ))
    .bind(mine_guid)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(reports.into()))
}

pub async fn create_report(
    auth: RequireRole<CreateRole>,
    State(state): State<AppState>,
    Path(mine_guid): Path<String>,
    payload: Result<Json<CreateMineReportRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MineReport>)> {
    let mine_guid = parse_guid(&mine_guid, "Mine")?;
    let mine = find_mine(&state.db, mine_guid).await?.ok_or_not_found("Mine")?;
    let body = json_body(payload)?;

    let definition_id: Option<i32> = match body.mine_report_definition_id {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT mine_report_definition_id FROM mine_report_definition WHERE mine_report_definition_id = $1",
            )
            .bind(id)
            .fetch_optional(&state.db)
            .await?
        }
        None => None,
    };
    let definition_id =
        definition_id.ok_or_else(|| AppError::BadRequest("A report must be selected from the list.".to_string()))?;

    let permit_id = match body.permit_guid.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => {
            let permit = find_permit(&state.db, mine.mine_guid, raw)
                .await?
                .ok_or_else(|| AppError::BadRequest(format!("Permit '{}' not found", raw)))?;
            if permit.mine_guid != mine.mine_guid {
                return Err(AppError::BadRequest("The permit must be associated with the selected mine.".to_string()));
            }
            Some(permit.permit_id)
        }
        None => None,
    };

    let submission_year = require(body.submission_year, "submission_year")?;
    let due_date = require(body.due_date.filter(|d| !d.trim().is_empty()), "due_date")?;
    let due_date = parse_timestamp_field(&due_date, "due_date")?;

    let report_guid = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO mine_report (mine_report_guid, mine_report_definition_id, mine_guid, permit_id,
                                    due_date, submission_year, create_user, update_user)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $7)"#,
    )
    .bind(report_guid)
    .bind(definition_id)
    .bind(mine.mine_guid)
    .bind(permit_id)
    .bind(due_date)
    .bind(submission_year)
    .bind(auth.username())
    .execute(&state.db)
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Error when saving: {}", e)))?;

    let report = find_report(&state.db, mine.mine_guid, report_guid).await?.ok_or_not_found("Mine Report")?;
    state.metrics.inc_reports_created();
    tracing::info!(user = %auth.username(), mine = %mine.mine_no, report = %report_guid, "Created mine report");
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_report(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Path((mine_guid, report_guid)): Path<(String, String)>,
) -> AppResult<Json<MineReport>> {
    let mine_guid = parse_guid(&mine_guid, "Mine Report")?;
    let report_guid = parse_guid(&report_guid, "Mine Report")?;
    let report = find_report(&state.db, mine_guid, report_guid).await?.ok_or_not_found("Mine Report")?;
    Ok(Json(report))
}

pub async fn update_report(
    auth: RequireRole<CreateRole>,
    State(state): State<AppState>,
    Path((mine_guid, report_guid)): Path<(String, String)>,
    payload: Result<Json<UpdateMineReportRequest>, JsonRejection>,
) -> AppResult<Json<MineReport>> {
    let mine_guid = parse_guid(&mine_guid, "Mine Report")?;
    let report_guid = parse_guid(&report_guid, "Mine Report")?;
    find_report(&state.db, mine_guid, report_guid).await?.ok_or_not_found("Mine Report")?;
    let body = json_body(payload)?;

    // Empty strings leave the column unchanged, like absent keys.
    let due_date = match body.due_date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => Some(parse_timestamp_field(raw, "due_date")?),
        None => None,
    };
    let received_date = match body.received_date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => Some(parse_timestamp_field(raw, "received_date")?),
        None => None,
    };

    let result = sqlx::query(
        r#"UPDATE mine_report
           SET due_date = COALESCE($1, due_date),
               received_date = COALESCE($2, received_date),
               update_user = $3,
               update_timestamp = now()
           WHERE mine_report_guid = $4 AND mine_guid = $5 AND deleted_ind = FALSE"#,
    )
    .bind(due_date)
    .bind(received_date)
    .bind(auth.username())
    .bind(report_guid)
    .bind(mine_guid)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Mine Report not found".to_string()));
    }

    let report = find_report(&state.db, mine_guid, report_guid).await?.ok_or_not_found("Mine Report")?;
    state.metrics.inc_reports_updated();
    tracing::info!(user = %auth.username(), report = %report_guid, "Updated mine report");
    Ok(Json(report))
}
