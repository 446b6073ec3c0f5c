use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use super::json_body;
use crate::{
    db::{constraint_kind, ConstraintKind},
    error::{
        validation::{parse_field_guid, parse_guid, require_non_empty},
        AppError, AppResult, OptionExt,
    },
    middleware::{CreateRole, RequireRole, ViewRole},
    state::AppState,
    types::{
        parse_date, CreatePartyAppointmentRequest, MinePartyAppointment, Party, Records,
        UpdatePartyAppointmentRequest,
    },
};

const APPT_SELECT: &str = r#"
    SELECT a.mine_party_appt_id, a.mine_party_appt_guid, a.mine_guid, a.party_guid,
           a.mine_party_appt_type_code, t.description AS mine_party_appt_type_description,
           a.permit_guid, a.mine_tailings_storage_facility_guid,
           CASE a.mine_party_appt_type_code
               WHEN 'EOR' THEN a.mine_tailings_storage_facility_guid
               WHEN 'PMT' THEN a.permit_guid
           END AS related_guid,
           a.start_date, a.end_date, a.processed_by, a.processed_on
    FROM mine_party_appt a
    LEFT JOIN mine_party_appt_type_code t ON t.mine_party_appt_type_code = a.mine_party_appt_type_code
"#;

const NOT_FOUND: &str = "Mine Party Appointment not found";

/// Where a related guid is stored for the given appointment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelatedObject {
    TailingsFacility,
    Permit,
}

fn related_object(type_code: &str) -> Option<RelatedObject> {
    match type_code {
        "EOR" => Some(RelatedObject::TailingsFacility),
        "PMT" => Some(RelatedObject::Permit),
        _ => None,
    }
}

/// `(permit_guid, tailings_facility_guid)` for a related guid under `type_code`.
fn assign_related_guid(type_code: &str, related: Option<Uuid>) -> (Option<Uuid>, Option<Uuid>) {
    match related_object(type_code) {
        Some(RelatedObject::Permit) => (related, None),
        Some(RelatedObject::TailingsFacility) => (None, related),
        None => (None, None),
    }
}

/// Related columns after an update: `requested` is the body's `related_guid` when the key
/// was sent, otherwise the stored column that belongs to `type_code` carries over.
/// The column that does not belong to `type_code` is always cleared.
fn resolve_related(
    type_code: &str,
    requested: Option<Option<Uuid>>,
    permit: Option<Uuid>,
    tsf: Option<Uuid>,
) -> (Option<Uuid>, Option<Uuid>) {
    let related = requested.unwrap_or(match related_object(type_code) {
        Some(RelatedObject::Permit) => permit,
        Some(RelatedObject::TailingsFacility) => tsf,
        None => None,
    });
    assign_related_guid(type_code, related)
}

fn require_related(type_code: &str, permit: Option<Uuid>, tsf: Option<Uuid>) -> AppResult<()> {
    match related_object(type_code) {
        Some(RelatedObject::TailingsFacility) if tsf.is_none() => Err(AppError::BadRequest(
            "mine_tailings_storage_facility_guid must be provided for Engineer of Record".to_string(),
        )),
        Some(RelatedObject::Permit) if permit.is_none() => {
            Err(AppError::BadRequest("permit_guid must be provided for Permittee".to_string()))
        }
        _ => Ok(()),
    }
}

fn parse_date_field(raw: Option<&str>, field: &str) -> AppResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date(s).map(Some).ok_or_else(|| AppError::ValidationError {
            field: field.to_string(),
            message: format!("'{}' is not a valid date (expected YYYY-MM-DD)", s),
        }),
        None => Ok(None),
    }
}

fn parse_optional_guid(raw: Option<&str>, field: &str) -> AppResult<Option<Uuid>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_field_guid(s, field).map(Some),
        None => Ok(None),
    }
}

fn check_date_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(AppError::ValidationError {
            field: "end_date".to_string(),
            message: "end_date must not be before start_date".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Description of an appointment type, served from the LRU cache when possible.
async fn appt_type_description(state: &AppState, type_code: &str) -> String {
    if let Some(desc) = state.appt_type_names.lock().await.get(type_code) {
        return desc.clone();
    }
    let fetched: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT description FROM mine_party_appt_type_code WHERE mine_party_appt_type_code = $1")
            .bind(type_code)
            .fetch_optional(&state.db)
            .await;
    match fetched {
        Ok(Some(desc)) => {
            state.appt_type_names.lock().await.put(type_code.to_string(), desc.clone());
            desc
        }
        Ok(None) => type_code.to_string(),
        Err(e) => {
            tracing::warn!("Failed to load appointment type {}: {}", type_code, e);
            type_code.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Create,
    Update,
}

/// Turns integrity-rule rejections into 400s; anything else stays a database error.
async fn write_error(state: &AppState, err: sqlx::Error, type_code: &str, kind: WriteKind) -> AppError {
    let Some((constraint, message)) = constraint_kind(&err) else {
        return err.into();
    };
    state.metrics.inc_constraint_violations();
    tracing::warn!(type_code, "Appointment write rejected: {}", message);

    if constraint.is_daterange_exclusion(&message) {
        let desc = appt_type_description(state, type_code).await;
        return AppError::Constraint(match kind {
            WriteKind::Create => format!(
                "Error: Date ranges for {desc} must not overlap, please set end date on existing {desc} appointment."
            ),
            WriteKind::Update => format!("Error: Date ranges for {desc} must not overlap."),
        });
    }
    match constraint {
        ConstraintKind::ForeignKey(name) => AppError::Constraint(format!(
            "Referenced record does not exist ({})",
            name.unwrap_or_else(|| "foreign key".to_string())
        )),
        ConstraintKind::Unique(_) | ConstraintKind::Exclusion(_) => AppError::Constraint(message),
    }
}

async fn find_appointment(db: &PgPool, guid: Uuid) -> Result<Option<MinePartyAppointment>, sqlx::Error> {
    sqlx::query_as::<_, MinePartyAppointment>(&format!(
        "{} WHERE a.mine_party_appt_guid = $1 AND a.deleted_ind = FALSE",
        APPT_SELECT
    ))
    .bind(guid)
    .fetch_optional(db)
    .await
}

/// Splits repeated and comma-separated values of `key`.
fn multi_value(params: &[(String, String)], key: &str) -> Vec<String> {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .flat_map(|(_, v)| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn single_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str()).filter(|v| !v.trim().is_empty())
}

pub async fn list_appointments(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<Records<MinePartyAppointment>>> {
    let mine_guid = parse_optional_guid(single_value(&params, "mine_guid"), "mine_guid")?;
    let party_guid = parse_optional_guid(single_value(&params, "party_guid"), "party_guid")?;
    let types = multi_value(&params, "types");
    let with_party = multi_value(&params, "relationships").iter().any(|r| r == "party");

    let mut qb = QueryBuilder::new(APPT_SELECT);
    qb.push(" WHERE a.deleted_ind = FALSE");
    if let Some(mine_guid) = mine_guid {
        qb.push(" AND a.mine_guid = ").push_bind(mine_guid);
    }
    if let Some(party_guid) = party_guid {
        qb.push(" AND a.party_guid = ").push_bind(party_guid);
    }
    if !types.is_empty() {
        qb.push(" AND a.mine_party_appt_type_code = ANY(").push_bind(types).push(")");
    }
    qb.push(" ORDER BY a.start_date DESC NULLS LAST, a.mine_party_appt_id");
    let mut records: Vec<MinePartyAppointment> = qb.build_query_as().fetch_all(&state.db).await?;

    if with_party && !records.is_empty() {
        let guids: Vec<Uuid> = records.iter().map(|r| r.party_guid).collect();
        let parties: Vec<Party> = sqlx::query_as(
            "SELECT party_guid, first_name, party_name, party_type_code, email, phone_no \
             FROM party WHERE party_guid = ANY($1)",
        )
        .bind(guids)
        .fetch_all(&state.db)
        .await?;
        let by_guid: HashMap<Uuid, Party> = parties.into_iter().map(|p| (p.party_guid, p)).collect();
        for record in &mut records {
            record.party = by_guid.get(&record.party_guid).cloned();
        }
    }

    Ok(Json(records.into()))
}

pub async fn create_appointment(
    auth: RequireRole<CreateRole>,
    State(state): State<AppState>,
    payload: Result<Json<CreatePartyAppointmentRequest>, JsonRejection>,
) -> AppResult<Json<MinePartyAppointment>> {
    let body = json_body(payload)?;

    let mine_guid = parse_field_guid(&require_non_empty(body.mine_guid, "mine_guid")?, "mine_guid")?;
    let party_guid = parse_field_guid(&require_non_empty(body.party_guid, "party_guid")?, "party_guid")?;
    let type_code = require_non_empty(body.mine_party_appt_type_code, "mine_party_appt_type_code")?;
    let type_code = type_code.trim().to_string();
    let start_date = parse_date_field(body.start_date.as_deref(), "start_date")?;
    let end_date = parse_date_field(body.end_date.as_deref(), "end_date")?;
    check_date_order(start_date, end_date)?;

    let related = parse_optional_guid(body.related_guid.as_deref(), "related_guid")?;
    let (permit_guid, tsf_guid) = assign_related_guid(&type_code, related);
    require_related(&type_code, permit_guid, tsf_guid)?;

    let appt_guid = Uuid::new_v4();
    let inserted = sqlx::query(
        r#"INSERT INTO mine_party_appt (mine_party_appt_guid, mine_guid, party_guid, mine_party_appt_type_code,
                                        permit_guid, mine_tailings_storage_facility_guid, start_date, end_date,
                                        processed_by, processed_on, create_user, update_user)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), $9, $9)"#,
    )
    .bind(appt_guid)
    .bind(mine_guid)
    .bind(party_guid)
    .bind(&type_code)
    .bind(permit_guid)
    .bind(tsf_guid)
    .bind(start_date)
    .bind(end_date)
    .bind(auth.username())
    .execute(&state.db)
    .await;
    if let Err(e) = inserted {
        return Err(write_error(&state, e, &type_code, WriteKind::Create).await);
    }

    let appt = find_appointment(&state.db, appt_guid).await?.ok_or_not_found("Mine Party Appointment")?;
    state.metrics.inc_appointments_created();
    tracing::info!(user = %auth.username(), appointment = %appt_guid, type_code = %type_code, "Created party appointment");
    Ok(Json(appt))
}

pub async fn get_appointment(
    _auth: RequireRole<ViewRole>,
    State(state): State<AppState>,
    Path(appt_guid): Path<String>,
) -> AppResult<Json<MinePartyAppointment>> {
    let appt_guid = parse_guid(&appt_guid, "Mine Party Appointment")?;
    let appt = find_appointment(&state.db, appt_guid)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;
    Ok(Json(appt))
}

pub async fn update_appointment(
    auth: RequireRole<CreateRole>,
    State(state): State<AppState>,
    Path(appt_guid): Path<String>,
    payload: Result<Json<UpdatePartyAppointmentRequest>, JsonRejection>,
) -> AppResult<Json<MinePartyAppointment>> {
    let appt_guid = parse_guid(&appt_guid, "Mine Party Appointment")?;
    let existing = find_appointment(&state.db, appt_guid)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;
    let body = json_body(payload)?;

    let type_code = match body.mine_party_appt_type_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => code.to_string(),
        None => existing.mine_party_appt_type_code.clone(),
    };
    let start_date = match &body.start_date {
        Some(raw) => parse_date_field(raw.as_deref(), "start_date")?,
        None => existing.start_date,
    };
    let end_date = match &body.end_date {
        Some(raw) => parse_date_field(raw.as_deref(), "end_date")?,
        None => existing.end_date,
    };
    check_date_order(start_date, end_date)?;

    let requested = match &body.related_guid {
        Some(raw) => Some(parse_optional_guid(raw.as_deref(), "related_guid")?),
        None => None,
    };
    let (permit_guid, tsf_guid) = resolve_related(
        &type_code,
        requested,
        existing.permit_guid,
        existing.mine_tailings_storage_facility_guid,
    );
    require_related(&type_code, permit_guid, tsf_guid)?;

    let updated = sqlx::query(
        r#"UPDATE mine_party_appt
           SET mine_party_appt_type_code = $1,
               permit_guid = $2,
               mine_tailings_storage_facility_guid = $3,
               start_date = $4,
               end_date = $5,
               update_user = $6,
               update_timestamp = now()
           WHERE mine_party_appt_guid = $7 AND deleted_ind = FALSE"#,
    )
    .bind(&type_code)
    .bind(permit_guid)
    .bind(tsf_guid)
    .bind(start_date)
    .bind(end_date)
    .bind(auth.username())
    .bind(appt_guid)
    .execute(&state.db)
    .await;
    match updated {
        Ok(result) if result.rows_affected() == 0 => return Err(AppError::NotFound(NOT_FOUND.to_string())),
        Ok(_) => {}
        Err(e) => return Err(write_error(&state, e, &type_code, WriteKind::Update).await),
    }

    let appt = find_appointment(&state.db, appt_guid)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;
    state.metrics.inc_appointments_updated();
    tracing::info!(user = %auth.username(), appointment = %appt_guid, "Updated party appointment");
    Ok(Json(appt))
}

pub async fn delete_appointment(
    auth: RequireRole<CreateRole>,
    State(state): State<AppState>,
    Path(appt_guid): Path<String>,
) -> AppResult<StatusCode> {
    let appt_guid = parse_guid(&appt_guid, "Mine Party Appointment")?;
    let result = sqlx::query(
        r#"UPDATE mine_party_appt
           SET deleted_ind = TRUE, update_user = $1, update_timestamp = now()
           WHERE mine_party_appt_guid = $2 AND deleted_ind = FALSE"#,
    )
    .bind(auth.username())
    .bind(appt_guid)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(NOT_FOUND.to_string()));
    }

    state.metrics.inc_appointments_deleted();
    tracing::info!(user = %auth.username(), appointment = %appt_guid, "Deleted party appointment");
    Ok(StatusCode::NO_CONTENT)
}
