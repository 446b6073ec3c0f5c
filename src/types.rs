use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// Entities as marshaled to clients

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Mine {
    pub mine_guid: Uuid,
    pub mine_no: String,
    pub mine_name: String,
    pub create_user: String,
    pub update_user: String,
    pub update_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Permit {
    pub permit_id: i32,
    pub permit_guid: Uuid,
    pub mine_guid: Uuid,
    pub permit_no: String,
    pub permit_status_code: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Party {
    pub party_guid: Uuid,
    pub first_name: Option<String>,
    pub party_name: String,
    pub party_type_code: String,
    pub email: Option<String>,
    pub phone_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MineReport {
    pub mine_report_id: i32,
    pub mine_report_guid: Uuid,
    pub mine_report_definition_id: i32,
    pub mine_report_definition_guid: Option<Uuid>,
    pub report_name: Option<String>,
    pub mine_guid: Uuid,
    pub permit_id: Option<i32>,
    pub permit_guid: Option<Uuid>,
    #[serde(with = "date_only_opt")]
    pub received_date: Option<DateTime<Utc>>,
    #[serde(with = "date_only")]
    pub due_date: DateTime<Utc>,
    pub submission_year: Option<i32>,
    pub create_user: String,
    pub update_user: String,
    pub update_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MinePartyAppointment {
    pub mine_party_appt_id: i32,
    pub mine_party_appt_guid: Uuid,
    pub mine_guid: Uuid,
    pub party_guid: Uuid,
    pub mine_party_appt_type_code: String,
    pub mine_party_appt_type_description: Option<String>,
    pub permit_guid: Option<Uuid>,
    pub mine_tailings_storage_facility_guid: Option<Uuid>,
    /// The permit (PMT) or tailings facility (EOR) the appointment is attached to.
    pub related_guid: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub processed_by: Option<String>,
    pub processed_on: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<Party>,
}

// Response envelopes

#[derive(Debug, Clone, Serialize)]
pub struct Records<T> {
    pub records: Vec<T>,
}

impl<T> From<Vec<T>> for Records<T> {
    fn from(records: Vec<T>) -> Self {
        Self { records }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
}

pub const DEFAULT_PER_PAGE: i64 = 25;
pub const MAX_PER_PAGE: i64 = 500;

impl PageQuery {
    /// Returns `(page, per_page, offset)` with page >= 1 and per_page clamped to 1..=500.
    pub fn normalized(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub records: Vec<T>,
    pub current_page: i64,
    pub total_pages: i64,
    pub items_per_page: i64,
    pub total: i64,
}

impl<T> Paginated<T> {
    pub fn new(records: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };
        Self { records, current_page: page, total_pages, items_per_page: per_page, total }
    }
}

// Request bodies

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateMineReportRequest {
    #[serde(default, deserialize_with = "lenient_i32")]
    pub submission_year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub mine_report_definition_id: Option<i32>,
    #[serde(default)]
    pub due_date: Option<String>,
    /// Guid or permit number.
    #[serde(default)]
    pub permit_guid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateMineReportRequest {
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub received_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreatePartyAppointmentRequest {
    pub mine_guid: Option<String>,
    pub party_guid: Option<String>,
    pub mine_party_appt_type_code: Option<String>,
    pub related_guid: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Partial update: an absent key leaves the column alone, an explicit `null` clears it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdatePartyAppointmentRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub related_guid: Option<Option<String>>,
    #[serde(default)]
    pub mine_party_appt_type_code: Option<String>,
}

// Parsing helpers

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// Accepts `2019`, `"2019"`, `""` and `null`.
fn lenient_i32<'de, D>(de: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match Option::<IntOrString>::deserialize(de)? {
        None => Ok(None),
        Some(IntOrString::Int(v)) => i32::try_from(v).map(Some).map_err(serde::de::Error::custom),
        Some(IntOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(IntOrString::Str(s)) => s
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{}'", s))),
    }
}

/// Parses the timestamp shapes clients send: RFC 3339, Postgres text output
/// (`2019-07-05 20:27:45.11929+00`), naive date-times (taken as UTC) and bare dates.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Parses a calendar date (`YYYY-MM-DD`); full timestamps are truncated to their UTC date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
}

mod date_only {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&dt.format("%Y-%m-%d"))
    }
}

mod date_only_opt {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.collect_str(&dt.format("%Y-%m-%d")),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_postgres_text_timestamp() {
        let dt = parse_datetime("2019-07-05 20:27:45.11929+00").unwrap();
        assert_eq!(dt.year(), 2019);
        assert_eq!(dt.month(), 7);
        assert_eq!(dt.day(), 5);
        assert_eq!(dt.hour(), 20);
    }

    #[test]
    fn test_parse_rfc3339_and_date() {
        let dt = parse_datetime("2019-10-05T10:00:00-07:00").unwrap();
        assert_eq!(dt.hour(), 17);
        let d = parse_datetime("2020-01-31").unwrap();
        assert_eq!(d.date_naive(), NaiveDate::from_ymd_opt(2020, 1, 31).unwrap());
        assert!(parse_datetime("not a date").is_none());
        assert!(parse_datetime("   ").is_none());
    }

    #[test]
    fn test_parse_date_truncates_timestamps() {
        assert_eq!(parse_date("2019-02-03"), NaiveDate::from_ymd_opt(2019, 2, 3));
        assert_eq!(parse_date("2019-02-03 23:00:00+00"), NaiveDate::from_ymd_opt(2019, 2, 3));
        assert!(parse_date("03/02/2019").is_none());
    }

    #[test]
    fn test_lenient_report_fields() {
        let req: CreateMineReportRequest = serde_json::from_value(serde_json::json!({
            "submission_year": "2019",
            "mine_report_definition_id": 4,
            "permit_guid": null,
            "due_date": "2019-07-05"
        }))
        .unwrap();
        assert_eq!(req.submission_year, Some(2019));
        assert_eq!(req.mine_report_definition_id, Some(4));
        assert!(req.permit_guid.is_none());

        let req: CreateMineReportRequest =
            serde_json::from_value(serde_json::json!({ "mine_report_definition_id": null })).unwrap();
        assert!(req.mine_report_definition_id.is_none());
        assert!(req.submission_year.is_none());

        let bad = serde_json::from_value::<CreateMineReportRequest>(serde_json::json!({
            "mine_report_definition_id": "abc"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_partial_update_distinguishes_null_from_absent() {
        let req: UpdatePartyAppointmentRequest =
            serde_json::from_value(serde_json::json!({ "end_date": null, "mine_guid": "ignored" })).unwrap();
        assert_eq!(req.end_date, Some(None));
        assert_eq!(req.start_date, None);
        assert!(req.mine_party_appt_type_code.is_none());
    }

    #[test]
    fn test_page_query_normalization() {
        let q = PageQuery { page: Some(0), per_page: Some(10_000), search: None };
        assert_eq!(q.normalized(), (1, MAX_PER_PAGE, 0));
        let q = PageQuery { page: Some(3), per_page: Some(10), search: None };
        assert_eq!(q.normalized(), (3, 10, 20));
        assert_eq!(PageQuery::default().normalized(), (1, DEFAULT_PER_PAGE, 0));
    }

    #[test]
    fn test_paginated_total_pages() {
        let p: Paginated<u8> = Paginated::new(vec![], 1, 25, 0);
        assert_eq!(p.total_pages, 0);
        let p: Paginated<u8> = Paginated::new(vec![], 1, 25, 26);
        assert_eq!(p.total_pages, 2);
    }
}
