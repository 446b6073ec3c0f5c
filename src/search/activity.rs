//! Recent-change feed for a mine, assembled from several tables in parallel.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{fan_out, FanOut, Target};

/// A table whose recently updated rows show up in the activity feed.
#[derive(Debug, Clone, Copy)]
pub struct ActivityTarget {
    pub kind: &'static str,
    pub table: &'static str,
    pub has_deleted_ind: bool,
    pub message: &'static str,
}

impl Target for ActivityTarget {
    fn kind(&self) -> &'static str {
        self.kind
    }
}

pub const ACTIVITY_TARGETS: &[ActivityTarget] = &[
    ActivityTarget { kind: "mine", table: "mine", has_deleted_ind: true, message: "Mine information changed." },
    ActivityTarget { kind: "permit", table: "permit", has_deleted_ind: false, message: "Permit information was changed." },
    ActivityTarget {
        kind: "mine_incident",
        table: "mine_incident",
        has_deleted_ind: false,
        message: "Mine Incident was changed.",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub date: DateTime<Utc>,
    pub message: String,
    pub user: Option<String>,
}

/// Start of the activity window; rows must be updated strictly after it.
pub fn activity_cutoff(now: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    now - Duration::days(window_days)
}

pub fn build_activity_query<'a>(target: &ActivityTarget, mine_guid: Uuid, cutoff: DateTime<Utc>) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new("SELECT update_timestamp, update_user FROM ");
    qb.push(target.table)
        .push(" WHERE update_timestamp > ")
        .push_bind(cutoff)
        .push(" AND mine_guid = ")
        .push_bind(mine_guid);
    if target.has_deleted_ind {
        qb.push(" AND deleted_ind = FALSE");
    }
    qb.push(" ORDER BY update_timestamp DESC");
    qb
}

pub async fn execute_activity_search(
    pool: &PgPool,
    target: ActivityTarget,
    mine_guid: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ActivityEntry>, sqlx::Error> {
    let rows = build_activity_query(&target, mine_guid, cutoff).build().fetch_all(pool).await?;
    rows.into_iter()
        .map(|row| -> Result<ActivityEntry, sqlx::Error> {
            Ok(ActivityEntry {
                date: row.try_get("update_timestamp")?,
                message: target.message.to_string(),
                user: row.try_get("update_user")?,
            })
        })
        .collect()
}

/// Newest-first sort.
pub fn sort_activity(entries: &mut [ActivityEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Changes to `mine_guid` recorded in `targets` within the last `window_days`.
///
/// Each table is queried on its own task, with at most `max_workers` running at once.
/// A table whose query fails contributes nothing; the failure count is returned.
pub async fn collect_mine_activity(
    pool: &PgPool,
    targets: &[ActivityTarget],
    mine_guid: Uuid,
    now: DateTime<Utc>,
    window_days: i64,
    max_workers: usize,
) -> FanOut<ActivityEntry> {
    let cutoff = activity_cutoff(now, window_days);
    let mut feed = fan_out(targets, max_workers, |target| {
        let pool = pool.clone();
        async move { execute_activity_search(&pool, target, mine_guid, cutoff).await }
    })
    .await;
    sort_activity(&mut feed.results);
    feed
}
