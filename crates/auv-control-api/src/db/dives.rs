//! Dive history, written exclusively by the ascent reconciler (spec §4.5).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DiveRow {
    pub id: Uuid,
    pub mid: String,
    pub cmd_seq: i64,
    pub ok: bool,
    pub summary: serde_json::Value,
    pub orphan: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Flags `orphan=true` inside the dive's `summary` blob rather than as a
/// standalone field (spec §4.5, §3): the entity field list names no
/// `orphan` field, only a summary that carries the flag.
pub fn summary_with_orphan_flag(summary: &serde_json::Value, orphan: bool) -> serde_json::Value {
    let mut summary = summary.clone();
    if let serde_json::Value::Object(map) = &mut summary {
        map.insert("orphan".to_string(), serde_json::Value::Bool(orphan));
    }
    summary
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &PgPool,
    mid: &str,
    cmd_seq: i64,
    ok: bool,
    summary: &serde_json::Value,
    orphan: bool,
    started_at: Option<DateTime<Utc>>,
) -> Result<DiveRow, sqlx::Error> {
    let summary = summary_with_orphan_flag(summary, orphan);
    sqlx::query_as::<_, DiveRow>(
        "INSERT INTO dives (id, mid, cmd_seq, ok, summary, orphan, started_at, ended_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(mid)
    .bind(cmd_seq)
    .bind(ok)
    .bind(&summary)
    .bind(orphan)
    .bind(started_at)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DiveRow>, sqlx::Error> {
    sqlx::query_as::<_, DiveRow>("SELECT * FROM dives WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Dives for a `mid` in a time window, used to derive the trajectory
/// builder's dive-segment boundaries (spec §4.6).
pub async fn list_for_mid(
    pool: &PgPool,
    mid: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<DiveRow>, sqlx::Error> {
    sqlx::query_as::<_, DiveRow>(
        "SELECT * FROM dives
         WHERE mid = $1
           AND ($2::timestamptz IS NULL OR ended_at >= $2)
           AND ($3::timestamptz IS NULL OR started_at IS NULL OR started_at <= $3)
         ORDER BY ended_at ASC",
    )
    .bind(mid)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

pub async fn list_page(
    pool: &PgPool,
    mid: Option<&str>,
    after_id: Option<Uuid>,
    after_created: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<DiveRow>, sqlx::Error> {
    sqlx::query_as::<_, DiveRow>(
        "SELECT * FROM dives
         WHERE ($1::text IS NULL OR mid = $1)
           AND ($2::timestamptz IS NULL OR created_at < $2
                OR (created_at = $2 AND id < $3))
         ORDER BY created_at DESC, id DESC
         LIMIT $4",
    )
    .bind(mid)
    .bind(after_created)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
