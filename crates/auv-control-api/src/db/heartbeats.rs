//! Heartbeat log: append-only, insert-if-absent on the natural key
//! `(mid, hb_seq)` (spec §3, §4.1).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HeartbeatRow {
    pub id: Uuid,
    pub mid: String,
    pub hb_seq: i64,
    pub ts_utc: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Inserts the heartbeat if `(mid, hb_seq)` hasn't been seen before.
/// Returns `true` if this call performed the insert, `false` if the row
/// already existed — callers use this to decide whether dispensation is
/// a fresh draw or a replay (spec §4.2 Idempotence).
///
/// Generic over the executor so callers can run it inside the
/// transaction that also covers the device rollup and dispensation
/// (spec §4.2: ingest, rollup, and dispense commit or fail together).
pub async fn insert_if_absent<'c, E>(
    executor: E,
    mid: &str,
    hb_seq: i64,
    ts_utc: DateTime<Utc>,
    payload: &serde_json::Value,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    let row: Option<(Uuid,)> = sqlx::query_as(
        "INSERT INTO heartbeats (id, mid, hb_seq, ts_utc, received_at, payload)
         VALUES ($1, $2, $3, $4, now(), $5)
         ON CONFLICT (mid, hb_seq) DO NOTHING
         RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(mid)
    .bind(hb_seq)
    .bind(ts_utc)
    .bind(payload)
    .fetch_optional(executor)
    .await?;
    Ok(row.is_some())
}

/// Lists heartbeats for a `mid` ascending by `hb_seq`, optionally bounded
/// by a time window on `ts_utc` (used by the trajectory builder, §4.6).
pub async fn list_for_mid(
    pool: &PgPool,
    mid: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<HeartbeatRow>, sqlx::Error> {
    sqlx::query_as::<_, HeartbeatRow>(
        "SELECT * FROM heartbeats
         WHERE mid = $1
           AND ($2::timestamptz IS NULL OR ts_utc >= $2)
           AND ($3::timestamptz IS NULL OR ts_utc <= $3)
         ORDER BY hb_seq ASC",
    )
    .bind(mid)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Paginated heartbeat listing for the web API (`GET /telemetry/heartbeats`).
pub async fn list_page(
    pool: &PgPool,
    mid: Option<&str>,
    after_id: Option<Uuid>,
    after_created: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<HeartbeatRow>, sqlx::Error> {
    sqlx::query_as::<_, HeartbeatRow>(
        "SELECT * FROM heartbeats
         WHERE ($1::text IS NULL OR mid = $1)
           AND ($2::timestamptz IS NULL OR received_at < $2
                OR (received_at = $2 AND id < $3))
         ORDER BY received_at DESC, id DESC
         LIMIT $4",
    )
    .bind(mid)
    .bind(after_created)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn latest_for_mid(
    pool: &PgPool,
    mid: &str,
) -> Result<Option<HeartbeatRow>, sqlx::Error> {
    sqlx::query_as::<_, HeartbeatRow>(
        "SELECT * FROM heartbeats WHERE mid = $1 ORDER BY hb_seq DESC LIMIT 1",
    )
    .bind(mid)
    .fetch_optional(pool)
    .await
}
