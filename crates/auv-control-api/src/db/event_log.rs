//! Diagnostic trail. Not semantically load-bearing — consumed by the
//! operator UI and tests, never read back by the core (spec §3).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventLogRow {
    pub id: Uuid,
    pub mid: Option<String>,
    pub kind: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub async fn insert(
    pool: &PgPool,
    mid: Option<&str>,
    kind: &str,
    detail: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO event_log (id, mid, kind, detail, created_at) VALUES ($1, $2, $3, $4, now())",
    )
    .bind(Uuid::now_v7())
    .bind(mid)
    .bind(kind)
    .bind(detail)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_page(
    pool: &PgPool,
    mid: Option<&str>,
    after_id: Option<Uuid>,
    after_created: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<EventLogRow>, sqlx::Error> {
    sqlx::query_as::<_, EventLogRow>(
        "SELECT * FROM event_log
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
