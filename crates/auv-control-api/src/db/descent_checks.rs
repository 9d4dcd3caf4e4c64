//! Descent-check audit log. Append-only regardless of decision (spec §4.4).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DescentCheckRow {
    pub id: Uuid,
    pub mid: String,
    pub check_seq: i64,
    pub cmd_seq: i64,
    pub plan_hash: String,
    pub ok: bool,
    pub reason: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Insert-if-absent on `(mid, check_seq)`, matching the natural-key
/// discipline used for heartbeats.
#[allow(clippy::too_many_arguments)]
pub async fn insert_if_absent(
    pool: &PgPool,
    mid: &str,
    check_seq: i64,
    cmd_seq: i64,
    plan_hash: &str,
    ok: bool,
    reason: Option<&str>,
    payload: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO descent_checks (id, mid, check_seq, cmd_seq, plan_hash, ok, reason, payload, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
         ON CONFLICT (mid, check_seq) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(mid)
    .bind(check_seq)
    .bind(cmd_seq)
    .bind(plan_hash)
    .bind(ok)
    .bind(reason)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(())
}
