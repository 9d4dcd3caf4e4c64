//! Command store. Enqueue is owned by the web API; every status
//! transition goes through `guarded_transition`, the atomic
//! "update where status = expected" primitive of spec §4.1.

use auv_protocol::commands::CommandStatus;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommandRow {
    pub id: Uuid,
    pub mid: String,
    pub seq: i64,
    pub cmd: String,
    pub args: serde_json::Value,
    pub plan_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issued_hb_seq: Option<i64>,
    pub executing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CommandRow {
    pub fn status(&self) -> CommandStatus {
        CommandStatus::from_str(&self.status).expect("status column holds a valid CommandStatus")
    }
}

/// `true` if `mid` already has a command in `{QUEUED, ISSUED, EXECUTING}`.
pub async fn has_in_flight(pool: &PgPool, mid: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM commands WHERE mid = $1 AND status IN ('QUEUED','ISSUED','EXECUTING'))",
    )
    .bind(mid)
    .fetch_one(pool)
    .await
}

/// Enqueues a new command, assigning `seq = max(seq)+1` for this `mid`
/// inside the same statement (spec §4.3). Caller must have already
/// checked `has_in_flight` inside the same transaction to avoid a race.
pub async fn enqueue(
    pool: &PgPool,
    mid: &str,
    cmd: &str,
    args: &serde_json::Value,
    plan_hash: &str,
) -> Result<CommandRow, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>(
        "INSERT INTO commands (id, mid, seq, cmd, args, plan_hash, status, created_at)
         SELECT $1, $2, COALESCE((SELECT MAX(seq) FROM commands WHERE mid = $2), 0) + 1,
                $3, $4, $5, 'QUEUED', now()
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(mid)
    .bind(cmd)
    .bind(args)
    .bind(plan_hash)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<CommandRow>, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>("SELECT * FROM commands WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_mid_seq(
    pool: &PgPool,
    mid: &str,
    seq: i64,
) -> Result<Option<CommandRow>, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>("SELECT * FROM commands WHERE mid = $1 AND seq = $2")
        .bind(mid)
        .bind(seq)
        .fetch_optional(pool)
        .await
}

/// The command dispensed for the given `hb_seq`, used to answer a
/// replayed heartbeat with the exact same command it returned the first
/// time (spec §4.2 Idempotence).
pub async fn issued_for_hb_seq<'c, E>(
    executor: E,
    mid: &str,
    hb_seq: i64,
) -> Result<Option<CommandRow>, sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query_as::<_, CommandRow>("SELECT * FROM commands WHERE mid = $1 AND issued_hb_seq = $2")
        .bind(mid)
        .bind(hb_seq)
        .fetch_optional(executor)
        .await
}

/// Oldest `QUEUED` command for `mid`, for dispensation (spec §4.2).
/// Generic over the executor so the caller can run the read inside the
/// same transaction as the subsequent `try_issue`.
pub async fn oldest_queued<'c, E>(
    executor: E,
    mid: &str,
) -> Result<Option<CommandRow>, sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM commands WHERE mid = $1 AND status = 'QUEUED' ORDER BY seq ASC LIMIT 1",
    )
    .bind(mid)
    .fetch_optional(executor)
    .await
}

/// Guarded transition: `QUEUED -> ISSUED`, stamping `issued_at` and the
/// dispensing `hb_seq`. Returns `false` if another worker already claimed
/// this row (zero rows affected, per §4.1) — the caller retries once with
/// the next candidate.
pub async fn try_issue<'c, E>(
    executor: E,
    id: Uuid,
    hb_seq: i64,
    issued_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    let result = sqlx::query(
        "UPDATE commands SET status = 'ISSUED', issued_at = $2, issued_hb_seq = $3
         WHERE id = $1 AND status = 'QUEUED'",
    )
    .bind(id)
    .bind(issued_at)
    .bind(hb_seq)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Guarded transition: `ISSUED -> EXECUTING`.
pub async fn try_start_executing(
    pool: &PgPool,
    id: Uuid,
    executing_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE commands SET status = 'EXECUTING', executing_at = $2
         WHERE id = $1 AND status = 'ISSUED'",
    )
    .bind(id)
    .bind(executing_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Guarded transition: `ISSUED -> CANCELED` (failed descent check).
pub async fn try_cancel(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE commands SET status = 'CANCELED' WHERE id = $1 AND status = 'ISSUED'")
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Guarded transition: `EXECUTING -> COMPLETED` or `EXECUTING -> ERROR`.
pub async fn try_finish(
    pool: &PgPool,
    id: Uuid,
    ok: bool,
    completed_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let status = if ok { "COMPLETED" } else { "ERROR" };
    let result = sqlx::query(
        "UPDATE commands SET status = $2, completed_at = $3 WHERE id = $1 AND status = 'EXECUTING'",
    )
    .bind(id)
    .bind(status)
    .bind(completed_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Guarded transition: `QUEUED -> EXPIRED` for commands older than `ttl`.
/// Safe to run concurrently with ingest dispensation since both are
/// guarded on `status = 'QUEUED'` (spec §4.3).
pub async fn expire_stale(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE commands SET status = 'EXPIRED'
         WHERE status = 'QUEUED' AND created_at < $1
         RETURNING id",
    )
    .bind(older_than)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Paginated listing for the web API.
pub async fn list_page(
    pool: &PgPool,
    mid: Option<&str>,
    status: Option<&str>,
    after_id: Option<Uuid>,
    after_created: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<CommandRow>, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM commands
         WHERE ($1::text IS NULL OR mid = $1)
           AND ($2::text IS NULL OR status = $2)
           AND ($3::timestamptz IS NULL OR created_at < $3
                OR (created_at = $3 AND id < $4))
         ORDER BY created_at DESC, id DESC
         LIMIT $5",
    )
    .bind(mid)
    .bind(status)
    .bind(after_created)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
