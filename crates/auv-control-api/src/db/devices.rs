//! Device rollup queries. Owned exclusively by the heartbeat ingest path
//! (spec §3 Ownership) — nothing else in this crate writes to `devices`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Device rollup row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    pub mid: String,
    pub firmware_tag: Option<String>,
    pub last_hb_seq: Option<i64>,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub last_state: Option<String>,
    pub last_position: Option<serde_json::Value>,
    pub last_power: Option<serde_json::Value>,
    pub last_environment: Option<serde_json::Value>,
    pub last_network: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List all devices, most recently contacted first.
pub async fn list_all(pool: &PgPool, limit: i64) -> Result<Vec<DeviceRow>, sqlx::Error> {
    sqlx::query_as::<_, DeviceRow>(
        "SELECT * FROM devices ORDER BY last_contact_at DESC NULLS LAST, mid LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Get a device by its `mid`.
pub async fn get(pool: &PgPool, mid: &str) -> Result<Option<DeviceRow>, sqlx::Error> {
    sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE mid = $1")
        .bind(mid)
        .fetch_optional(pool)
        .await
}

pub async fn exists(pool: &PgPool, mid: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM devices WHERE mid = $1)")
        .bind(mid)
        .fetch_one(pool)
        .await
}

/// Upsert the rollup, but only if `hb_seq` is fresher than what's stored
/// (spec §4.2 step 2: "late/duplicate frames must not clobber a newer
/// rollup"). The `WHERE` clause on the conflict branch makes this atomic:
/// a concurrent writer with a smaller `hb_seq` is a silent no-op.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_if_fresher<'c, E>(
    executor: E,
    mid: &str,
    hb_seq: i64,
    contact_at: DateTime<Utc>,
    state: &str,
    position: Option<&serde_json::Value>,
    power: Option<&serde_json::Value>,
    environment: Option<&serde_json::Value>,
    network: Option<&serde_json::Value>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        "INSERT INTO devices (mid, last_hb_seq, last_contact_at, last_state, last_position, last_power, last_environment, last_network, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
         ON CONFLICT (mid) DO UPDATE SET
            last_hb_seq = EXCLUDED.last_hb_seq,
            last_contact_at = EXCLUDED.last_contact_at,
            last_state = EXCLUDED.last_state,
            last_position = EXCLUDED.last_position,
            last_power = EXCLUDED.last_power,
            last_environment = EXCLUDED.last_environment,
            last_network = EXCLUDED.last_network,
            updated_at = now()
         WHERE devices.last_hb_seq IS NULL OR devices.last_hb_seq <= EXCLUDED.last_hb_seq",
    )
    .bind(mid)
    .bind(hb_seq)
    .bind(contact_at)
    .bind(state)
    .bind(position)
    .bind(power)
    .bind(environment)
    .bind(network)
    .execute(executor)
    .await?;
    Ok(())
}
