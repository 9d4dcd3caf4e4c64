//! Database access layer for PostgreSQL.
//!
//! Each sub-module provides typed query functions over a `PgPool`. Every
//! mutating query here follows one of the three primitives of §4.1: an
//! idempotent upsert (devices), an insert-if-absent keyed on a natural key
//! (heartbeats, descent_checks), or a guarded transition (commands).

pub mod commands;
pub mod descent_checks;
pub mod devices;
pub mod dives;
pub mod event_log;
pub mod heartbeats;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect to PostgreSQL, size the pool, and run migrations.
pub async fn connect(database_url: &str, pool_size: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(pool_size)
        .connect(database_url)
        .await?;

    tracing::info!("running database migrations");
    sqlx::raw_sql(include_str!("../../migrations/001_devices.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/002_heartbeats.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/003_commands.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/004_descent_checks.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/005_dives.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/006_event_log.sql"))
        .execute(&pool)
        .await?;
    tracing::info!("migrations complete");

    Ok(pool)
}

/// Truncates all six tables in FK-safe order. Gated by `ADMIN_RESET_ENABLED`
/// at the route layer (§4.8); this function itself performs no check.
pub async fn reset_all(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        "TRUNCATE TABLE event_log, dives, descent_checks, commands, heartbeats, devices",
    )
    .execute(pool)
    .await?;
    Ok(())
}
