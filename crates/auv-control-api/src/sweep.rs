//! Command expiration sweep (spec §4.3): a long-running task, started at
//! boot and owned by the process lifecycle, that moves `QUEUED` commands
//! older than `COMMAND_TTL_SECONDS` to `EXPIRED` on a fixed cadence.
//!
//! Safe to run concurrently with heartbeat dispensation: both guard on
//! `status = 'QUEUED'` (spec §4.1, §4.3).

use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::state::AppState;

/// Run the sweep loop at `state.config.expire_sweep_secs`, expiring
/// commands older than `state.config.command_ttl_secs`. Runs until the
/// task is cancelled; intended to be spawned once at boot.
pub async fn run(state: AppState) {
    let mut ticker = time::interval(Duration::from_secs(state.config.expire_sweep_secs.max(1)));
    loop {
        ticker.tick().await;
        match sweep_once(&state).await {
            Ok(expired) if !expired.is_empty() => {
                tracing::info!(count = expired.len(), "expired stale commands");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "expiration sweep failed"),
        }
    }
}

/// One sweep pass, returning the ids of commands moved to `EXPIRED`.
/// Split out from `run` so tests can drive it without waiting on a timer.
pub async fn sweep_once(state: &AppState) -> Result<Vec<uuid::Uuid>, sqlx::Error> {
    let older_than = Utc::now() - chrono::Duration::seconds(state.config.command_ttl_secs as i64);

    if let Some(pool) = &state.pool {
        return crate::db::commands::expire_stale(pool, older_than).await;
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let mut store = memory.write().await;
    let expired: Vec<uuid::Uuid> = store
        .commands
        .iter_mut()
        .filter(|c| c.status == "QUEUED" && c.created_at < older_than)
        .map(|c| {
            c.status = "EXPIRED".to_string();
            c.id
        })
        .collect();
    Ok(expired)
}
