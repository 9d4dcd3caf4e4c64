//! Command dispatch endpoints (spec §4.3, §4.7).

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use auv_protocol::commands::{Command, plan_hash};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::pagination;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub mid: String,
    pub cmd: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ListCommandsQuery {
    pub mid: Option<String>,
    pub status: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

fn row_to_command(row: db::commands::CommandRow) -> Command {
    let status = row.status();
    Command {
        id: row.id,
        mid: row.mid,
        seq: row.seq,
        cmd: row.cmd,
        args: row.args,
        plan_hash: row.plan_hash,
        status,
        created_at: row.created_at,
        issued_at: row.issued_at,
        executing_at: row.executing_at,
        completed_at: row.completed_at,
    }
}

/// `POST /api/v1/commands` — enqueue a command for a device. Rejects with
/// `CONFLICT` if the device already has an in-flight command (spec §4.3,
/// §8 S6).
pub async fn enqueue_command(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<Json<Command>> {
    let hash = plan_hash(&req.cmd, &req.args);

    if let Some(pool) = &state.pool {
        if !db::devices::exists(pool, &req.mid).await? {
            return Err(ApiError::UnknownDevice(req.mid));
        }
        if db::commands::has_in_flight(pool, &req.mid).await? {
            return Err(ApiError::Conflict(format!(
                "device '{}' already has an in-flight command",
                req.mid
            )));
        }
        // `has_in_flight` is a fast-path pre-check only: two requests can
        // both pass it before either inserts. `idx_commands_mid_in_flight`
        // (a partial unique index on mid WHERE status is in-flight) is the
        // actual guard, so a concurrent loser lands here as a unique
        // violation rather than a second in-flight row (spec §4.3 Testable
        // Property 2, §8 S6).
        let row = match db::commands::enqueue(pool, &req.mid, &req.cmd, &req.args, &hash).await {
            Ok(row) => row,
            Err(sqlx::Error::Database(dbe)) if dbe.is_unique_violation() => {
                return Err(ApiError::Conflict(format!(
                    "device '{}' already has an in-flight command",
                    req.mid
                )));
            }
            Err(err) => return Err(err.into()),
        };
        return Ok(Json(row_to_command(row)));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let mut store = memory.write().await;
    if !store.devices.contains_key(&req.mid) {
        return Err(ApiError::UnknownDevice(req.mid));
    }
    let in_flight = store
        .commands
        .iter()
        .any(|c| c.mid == req.mid && matches!(c.status.as_str(), "QUEUED" | "ISSUED" | "EXECUTING"));
    if in_flight {
        return Err(ApiError::Conflict(format!(
            "device '{}' already has an in-flight command",
            req.mid
        )));
    }
    let seq = store
        .commands
        .iter()
        .filter(|c| c.mid == req.mid)
        .map(|c| c.seq)
        .max()
        .unwrap_or(0)
        + 1;
    let row = db::commands::CommandRow {
        id: Uuid::now_v7(),
        mid: req.mid,
        seq,
        cmd: req.cmd,
        args: req.args,
        plan_hash: hash,
        status: "QUEUED".to_string(),
        created_at: Utc::now(),
        issued_at: None,
        issued_hb_seq: None,
        executing_at: None,
        completed_at: None,
    };
    store.commands.push(row.clone());
    Ok(Json(row_to_command(row)))
}

/// `GET /api/v1/commands` — paginated listing with optional `mid`/`status`.
pub async fn list_commands(
    State(state): State<AppState>,
    Query(query): Query<ListCommandsQuery>,
) -> ApiResult<Json<Vec<Command>>> {
    let limit = pagination::clamp_limit(query.limit);
    let after = query
        .cursor
        .as_deref()
        .and_then(pagination::decode);

    if let Some(pool) = &state.pool {
        let (after_id, after_created) = after.map(|(i, c)| (Some(i), Some(c))).unwrap_or((None, None));
        let rows = db::commands::list_page(
            pool,
            query.mid.as_deref(),
            query.status.as_deref(),
            after_id,
            after_created,
            limit,
        )
        .await?;
        return Ok(Json(rows.into_iter().map(row_to_command).collect()));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    let mut rows: Vec<_> = store
        .commands
        .iter()
        .filter(|c| query.mid.as_deref().is_none_or(|m| c.mid == m))
        .filter(|c| query.status.as_deref().is_none_or(|s| c.status == s))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    if let Some((after_id, after_created)) = after {
        rows.retain(|c| (c.created_at, c.id) < (after_created, after_id));
    }
    rows.truncate(limit as usize);
    Ok(Json(rows.into_iter().map(row_to_command).collect()))
}

/// `GET /api/v1/commands/{id}` — a single command by id.
pub async fn get_command(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Command>> {
    if let Some(pool) = &state.pool {
        let row = db::commands::get_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::UnknownCommand(id.to_string()))?;
        return Ok(Json(row_to_command(row)));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    store
        .commands
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .map(row_to_command)
        .map(Json)
        .ok_or_else(|| ApiError::UnknownCommand(id.to_string()))
}
