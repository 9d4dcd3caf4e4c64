//! Diagnostic event-log listing (spec §3, §4.7). Not semantically
//! load-bearing — consumed by the operator UI and tests.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::db;
use crate::pagination;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub mid: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

fn row_to_json(row: db::event_log::EventLogRow) -> serde_json::Value {
    serde_json::json!({
        "id": row.id,
        "mid": row.mid,
        "kind": row.kind,
        "detail": row.detail,
        "created_at": row.created_at,
    })
}

/// `GET /api/v1/events`.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> crate::error::ApiResult<Json<Vec<serde_json::Value>>> {
    let limit = pagination::clamp_limit(query.limit);
    let after = query
        .cursor
        .as_deref()
        .and_then(pagination::decode);

    if let Some(pool) = &state.pool {
        let (after_id, after_created) = after.map(|(i, c)| (Some(i), Some(c))).unwrap_or((None, None));
        let rows = db::event_log::list_page(
            pool,
            query.mid.as_deref(),
            after_id,
            after_created,
            limit,
        )
        .await?;
        return Ok(Json(rows.into_iter().map(row_to_json).collect()));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    let mut rows: Vec<_> = store
        .event_log
        .iter()
        .filter(|e| query.mid.as_deref().is_none_or(|m| e.mid.as_deref() == Some(m)))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    if let Some((after_id, after_created)) = after {
        rows.retain(|e| (e.created_at, e.id) < (after_created, after_id));
    }
    rows.truncate(limit as usize);
    Ok(Json(rows.into_iter().map(row_to_json).collect()))
}
