//! Dive history read endpoints (spec §4.5, §4.7).

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::pagination;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListDivesQuery {
    pub mid: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// `orphan` rides inside `summary` (spec §4.5, §3), not as a top-level
/// field — `DiveRow.orphan` itself stays a real column only so the store
/// can filter/index on it without parsing JSON.
fn row_to_json(row: db::dives::DiveRow) -> serde_json::Value {
    serde_json::json!({
        "id": row.id,
        "mid": row.mid,
        "cmd_seq": row.cmd_seq,
        "ok": row.ok,
        "summary": row.summary,
        "started_at": row.started_at,
        "ended_at": row.ended_at,
        "created_at": row.created_at,
    })
}

/// `GET /api/v1/dives`.
pub async fn list_dives(
    State(state): State<AppState>,
    Query(query): Query<ListDivesQuery>,
) -> ApiResult<Json<Vec<serde_json::Value>>> {
    let limit = pagination::clamp_limit(query.limit);
    let after = query
        .cursor
        .as_deref()
        .and_then(pagination::decode);

    if let Some(pool) = &state.pool {
        let (after_id, after_created) = after.map(|(i, c)| (Some(i), Some(c))).unwrap_or((None, None));
        let rows = db::dives::list_page(pool, query.mid.as_deref(), after_id, after_created, limit)
            .await?;
        return Ok(Json(rows.into_iter().map(row_to_json).collect()));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    let mut rows: Vec<_> = store
        .dives
        .iter()
        .filter(|d| query.mid.as_deref().is_none_or(|m| d.mid == m))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    if let Some((after_id, after_created)) = after {
        rows.retain(|d| (d.created_at, d.id) < (after_created, after_id));
    }
    rows.truncate(limit as usize);
    Ok(Json(rows.into_iter().map(row_to_json).collect()))
}

/// `GET /api/v1/dives/{id}`.
pub async fn get_dive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(pool) = &state.pool {
        let row = db::dives::get_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::UnknownCommand(id.to_string()))?;
        return Ok(Json(row_to_json(row)));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    store
        .dives
        .iter()
        .find(|d| d.id == id)
        .cloned()
        .map(row_to_json)
        .map(Json)
        .ok_or_else(|| ApiError::UnknownCommand(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::routes::build_router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn get_unknown_dive_is_404() {
        let state = AppState::in_memory(ApiConfig::default());
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::get(format!("/api/v1/dives/{}", Uuid::now_v7()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_returns_seeded_dives() {
        let state = AppState::in_memory(ApiConfig::default());
        {
            let memory = state.memory.as_ref().unwrap();
            let mut store = memory.write().await;
            store.dives.push(db::dives::DiveRow {
                id: Uuid::now_v7(),
                mid: "TR4-001".into(),
                cmd_seq: 1,
                ok: true,
                summary: serde_json::json!({}),
                orphan: false,
                started_at: Some(Utc::now()),
                ended_at: Utc::now(),
                created_at: Utc::now(),
            });
        }
        let app = build_router(state);
        let response = app
            .oneshot(Request::get("/api/v1/dives").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 1);
    }
}
