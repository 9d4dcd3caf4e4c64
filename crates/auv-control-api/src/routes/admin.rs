//! `POST /admin/reset-db` (spec §4.8): truncates all tables. Development
//! only — a 404, not a 403, when `ADMIN_RESET_ENABLED` is unset, so the
//! route's mere existence isn't discoverable in production.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::ApiResult;
use crate::state::{AppState, MemoryStore};

pub async fn reset_db(State(state): State<AppState>) -> Response {
    if !state.config.admin_reset_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match reset(state).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn reset(state: AppState) -> ApiResult<serde_json::Value> {
    if let Some(pool) = &state.pool {
        crate::db::reset_all(pool).await?;
    } else {
        let memory = state.memory.as_ref().expect("memory backend configured");
        let mut store = memory.write().await;
        *store = MemoryStore::default();
    }

    tracing::warn!("admin reset-db executed");
    Ok(serde_json::json!({"reset": true}))
}
