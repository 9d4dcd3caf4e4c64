//! Device registry read endpoints (spec §4.7). Writes to `devices`
//! belong exclusively to the heartbeat ingest path (spec §3 Ownership);
//! this module only reads the rollup.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use auv_protocol::device::{DeviceSummary, Position};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListDevicesQuery {
    pub limit: Option<i64>,
}

fn row_to_summary(row: db::devices::DeviceRow) -> DeviceSummary {
    DeviceSummary {
        mid: row.mid,
        firmware_tag: row.firmware_tag,
        last_hb_seq: row.last_hb_seq,
        last_contact_at: row.last_contact_at,
        last_state: row.last_state,
        last_position: row
            .last_position
            .and_then(|v| serde_json::from_value::<Position>(v).ok()),
        last_power: row.last_power,
        last_environment: row.last_environment,
        last_network: row.last_network,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// `GET /api/v1/devices`.
pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<ListDevicesQuery>,
) -> ApiResult<Json<Vec<DeviceSummary>>> {
    let limit = crate::pagination::clamp_limit(query.limit);

    if let Some(pool) = &state.pool {
        let rows = db::devices::list_all(pool, limit).await?;
        return Ok(Json(rows.into_iter().map(row_to_summary).collect()));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    let mut rows: Vec<_> = store.devices.values().cloned().collect();
    rows.sort_by_key(|r| std::cmp::Reverse(r.last_contact_at));
    rows.truncate(limit as usize);
    Ok(Json(rows.into_iter().map(row_to_summary).collect()))
}

/// `GET /api/v1/devices/{mid}`.
pub async fn get_device(
    State(state): State<AppState>,
    Path(mid): Path<String>,
) -> ApiResult<Json<DeviceSummary>> {
    if let Some(pool) = &state.pool {
        let row = db::devices::get(pool, &mid)
            .await?
            .ok_or_else(|| ApiError::UnknownDevice(mid.clone()))?;
        return Ok(Json(row_to_summary(row)));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    store
        .devices
        .get(&mid)
        .cloned()
        .map(row_to_summary)
        .map(Json)
        .ok_or(ApiError::UnknownDevice(mid))
}

/// `GET /api/v1/devices/{mid}/status` — a narrower view of the rollup,
/// just the fields an operator dashboard needs for a status chip.
pub async fn get_device_status(
    State(state): State<AppState>,
    Path(mid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(pool) = &state.pool {
        let row = db::devices::get(pool, &mid)
            .await?
            .ok_or_else(|| ApiError::UnknownDevice(mid.clone()))?;
        return Ok(Json(serde_json::json!({
            "mid": row.mid,
            "last_state": row.last_state,
            "last_hb_seq": row.last_hb_seq,
            "last_contact_at": row.last_contact_at,
        })));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    let row = store
        .devices
        .get(&mid)
        .cloned()
        .ok_or_else(|| ApiError::UnknownDevice(mid.clone()))?;
    Ok(Json(serde_json::json!({
        "mid": row.mid,
        "last_state": row.last_state,
        "last_hb_seq": row.last_hb_seq,
        "last_contact_at": row.last_contact_at,
    })))
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

    async fn seed(state: &AppState) {
        let memory = state.memory.as_ref().unwrap();
        let mut store = memory.write().await;
        store.devices.insert(
            "TR4-001".to_string(),
            db::devices::DeviceRow {
                mid: "TR4-001".to_string(),
                firmware_tag: Some("2.1.0".to_string()),
                last_hb_seq: Some(4),
                last_contact_at: Some(Utc::now()),
                last_state: Some("SURFACE_WAIT".to_string()),
                last_position: Some(serde_json::json!({"lat": 10.0, "lon": 20.0})),
                last_power: None,
                last_environment: None,
                last_network: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
    }

    #[tokio::test]
    async fn list_devices_returns_seeded_rollup() {
        let state = AppState::in_memory(ApiConfig::default());
        seed(&state).await;
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/v1/devices")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 1);
        assert_eq!(json[0]["mid"], "TR4-001");
    }

    #[tokio::test]
    async fn get_unknown_device_is_404() {
        let state = AppState::in_memory(ApiConfig::default());
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/v1/devices/GHOST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_view_is_narrow() {
        let state = AppState::in_memory(ApiConfig::default());
        seed(&state).await;
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/v1/devices/TR4-001/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["last_state"], "SURFACE_WAIT");
        assert!(json.get("last_position").is_none());
    }
}
