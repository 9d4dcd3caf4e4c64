//! Telemetry read endpoints (spec §4.7): latest heartbeat, paginated
//! heartbeat history, and the GeoJSON trajectory view (spec §4.6).

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::pagination;
use crate::state::AppState;
use crate::trajectory;

#[derive(Debug, Deserialize)]
pub struct ListHeartbeatsQuery {
    pub mid: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TrajectoryQuery {
    #[serde(default = "default_format")]
    pub format: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn default_format() -> String {
    "geojson".to_string()
}

/// `GET /api/v1/telemetry/latest/{mid}`.
pub async fn latest(
    State(state): State<AppState>,
    Path(mid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(pool) = &state.pool {
        let hb = db::heartbeats::latest_for_mid(pool, &mid)
            .await?
            .ok_or_else(|| ApiError::UnknownDevice(mid.clone()))?;
        return Ok(Json(hb.payload));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    store
        .heartbeats
        .iter()
        .filter(|h| h.mid == mid)
        .max_by_key(|h| h.hb_seq)
        .map(|h| Json(h.payload.clone()))
        .ok_or(ApiError::UnknownDevice(mid))
}

/// `GET /api/v1/telemetry/heartbeats`.
pub async fn list_heartbeats(
    State(state): State<AppState>,
    Query(query): Query<ListHeartbeatsQuery>,
) -> ApiResult<Json<Vec<serde_json::Value>>> {
    let limit = pagination::clamp_limit(query.limit);
    let after = query
        .cursor
        .as_deref()
        .and_then(pagination::decode);

    if let Some(pool) = &state.pool {
        let (after_id, after_created) = after.map(|(i, c)| (Some(i), Some(c))).unwrap_or((None, None));
        let rows = db::heartbeats::list_page(
            pool,
            query.mid.as_deref(),
            after_id,
            after_created,
            limit,
        )
        .await?;
        return Ok(Json(rows.into_iter().map(|r| r.payload).collect()));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    let mut rows: Vec<_> = store
        .heartbeats
        .iter()
        .filter(|h| query.mid.as_deref().is_none_or(|m| h.mid == m))
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));
    if let Some((after_id, after_created)) = after {
        rows.retain(|h| (h.received_at, h.id) < (after_created, after_id));
    }
    rows.truncate(limit as usize);
    Ok(Json(rows.into_iter().map(|r| r.payload).collect()))
}

/// `GET /api/v1/telemetry/trajectory/{mid}?format=geojson|detailed&from=&to=`.
pub async fn get_trajectory(
    State(state): State<AppState>,
    Path(mid): Path<String>,
    Query(query): Query<TrajectoryQuery>,
) -> ApiResult<Json<geojson::FeatureCollection>> {
    let detailed = match query.format.as_str() {
        "geojson" => false,
        "detailed" => true,
        other => {
            return Err(ApiError::InvalidPayload(format!(
                "unsupported trajectory format '{other}'"
            )));
        }
    };

    if let Some(pool) = &state.pool {
        if !db::devices::exists(pool, &mid).await? {
            return Err(ApiError::UnknownDevice(mid));
        }
        let heartbeats = db::heartbeats::list_for_mid(pool, &mid, query.from, query.to).await?;
        let dives = db::dives::list_for_mid(pool, &mid, query.from, query.to).await?;
        return Ok(Json(trajectory::build(&heartbeats, &dives, detailed)));
    }

    let memory = state.memory.as_ref().expect("memory backend configured");
    let store = memory.read().await;
    if !store.devices.contains_key(&mid) {
        return Err(ApiError::UnknownDevice(mid));
    }
    let mut heartbeats: Vec<_> = store
        .heartbeats
        .iter()
        .filter(|h| h.mid == mid)
        .filter(|h| query.from.is_none_or(|from| h.ts_utc >= from))
        .filter(|h| query.to.is_none_or(|to| h.ts_utc <= to))
        .cloned()
        .collect();
    heartbeats.sort_by_key(|h| h.hb_seq);
    let mut dives: Vec<_> = store
        .dives
        .iter()
        .filter(|d| d.mid == mid)
        .filter(|d| query.from.is_none_or(|from| d.ended_at >= from))
        .filter(|d| {
            query
                .to
                .is_none_or(|to| d.started_at.is_none_or(|s| s <= to))
        })
        .cloned()
        .collect();
    dives.sort_by_key(|d| d.ended_at);
    Ok(Json(trajectory::build(&heartbeats, &dives, detailed)))
}
