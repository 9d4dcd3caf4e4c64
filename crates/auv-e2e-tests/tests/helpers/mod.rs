//! Shared test harness for end-to-end scenario tests.
//!
//! Wraps `build_router` over the in-memory backend and drives it through
//! `tower::ServiceExt::oneshot` — no live network port, exercising the
//! router as a black box exactly as the vehicle or the operator UI would.
//!
//! Each scenario file compiles this module independently, so not every
//! method is exercised by every binary; `dead_code` is expected here.
#![allow(dead_code)]

use auv_control_api::config::ApiConfig;
use auv_control_api::routes::build_router;
use auv_control_api::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub struct TestHarness {
    pub state: AppState,
    pub router: Router,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let state = AppState::in_memory(config);
        let router = build_router(state.clone());
        Self { state, router }
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", path, Some(body)).await
    }

    /// `POST /hb`.
    pub async fn heartbeat(
        &self,
        mid: &str,
        hb_seq: u64,
        state: &str,
        lat: f64,
        lon: f64,
    ) -> (StatusCode, Value) {
        self.post(
            "/hb",
            serde_json::json!({
                "mid": mid,
                "hb_seq": hb_seq,
                "ts_utc": chrono::Utc::now().to_rfc3339(),
                "state": state,
                "position": {"lat": lat, "lon": lon},
                "environment": {"depth_m": 0.0, "water_temp_c": 18.0},
            }),
        )
        .await
    }

    /// `POST /api/v1/commands` — enqueue a `RUN_DIVE`.
    pub async fn enqueue_run_dive(
        &self,
        mid: &str,
        target_depth_m: f64,
        hold_at_depth_s: u32,
        cycles: u32,
    ) -> (StatusCode, Value) {
        self.post(
            "/api/v1/commands",
            serde_json::json!({
                "mid": mid,
                "cmd": "RUN_DIVE",
                "args": {
                    "target_depth_m": target_depth_m,
                    "hold_at_depth_s": hold_at_depth_s,
                    "cycles": cycles,
                },
            }),
        )
        .await
    }

    /// `POST /descent-check`.
    pub async fn descent_check(
        &self,
        mid: &str,
        check_seq: u64,
        cmd_seq: i64,
        plan_hash: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/descent-check",
            serde_json::json!({
                "mid": mid,
                "check_seq": check_seq,
                "cmd_seq": cmd_seq,
                "plan_hash": plan_hash,
            }),
        )
        .await
    }

    /// `POST /ascent-notify`.
    pub async fn ascent_notify(&self, mid: &str, cmd_seq: i64, ok: bool) -> (StatusCode, Value) {
        self.post(
            "/ascent-notify",
            serde_json::json!({
                "mid": mid,
                "cmd_seq": cmd_seq,
                "ok": ok,
                "summary": {"max_depth_m": 10.0, "duration_s": 90},
            }),
        )
        .await
    }
}
