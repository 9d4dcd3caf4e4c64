//! `POST /descent-check` — the pre-dive safety gate (spec §4.4).

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use auv_protocol::commands::{DescentCheckRequest, DescentCheckResponse, plan_hash};

use crate::db;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn descent_check(
    State(state): State<AppState>,
    Json(req): Json<DescentCheckRequest>,
) -> ApiResult<Json<DescentCheckResponse>> {
    let payload = serde_json::to_value(&req).expect("descent-check request serializes");

    let outcome = if let Some(pool) = &state.pool {
        descent_check_postgres(pool, state.config.descent_freshness_secs, &req).await?
    } else {
        descent_check_memory(&state, &req).await?
    };

    if let Some(pool) = &state.pool {
        db::descent_checks::insert_if_absent(
            pool,
            &req.mid,
            req.check_seq as i64,
            req.cmd_seq,
            &req.plan_hash,
            outcome.ok,
            outcome.reason.as_deref(),
            &payload,
        )
        .await?;
    } else {
        let memory = state.memory.as_ref().expect("memory backend configured");
        let mut store = memory.write().await;
        let already = store
            .descent_checks
            .iter()
            .any(|d| d.mid == req.mid && d.check_seq == req.check_seq as i64);
        if !already {
            store.descent_checks.push(db::descent_checks::DescentCheckRow {
                id: uuid::Uuid::now_v7(),
                mid: req.mid.clone(),
                check_seq: req.check_seq as i64,
                cmd_seq: req.cmd_seq,
                plan_hash: req.plan_hash.clone(),
                ok: outcome.ok,
                reason: outcome.reason.clone(),
                payload,
                created_at: Utc::now(),
            });
        }
    }

    Ok(Json(outcome))
}

async fn descent_check_postgres(
    pool: &sqlx::PgPool,
    freshness_secs: u64,
    req: &DescentCheckRequest,
) -> ApiResult<DescentCheckResponse> {
    let Some(command) = db::commands::get_by_mid_seq(pool, &req.mid, req.cmd_seq).await? else {
        return Ok(fail("UNKNOWN_COMMAND"));
    };

    if command.status() != auv_protocol::commands::CommandStatus::Issued {
        return Ok(fail("BAD_STATE"));
    }

    let expected_hash = plan_hash(&command.cmd, &command.args);
    if expected_hash != req.plan_hash {
        db::commands::try_cancel(pool, command.id).await?;
        return Ok(fail("PLAN_MISMATCH"));
    }

    let freshness_limit = chrono::Duration::seconds(freshness_secs as i64);
    if let Some(issued_at) = command.issued_at
        && Utc::now() - issued_at > freshness_limit
    {
        db::commands::try_cancel(pool, command.id).await?;
        return Ok(fail("STALE"));
    }

    db::commands::try_start_executing(pool, command.id, Utc::now()).await?;
    Ok(DescentCheckResponse {
        ok: true,
        reason: None,
    })
}

async fn descent_check_memory(
    state: &AppState,
    req: &DescentCheckRequest,
) -> ApiResult<DescentCheckResponse> {
    let memory = state.memory.as_ref().expect("memory backend configured");
    let mut store = memory.write().await;

    let Some(idx) = store
        .commands
        .iter()
        .position(|c| c.mid == req.mid && c.seq == req.cmd_seq)
    else {
        return Ok(fail("UNKNOWN_COMMAND"));
    };

    if store.commands[idx].status != "ISSUED" {
        return Ok(fail("BAD_STATE"));
    }

    let expected_hash = plan_hash(&store.commands[idx].cmd, &store.commands[idx].args);
    if expected_hash != req.plan_hash {
        store.commands[idx].status = "CANCELED".to_string();
        return Ok(fail("PLAN_MISMATCH"));
    }

    let freshness_limit = chrono::Duration::seconds(state.config.descent_freshness_secs as i64);
    if let Some(issued_at) = store.commands[idx].issued_at
        && Utc::now() - issued_at > freshness_limit
    {
        store.commands[idx].status = "CANCELED".to_string();
        return Ok(fail("STALE"));
    }

    store.commands[idx].status = "EXECUTING".to_string();
    store.commands[idx].executing_at = Some(Utc::now());
    Ok(DescentCheckResponse {
        ok: true,
        reason: None,
    })
}

fn fail(reason: &str) -> DescentCheckResponse {
    DescentCheckResponse {
        ok: false,
        reason: Some(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::routes::build_router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn seed_issued_command(state: &AppState, plan_hash_value: &str) {
        let memory = state.memory.as_ref().unwrap();
        let mut store = memory.write().await;
        store.commands.push(db::commands::CommandRow {
            id: uuid::Uuid::now_v7(),
            mid: "TR4-001".into(),
            seq: 1,
            cmd: "RUN_DIVE".into(),
            args: serde_json::json!({"target_depth_m": 10.0, "hold_at_depth_s": 30, "cycles": 1}),
            plan_hash: plan_hash_value.to_string(),
            status: "ISSUED".into(),
            created_at: Utc::now(),
            issued_at: Some(Utc::now()),
            issued_hb_seq: Some(1),
            executing_at: None,
            completed_at: None,
        });
    }

    #[tokio::test]
    async fn matching_plan_hash_transitions_to_executing() {
        let args = serde_json::json!({"target_depth_m": 10.0, "hold_at_depth_s": 30, "cycles": 1});
        let hash = plan_hash("RUN_DIVE", &args);
        let state = AppState::in_memory(ApiConfig::default());
        seed_issued_command(&state, &hash).await;
        let app = build_router(state.clone());

        let req = DescentCheckRequest {
            mid: "TR4-001".into(),
            check_seq: 1,
            cmd_seq: 1,
            plan_hash: hash,
        };
        let response = app
            .oneshot(
                Request::post("/descent-check")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&req).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], true);

        let memory = state.memory.as_ref().unwrap();
        let store = memory.read().await;
        assert_eq!(store.commands[0].status, "EXECUTING");
    }

    #[tokio::test]
    async fn tampered_plan_hash_cancels_command() {
        let state = AppState::in_memory(ApiConfig::default());
        seed_issued_command(&state, "correct-hash").await;
        let app = build_router(state.clone());

        let req = DescentCheckRequest {
            mid: "TR4-001".into(),
            check_seq: 1,
            cmd_seq: 1,
            plan_hash: "tampered-hash".into(),
        };
        let response = app
            .oneshot(
                Request::post("/descent-check")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&req).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["reason"], "PLAN_MISMATCH");

        let memory = state.memory.as_ref().unwrap();
        let store = memory.read().await;
        assert_eq!(store.commands[0].status, "CANCELED");
    }

    #[tokio::test]
    async fn unknown_command_is_reported_but_not_an_http_error() {
        let state = AppState::in_memory(ApiConfig::default());
        let app = build_router(state);

        let req = DescentCheckRequest {
            mid: "TR4-001".into(),
            check_seq: 1,
            cmd_seq: 99,
            plan_hash: "whatever".into(),
        };
        let response = app
            .oneshot(
                Request::post("/descent-check")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&req).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["reason"], "UNKNOWN_COMMAND");
    }
}
