//! `POST /ascent-notify` — the post-dive reconciler (spec §4.5).

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use auv_protocol::commands::{AscentNotifyRequest, AscentNotifyResponse};

use crate::db;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn ascent_notify(
    State(state): State<AppState>,
    Json(req): Json<AscentNotifyRequest>,
) -> ApiResult<Json<AscentNotifyResponse>> {
    if let Some(pool) = &state.pool {
        ascent_notify_postgres(pool, &req).await?;
    } else {
        ascent_notify_memory(&state, &req).await;
    }
    Ok(Json(AscentNotifyResponse { ack: true }))
}

async fn ascent_notify_postgres(
    pool: &sqlx::PgPool,
    req: &AscentNotifyRequest,
) -> ApiResult<()> {
    let command = db::commands::get_by_mid_seq(pool, &req.mid, req.cmd_seq).await?;
    let is_executing =
        command.as_ref().map(|c| c.status()) == Some(auv_protocol::commands::CommandStatus::Executing);

    let started_at = command.as_ref().and_then(|c| c.executing_at);
    db::dives::insert(
        pool,
        &req.mid,
        req.cmd_seq,
        req.ok,
        &req.summary,
        !is_executing,
        started_at,
    )
    .await?;

    let transitioned = if is_executing {
        let command = command.as_ref().expect("checked is_executing above");
        db::commands::try_finish(pool, command.id, req.ok, Utc::now()).await?
    } else {
        false
    };

    db::event_log::insert(
        pool,
        Some(&req.mid),
        "ascent_notify",
        &serde_json::json!({
            "cmd_seq": req.cmd_seq,
            "ok": req.ok,
            "transitioned": transitioned,
            "orphan": !is_executing,
        }),
    )
    .await?;

    Ok(())
}

async fn ascent_notify_memory(state: &AppState, req: &AscentNotifyRequest) {
    let memory = state.memory.as_ref().expect("memory backend configured");
    let mut store = memory.write().await;

    let idx = store
        .commands
        .iter()
        .position(|c| c.mid == req.mid && c.seq == req.cmd_seq);
    let is_executing = idx
        .map(|i| store.commands[i].status == "EXECUTING")
        .unwrap_or(false);
    let started_at = idx.and_then(|i| store.commands[i].executing_at);

    let orphan = !is_executing;
    store.dives.push(db::dives::DiveRow {
        id: uuid::Uuid::now_v7(),
        mid: req.mid.clone(),
        cmd_seq: req.cmd_seq,
        ok: req.ok,
        summary: db::dives::summary_with_orphan_flag(&req.summary, orphan),
        orphan,
        started_at,
        ended_at: Utc::now(),
        created_at: Utc::now(),
    });

    let transitioned = if is_executing {
        let i = idx.unwrap();
        store.commands[i].status = if req.ok { "COMPLETED" } else { "ERROR" }.to_string();
        store.commands[i].completed_at = Some(Utc::now());
        true
    } else {
        false
    };

    store.event_log.push(db::event_log::EventLogRow {
        id: uuid::Uuid::now_v7(),
        mid: Some(req.mid.clone()),
        kind: "ascent_notify".to_string(),
        detail: serde_json::json!({
            "cmd_seq": req.cmd_seq,
            "ok": req.ok,
            "transitioned": transitioned,
            "orphan": !is_executing,
        }),
        created_at: Utc::now(),
    });
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

    #[tokio::test]
    async fn ok_notify_completes_executing_command() {
        let state = AppState::in_memory(ApiConfig::default());
        {
            let memory = state.memory.as_ref().unwrap();
            let mut store = memory.write().await;
            store.commands.push(db::commands::CommandRow {
                id: uuid::Uuid::now_v7(),
                mid: "TR4-001".into(),
                seq: 1,
                cmd: "RUN_DIVE".into(),
                args: serde_json::json!({}),
                plan_hash: "x".into(),
                status: "EXECUTING".into(),
                created_at: Utc::now(),
                issued_at: Some(Utc::now()),
                issued_hb_seq: Some(1),
                executing_at: Some(Utc::now()),
                completed_at: None,
            });
        }
        let app = build_router(state.clone());

        let req = AscentNotifyRequest {
            mid: "TR4-001".into(),
            cmd_seq: 1,
            ok: true,
            summary: serde_json::json!({"max_depth_m": 10.0}),
        };
        let response = app
            .oneshot(
                Request::post("/ascent-notify")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&req).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ack"], true);

        let memory = state.memory.as_ref().unwrap();
        let store = memory.read().await;
        assert_eq!(store.commands[0].status, "COMPLETED");
        assert_eq!(store.dives.len(), 1);
        assert!(!store.dives[0].orphan);
    }

    #[tokio::test]
    async fn notify_without_executing_command_is_orphan() {
        let state = AppState::in_memory(ApiConfig::default());
        let app = build_router(state.clone());

        let req = AscentNotifyRequest {
            mid: "TR4-001".into(),
            cmd_seq: 7,
            ok: false,
            summary: serde_json::json!({}),
        };
        app.oneshot(
            Request::post("/ascent-notify")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&req).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

        let memory = state.memory.as_ref().unwrap();
        let store = memory.read().await;
        assert_eq!(store.dives.len(), 1);
        assert!(store.dives[0].orphan);
    }
}
