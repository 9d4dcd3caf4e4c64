//! S1 (dispatch and complete) and S2 (plan tamper) from spec §8.

mod helpers;

use axum::http::StatusCode;
use helpers::TestHarness;

#[tokio::test]
async fn s1_dispatch_and_complete() {
    let h = TestHarness::new();

    let (status, _) = h.heartbeat("TR4-001", 0, "SURFACE_WAIT", 10.0, 20.0).await;
    assert_eq!(status, StatusCode::OK);

    let (status, cmd) = h.enqueue_run_dive("TR4-001", 10.0, 30, 1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cmd["status"], "QUEUED");
    let plan_hash = cmd["plan_hash"].as_str().unwrap().to_string();

    let (status, hb) = h.heartbeat("TR4-001", 1, "SURFACE_WAIT", 10.0, 20.0).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hb["command"]["seq"], 1);
    assert_eq!(hb["command"]["plan_hash"], plan_hash);

    let (status, resp) = h.descent_check("TR4-001", 1, 1, &plan_hash).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["ok"], true);

    let (status, cmd) = h
        .get(&format!("/api/v1/commands/{}", cmd["id"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cmd["status"], "EXECUTING");

    let (status, resp) = h.ascent_notify("TR4-001", 1, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["ack"], true);

    let (status, cmd) = h
        .get(&format!("/api/v1/commands/{}", cmd["id"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cmd["status"], "COMPLETED");

    let (status, dives) = h.get("/api/v1/dives?mid=TR4-001").await;
    assert_eq!(status, StatusCode::OK);
    let dives = dives.as_array().unwrap();
    assert_eq!(dives.len(), 1);
    assert_eq!(dives[0]["ok"], true);
    assert_eq!(dives[0]["summary"]["orphan"], false);
}

#[tokio::test]
async fn s2_plan_tamper_cancels_command_and_clears_dispensation() {
    let h = TestHarness::new();
    h.heartbeat("TR4-001", 0, "SURFACE_WAIT", 10.0, 20.0).await;
    h.enqueue_run_dive("TR4-001", 10.0, 30, 1).await;
    h.heartbeat("TR4-001", 1, "SURFACE_WAIT", 10.0, 20.0).await;

    let (status, resp) = h
        .descent_check("TR4-001", 1, 1, "0000000000000000000000000000000000000000000000000000000000000000")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["reason"], "PLAN_MISMATCH");

    let (status, commands) = h.get("/api/v1/commands?mid=TR4-001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(commands[0]["status"], "CANCELED");

    let (_, hb) = h.heartbeat("TR4-001", 2, "SURFACE_WAIT", 10.0, 20.0).await;
    assert!(hb["command"].is_null());
}
