//! API route definitions and router builder (spec §6).

pub mod admin;
pub mod ascent_notify;
pub mod commands;
pub mod descent_check;
pub mod devices;
pub mod dives;
pub mod events;
pub mod health;
pub mod heartbeat;
pub mod request_id;
pub mod telemetry;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router: the vehicle-facing tree (`/hb`,
/// `/descent-check`, `/ascent-notify`), the operator web tree
/// (`/api/v1/...`), and operational scaffolding (`/health`,
/// `/admin/reset-db`) — spec §1 Open Question (b) collapses the
/// original's overlapping route trees into exactly these two.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/devices", get(devices::list_devices))
        .route("/devices/{mid}", get(devices::get_device))
        .route("/devices/{mid}/status", get(devices::get_device_status))
        .route(
            "/commands",
            get(commands::list_commands).post(commands::enqueue_command),
        )
        .route("/commands/{id}", get(commands::get_command))
        .route("/telemetry/latest/{mid}", get(telemetry::latest))
        .route("/telemetry/heartbeats", get(telemetry::list_heartbeats))
        .route(
            "/telemetry/trajectory/{mid}",
            get(telemetry::get_trajectory),
        )
        .route("/dives", get(dives::list_dives))
        .route("/dives/{id}", get(dives::get_dive))
        .route("/events", get(events::list_events));

    Router::new()
        .route("/hb", post(heartbeat::ingest_heartbeat))
        .route("/descent-check", post(descent_check::descent_check))
        .route("/ascent-notify", post(ascent_notify::ascent_notify))
        .route("/health", get(health::health))
        .route("/admin/reset-db", post(admin::reset_db))
        .nest("/api/v1", api)
        .layer(middleware::from_fn(request_id::stamp_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
