//! `POST /hb` — the vehicle heartbeat endpoint (spec §4.2).

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use auv_protocol::device::{DispensedCommand, HeartbeatRequest, HeartbeatResponse};

use crate::db;
use crate::error::ApiResult;
use crate::state::AppState;

/// `POST /hb` — ingest a heartbeat and dispense at most one pending
/// command. Malformed JSON never reaches the handler body: axum's `Json`
/// extractor rejects it with 400 before this runs.
pub async fn ingest_heartbeat(
    State(state): State<AppState>,
    Json(hb): Json<HeartbeatRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let payload = serde_json::to_value(&hb).expect("heartbeat request serializes to JSON");

    let command = if let Some(pool) = &state.pool {
        ingest_postgres(pool, &hb, &payload).await?
    } else {
        ingest_memory(&state, &hb, &payload).await
    };

    tracing::debug!(mid = %hb.mid, hb_seq = hb.hb_seq, "heartbeat received");

    Ok(Json(HeartbeatResponse {
        ack: true,
        command,
    }))
}

/// Ingest, device rollup, and dispensation all run inside one transaction
/// (spec §4.2: the three steps commit or fail together — a failure after
/// the heartbeat row lands must not permanently strand its rollup/
/// dispensation, since the idempotent-replay branch only looks at what's
/// already committed).
async fn ingest_postgres(
    pool: &sqlx::PgPool,
    hb: &HeartbeatRequest,
    payload: &serde_json::Value,
) -> ApiResult<Option<DispensedCommand>> {
    let hb_seq = hb.hb_seq as i64;
    let mut tx = pool.begin().await?;

    let inserted =
        db::heartbeats::insert_if_absent(&mut *tx, &hb.mid, hb_seq, hb.ts_utc, payload).await?;

    if !inserted {
        // Replay of a previously-seen (mid, hb_seq): re-return whatever was
        // dispensed for this exact sequence number, not the next candidate.
        let reissued = db::commands::issued_for_hb_seq(&mut *tx, &hb.mid, hb_seq).await?;
        tx.commit().await?;
        return Ok(reissued.map(as_dispensed));
    }

    db::devices::upsert_if_fresher(
        &mut *tx,
        &hb.mid,
        hb_seq,
        hb.ts_utc,
        hb.state.as_wire_str(),
        hb.position
            .map(|p| serde_json::to_value(p).expect("position serializes"))
            .as_ref(),
        hb.power
            .as_ref()
            .map(|p| serde_json::to_value(p).expect("power serializes"))
            .as_ref(),
        hb.environment
            .as_ref()
            .map(|e| serde_json::to_value(e).expect("environment serializes"))
            .as_ref(),
        hb.network
            .as_ref()
            .map(|n| serde_json::to_value(n).expect("network serializes"))
            .as_ref(),
    )
    .await?;

    let dispensed = dispense_postgres(&mut tx, &hb.mid, hb_seq).await?;
    tx.commit().await?;
    Ok(dispensed)
}

/// Dispenses the oldest `QUEUED` command. Runs entirely on `tx`'s
/// connection, so the only way `try_issue` can lose its guarded
/// transition is a stale read of `candidate` against a row another
/// statement on this same transaction already touched — not a real
/// concurrent winner, since no other transaction can observe this one's
/// uncommitted writes. One retry covers that without looping forever.
async fn dispense_postgres(
    tx: &mut sqlx::PgConnection,
    mid: &str,
    hb_seq: i64,
) -> ApiResult<Option<DispensedCommand>> {
    for _ in 0..2 {
        let Some(candidate) = db::commands::oldest_queued(&mut *tx, mid).await? else {
            return Ok(None);
        };
        if db::commands::try_issue(&mut *tx, candidate.id, hb_seq, Utc::now()).await? {
            return Ok(Some(DispensedCommand {
                seq: candidate.seq,
                cmd: candidate.cmd,
                args: candidate.args,
                plan_hash: candidate.plan_hash,
            }));
        }
    }
    Ok(None)
}

fn as_dispensed(row: db::commands::CommandRow) -> DispensedCommand {
    DispensedCommand {
        seq: row.seq,
        cmd: row.cmd,
        args: row.args,
        plan_hash: row.plan_hash,
    }
}

async fn ingest_memory(
    state: &AppState,
    hb: &HeartbeatRequest,
    payload: &serde_json::Value,
) -> Option<DispensedCommand> {
    let memory = state.memory.as_ref().expect("memory backend configured");
    let mut store = memory.write().await;
    let hb_seq = hb.hb_seq as i64;

    let already_seen = store
        .heartbeats
        .iter()
        .any(|h| h.mid == hb.mid && h.hb_seq == hb_seq);

    if already_seen {
        return store
            .commands
            .iter()
            .find(|c| c.mid == hb.mid && c.issued_hb_seq == Some(hb_seq))
            .cloned()
            .map(as_dispensed);
    }

    store.heartbeats.push(db::heartbeats::HeartbeatRow {
        id: uuid::Uuid::now_v7(),
        mid: hb.mid.clone(),
        hb_seq,
        ts_utc: hb.ts_utc,
        received_at: Utc::now(),
        payload: payload.clone(),
    });

    let fresher = store
        .devices
        .get(&hb.mid)
        .and_then(|d| d.last_hb_seq)
        .map(|last| hb_seq >= last)
        .unwrap_or(true);
    if fresher {
        let now = Utc::now();
        let entry = store
            .devices
            .entry(hb.mid.clone())
            .or_insert_with(|| db::devices::DeviceRow {
                mid: hb.mid.clone(),
                firmware_tag: None,
                last_hb_seq: None,
                last_contact_at: None,
                last_state: None,
                last_position: None,
                last_power: None,
                last_environment: None,
                last_network: None,
                created_at: now,
                updated_at: now,
            });
        entry.last_hb_seq = Some(hb_seq);
        entry.last_contact_at = Some(hb.ts_utc);
        entry.last_state = Some(hb.state.as_wire_str().to_string());
        entry.last_position = hb.position.map(|p| serde_json::to_value(p).unwrap());
        entry.last_power = hb.power.as_ref().map(|p| serde_json::to_value(p).unwrap());
        entry.last_environment = hb
            .environment
            .as_ref()
            .map(|e| serde_json::to_value(e).unwrap());
        entry.last_network = hb.network.as_ref().map(|n| serde_json::to_value(n).unwrap());
        entry.updated_at = now;
    }

    // No retry-on-conflict loop needed here: the memory backend holds an
    // exclusive write lock for the whole dispensation, unlike the Postgres
    // path where a concurrent worker can win the guarded transition first.
    let id = store
        .commands
        .iter()
        .filter(|c| c.mid == hb.mid && c.status == "QUEUED")
        .min_by_key(|c| c.seq)
        .map(|c| c.id)?;
    let candidate = store.commands.iter_mut().find(|c| c.id == id).unwrap();
    candidate.status = "ISSUED".to_string();
    candidate.issued_at = Some(Utc::now());
    candidate.issued_hb_seq = Some(hb_seq);
    Some(as_dispensed(candidate.clone()))
}
