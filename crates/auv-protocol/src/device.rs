use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse operating state asserted by the vehicle on every heartbeat.
///
/// `DIVE_STATES`/`is_dive_state` name the wire states a vehicle asserts
/// while diving, but the trajectory builder does not use this enum to
/// decide which *frames* belong to a dive (spec §4.6): that inclusion set
/// is derived from the persisted `Dive` table's `started_at..ended_at`
/// windows at query time. `is_dive_state` is only a fallback for frames
/// outside any recorded dive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleState {
    SurfaceWait,
    DescentCheck,
    Descending,
    AtDepth,
    Ascending,
    Fault,
}

impl VehicleState {
    /// States that belong to an in-progress dive, per spec §4.6.
    pub const DIVE_STATES: [VehicleState; 4] = [
        VehicleState::DescentCheck,
        VehicleState::Descending,
        VehicleState::AtDepth,
        VehicleState::Ascending,
    ];

    pub fn is_dive_state(&self) -> bool {
        Self::DIVE_STATES.contains(self)
    }
}

impl VehicleState {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            VehicleState::SurfaceWait => "SURFACE_WAIT",
            VehicleState::DescentCheck => "DESCENT_CHECK",
            VehicleState::Descending => "DESCENDING",
            VehicleState::AtDepth => "AT_DEPTH",
            VehicleState::Ascending => "ASCENDING",
            VehicleState::Fault => "FAULT",
        }
    }
}

impl std::str::FromStr for VehicleState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SURFACE_WAIT" => Ok(VehicleState::SurfaceWait),
            "DESCENT_CHECK" => Ok(VehicleState::DescentCheck),
            "DESCENDING" => Ok(VehicleState::Descending),
            "AT_DEPTH" => Ok(VehicleState::AtDepth),
            "ASCENDING" => Ok(VehicleState::Ascending),
            "FAULT" => Ok(VehicleState::Fault),
            _ => Err(()),
        }
    }
}

/// Lat/lon pair as reported by the vehicle's nav subsystem.
///
/// `(0.0, 0.0)` is the firmware's "no fix" sentinel (spec §4.6) and is
/// dropped by the trajectory builder rather than treated as a real fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn is_sentinel(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }
}

/// Power subsystem snapshot. Kept semi-structured at rest (spec §4.1) —
/// only the fields the core inspects are parsed strictly here; anything
/// else in the wire payload rides along as part of the opaque blob the
/// persistence layer stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSnapshot {
    pub battery_pct: Option<f64>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Environment (depth/temperature) snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub depth_m: Option<f64>,
    pub water_temp_c: Option<f64>,
}

/// Cellular network snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub rsrp_dbm: Option<i32>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Heartbeat request body sent by the vehicle on its poll cadence
/// (firmware default 15s). See spec §4.2 and §6 for the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub mid: String,
    pub hb_seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub state: VehicleState,
    pub position: Option<Position>,
    #[serde(default)]
    pub power: Option<PowerSnapshot>,
    #[serde(default)]
    pub environment: Option<EnvironmentSnapshot>,
    #[serde(default)]
    pub network: Option<NetworkSnapshot>,
}

/// A dispensed command slot embedded in the heartbeat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispensedCommand {
    pub seq: i64,
    pub cmd: String,
    pub args: serde_json::Value,
    pub plan_hash: String,
}

/// Heartbeat response: acknowledgement plus at most one pending command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ack: bool,
    pub command: Option<DispensedCommand>,
}

/// Device rollup — the latest-value snapshot the ingest path maintains.
/// Owned exclusively by the heartbeat ingest path (spec §3 Ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub mid: String,
    pub firmware_tag: Option<String>,
    pub last_hb_seq: Option<i64>,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub last_state: Option<String>,
    pub last_position: Option<Position>,
    pub last_power: Option<serde_json::Value>,
    pub last_environment: Option<serde_json::Value>,
    pub last_network: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
