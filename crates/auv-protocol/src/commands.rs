use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Command lifecycle status. Drives the state diagram
/// `QUEUED -> ISSUED -> EXECUTING -> {COMPLETED, ERROR}`, with `ISSUED ->
/// CANCELED` on a failed descent check and `QUEUED -> EXPIRED` from the
/// background sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Queued,
    Issued,
    Executing,
    Completed,
    Canceled,
    Expired,
    Error,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Queued => "QUEUED",
            CommandStatus::Issued => "ISSUED",
            CommandStatus::Executing => "EXECUTING",
            CommandStatus::Completed => "COMPLETED",
            CommandStatus::Canceled => "CANCELED",
            CommandStatus::Expired => "EXPIRED",
            CommandStatus::Error => "ERROR",
        }
    }

    /// Statuses that count against the "one in-flight command per mid" rule (§4.3).
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            CommandStatus::Queued | CommandStatus::Issued | CommandStatus::Executing
        )
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized command status: {0}")]
pub struct ParseStatusError(String);

impl std::str::FromStr for CommandStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(CommandStatus::Queued),
            "ISSUED" => Ok(CommandStatus::Issued),
            "EXECUTING" => Ok(CommandStatus::Executing),
            "COMPLETED" => Ok(CommandStatus::Completed),
            "CANCELED" => Ok(CommandStatus::Canceled),
            "EXPIRED" => Ok(CommandStatus::Expired),
            "ERROR" => Ok(CommandStatus::Error),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// The only command kind the lifecycle drives. `cmd` stays a free-text
/// column on the wire and at rest so other kinds can be introduced later
/// without a migration; this repo only interprets `RUN_DIVE`.
pub const RUN_DIVE: &str = "RUN_DIVE";

/// Arguments for a `RUN_DIVE` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiveArgs {
    pub target_depth_m: f64,
    pub hold_at_depth_s: u32,
    pub cycles: u32,
}

/// Canonicalizes a `serde_json::Value` for hashing: object keys sorted,
/// numbers re-emitted through a stable representation so `1.0` and `1`
/// collapse to the same bytes. Arrays recurse; other scalars pass through.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        serde_json::Value::Number(n) => n
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// SHA-256 digest over the canonical encoding of `(cmd, args)`, hex-encoded.
/// Two enqueues with identical semantic intent produce identical hashes
/// regardless of key order or numeric formatting (spec §4.3, §8 item 4).
pub fn plan_hash(cmd: &str, args: &serde_json::Value) -> String {
    let envelope = serde_json::json!({ "cmd": cmd, "args": canonicalize(args) });
    let bytes = serde_json::to_vec(&envelope).expect("json serialization of canonical value");
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Full command row, semantic type (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: uuid::Uuid,
    pub mid: String,
    pub seq: i64,
    pub cmd: String,
    pub args: serde_json::Value,
    pub plan_hash: String,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub executing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `POST /api/v1/commands` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueCommandRequest {
    pub mid: String,
    pub cmd: String,
    pub args: serde_json::Value,
}

/// `POST /descent-check` request body (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescentCheckRequest {
    pub mid: String,
    pub check_seq: u64,
    pub cmd_seq: i64,
    pub plan_hash: String,
}

/// `POST /descent-check` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescentCheckResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `POST /ascent-notify` request body (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AscentNotifyRequest {
    pub mid: String,
    pub cmd_seq: i64,
    pub ok: bool,
    pub summary: serde_json::Value,
}

/// `POST /ascent-notify` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AscentNotifyResponse {
    pub ack: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_in_flight_set() {
        assert!(CommandStatus::Queued.is_in_flight());
        assert!(CommandStatus::Issued.is_in_flight());
        assert!(CommandStatus::Executing.is_in_flight());
        assert!(!CommandStatus::Completed.is_in_flight());
        assert!(!CommandStatus::Canceled.is_in_flight());
        assert!(!CommandStatus::Expired.is_in_flight());
        assert!(!CommandStatus::Error.is_in_flight());
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&CommandStatus::Executing).unwrap(),
            r#""EXECUTING""#
        );
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            CommandStatus::Queued,
            CommandStatus::Issued,
            CommandStatus::Executing,
            CommandStatus::Completed,
            CommandStatus::Canceled,
            CommandStatus::Expired,
            CommandStatus::Error,
        ] {
            assert_eq!(CommandStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn plan_hash_ignores_key_order() {
        let a = serde_json::json!({"target_depth_m": 10.0, "hold_at_depth_s": 30, "cycles": 1});
        let b = serde_json::json!({"cycles": 1, "hold_at_depth_s": 30, "target_depth_m": 10.0});
        assert_eq!(plan_hash(RUN_DIVE, &a), plan_hash(RUN_DIVE, &b));
    }

    #[test]
    fn plan_hash_normalizes_numeric_formatting() {
        let a = serde_json::json!({"target_depth_m": 10, "hold_at_depth_s": 30, "cycles": 1});
        let b = serde_json::json!({"target_depth_m": 10.0, "hold_at_depth_s": 30, "cycles": 1});
        assert_eq!(plan_hash(RUN_DIVE, &a), plan_hash(RUN_DIVE, &b));
    }

    #[test]
    fn plan_hash_differs_on_semantic_change() {
        let a = serde_json::json!({"target_depth_m": 10.0, "hold_at_depth_s": 30, "cycles": 1});
        let b = serde_json::json!({"target_depth_m": 20.0, "hold_at_depth_s": 30, "cycles": 1});
        assert_ne!(plan_hash(RUN_DIVE, &a), plan_hash(RUN_DIVE, &b));
    }

    #[test]
    fn plan_hash_differs_on_cmd_change() {
        let args = serde_json::json!({"target_depth_m": 10.0, "hold_at_depth_s": 30, "cycles": 1});
        assert_ne!(plan_hash("RUN_DIVE", &args), plan_hash("SURFACE", &args));
    }

    #[test]
    fn descent_check_response_omits_reason_when_ok() {
        let resp = DescentCheckResponse {
            ok: true,
            reason: None,
        };
        assert_eq!(serde_json::to_string(&resp).unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn descent_check_response_includes_reason_when_not_ok() {
        let resp = DescentCheckResponse {
            ok: false,
            reason: Some("PLAN_MISMATCH".into()),
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"ok":false,"reason":"PLAN_MISMATCH"}"#
        );
    }
}
