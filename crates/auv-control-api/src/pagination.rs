//! Opaque cursor pagination (spec §4.7): cursor = base64(`{id}:{created_at}`),
//! page size capped at 100.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

pub fn clamp_limit(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

/// Encodes the last row seen on a page into an opaque cursor string.
pub fn encode(id: Uuid, created_at: DateTime<Utc>) -> String {
    let raw = format!("{}:{}", id, created_at.to_rfc3339());
    URL_SAFE_NO_PAD.encode(raw)
}

/// Decodes a cursor produced by `encode`. Malformed cursors are rejected
/// as `INVALID_PAYLOAD` by the caller.
pub fn decode(cursor: &str) -> Option<(Uuid, DateTime<Utc>)> {
    let raw = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let raw = String::from_utf8(raw).ok()?;
    let (id_part, ts_part) = raw.split_once(':')?;
    let id = Uuid::parse_str(id_part).ok()?;
    let created_at = DateTime::parse_from_rfc3339(ts_part)
        .ok()?
        .with_timezone(&Utc);
    Some((id, created_at))
}
