//! Trajectory builder (spec §4.6): a single streaming pass over a `mid`'s
//! heartbeat history, segmenting surface track from dive segments and
//! emitting a GeoJSON `FeatureCollection` ready for direct UI rendering.
//!
//! State threaded between frames is exactly "current segment buffer" plus
//! "current dive index" — built through `SegmentSink` rather than
//! appending to shared lists across multiple passes.

use auv_protocol::device::VehicleState;
use chrono::{DateTime, Duration, Utc};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use std::str::FromStr;

use crate::db::dives::DiveRow;
use crate::db::heartbeats::HeartbeatRow;

const CLOCK_SKEW_TOLERANCE: Duration = Duration::hours(1);

struct Frame {
    lon: f64,
    lat: f64,
    ts: DateTime<Utc>,
    clock_skew: bool,
    is_dive: bool,
    payload: serde_json::Value,
}

fn authoritative_timestamp(hb: &HeartbeatRow) -> (DateTime<Utc>, bool) {
    let delta = (hb.ts_utc - hb.received_at).num_seconds().abs();
    if delta > CLOCK_SKEW_TOLERANCE.num_seconds() {
        (hb.received_at, true)
    } else {
        (hb.ts_utc, false)
    }
}

fn extract_position(payload: &serde_json::Value) -> Option<(f64, f64)> {
    let position = payload.get("position")?;
    let lat = position.get("lat")?.as_f64()?;
    let lon = position.get("lon")?.as_f64()?;
    if lat == 0.0 && lon == 0.0 {
        return None;
    }
    Some((lon, lat))
}

fn is_dive_state(payload: &serde_json::Value) -> bool {
    payload
        .get("state")
        .and_then(JsonValue::as_str)
        .and_then(|s| VehicleState::from_str(s).ok())
        .map(|s| s.is_dive_state())
        .unwrap_or(false)
}

/// `true` if `ts` falls inside a recorded dive's `started_at..=ended_at`
/// window. This is the authoritative classification (spec §4.6: the
/// dive/surface split is derived from the `Dive` table, not hard-coded
/// against the wire state enum) — `None` means no persisted dive covers
/// this timestamp, and the caller falls back to the wire state for frames
/// belonging to a dive still in progress (no `Dive` row exists for it
/// until the vehicle ascends).
fn dive_window_classify(ts: DateTime<Utc>, dives: &[DiveRow]) -> Option<bool> {
    dives
        .iter()
        .any(|d| d.started_at.is_some_and(|s| ts >= s && ts <= d.ended_at))
        .then_some(true)
}

/// A contiguous run of frames sharing the same surface/dive classification.
struct Segment {
    is_dive: bool,
    frames: Vec<Frame>,
}

/// One pass over heartbeats: build frames, drop invalid positions, then
/// merge consecutive same-classification frames into segments, folding
/// any segment too short to stand alone (a single frame) into its
/// neighbor rather than emitting a degenerate one-point LineString.
fn build_segments(heartbeats: &[HeartbeatRow], dives: &[DiveRow]) -> Vec<Segment> {
    let mut frames = Vec::new();
    for hb in heartbeats {
        let Some((lon, lat)) = extract_position(&hb.payload) else {
            continue;
        };
        let (ts, clock_skew) = authoritative_timestamp(hb);
        let is_dive =
            dive_window_classify(ts, dives).unwrap_or_else(|| is_dive_state(&hb.payload));
        frames.push(Frame {
            lon,
            lat,
            ts,
            clock_skew,
            is_dive,
            payload: hb.payload.clone(),
        });
    }

    let mut segments: Vec<Segment> = Vec::new();
    for frame in frames {
        match segments.last_mut() {
            Some(seg) if seg.is_dive == frame.is_dive => seg.frames.push(frame),
            _ => segments.push(Segment {
                is_dive: frame.is_dive,
                frames: vec![frame],
            }),
        }
    }

    // Merge single-frame segments into a neighbor so a momentary state
    // flicker doesn't fracture the track (spec §4.6).
    let mut merged: Vec<Segment> = Vec::new();
    for seg in segments {
        if seg.frames.len() == 1 && !merged.is_empty() {
            merged.last_mut().unwrap().frames.extend(seg.frames);
        } else {
            merged.push(seg);
        }
    }
    merged
}

fn line_string_feature(segment: &Segment, feature_type: &str, extra: JsonObject) -> Feature {
    let coords: Vec<Vec<f64>> = segment
        .frames
        .iter()
        .map(|f| vec![f.lon, f.lat])
        .collect();
    let mut properties = extra;
    properties.insert("type".to_string(), JsonValue::from(feature_type));
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(coords))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn point_feature(lon: f64, lat: f64, mut properties: JsonObject) -> Feature {
    properties
        .entry("type".to_string())
        .or_insert_with(|| JsonValue::from("point"));
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![lon, lat]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn flatten_payload(payload: &serde_json::Value) -> JsonObject {
    match payload {
        serde_json::Value::Object(map) => map.clone().into_iter().collect(),
        _ => JsonObject::new(),
    }
}

/// Builds the GeoJSON `FeatureCollection` for `GET
/// /telemetry/trajectory/{mid}`. `heartbeats` must already be ordered
/// ascending by `hb_seq` and scoped to the requested time window;
/// `dives` are the persisted dive summaries for the same `mid`/window,
/// matched chronologically against dive segments in the stream.
pub fn build(heartbeats: &[HeartbeatRow], dives: &[DiveRow], detailed: bool) -> FeatureCollection {
    let segments = build_segments(heartbeats, dives);
    let mut features = Vec::new();
    let mut dive_iter = dives.iter();

    for segment in &segments {
        if !segment.is_dive {
            features.push(line_string_feature(segment, "trajectory", JsonObject::new()));
            continue;
        }

        let dive = dive_iter.next();
        let max_depth_m = segment
            .frames
            .iter()
            .filter_map(|f| f.payload.get("environment")?.get("depth_m")?.as_f64())
            .fold(0.0_f64, f64::max);
        let started_at = segment.frames.first().map(|f| f.ts);
        let ended_at = segment.frames.last().map(|f| f.ts);
        let duration_s = match (started_at, ended_at) {
            (Some(s), Some(e)) => (e - s).num_seconds().max(0),
            _ => 0,
        };

        let mut props = JsonObject::new();
        if let Some(d) = dive {
            props.insert("dive_id".to_string(), JsonValue::from(d.id.to_string()));
        }
        props.insert("max_depth_m".to_string(), JsonValue::from(max_depth_m));
        props.insert("duration_s".to_string(), JsonValue::from(duration_s));
        if let Some(s) = started_at {
            props.insert("started_at".to_string(), JsonValue::from(s.to_rfc3339()));
        }
        features.push(line_string_feature(segment, "dive", props));

        if let (Some(first), Some(last)) = (segment.frames.first(), segment.frames.last()) {
            let dive_id = dive.map(|d| d.id.to_string());
            let mut start_props = JsonObject::new();
            start_props.insert("marker_type".to_string(), JsonValue::from("start"));
            if let Some(ref id) = dive_id {
                start_props.insert("dive_id".to_string(), JsonValue::from(id.clone()));
            }
            features.push(point_feature(first.lon, first.lat, {
                start_props.insert("type".to_string(), JsonValue::from("dive_marker"));
                start_props.clone()
            }));

            let mut end_props = JsonObject::new();
            end_props.insert("marker_type".to_string(), JsonValue::from("end"));
            if let Some(ref id) = dive_id {
                end_props.insert("dive_id".to_string(), JsonValue::from(id.clone()));
            }
            end_props.insert("type".to_string(), JsonValue::from("dive_marker"));
            features.push(point_feature(last.lon, last.lat, end_props));
        }
    }

    if let Some(last) = segments.iter().flat_map(|s| s.frames.iter()).last() {
        let mut props = JsonObject::new();
        props.insert("type".to_string(), JsonValue::from("current"));
        if last.clock_skew {
            props.insert("clock_skew".to_string(), JsonValue::from(true));
        }
        features.push(point_feature(last.lon, last.lat, props));
    }

    if detailed {
        for segment in &segments {
            for frame in &segment.frames {
                let mut props = flatten_payload(&frame.payload);
                props.insert("type".to_string(), JsonValue::from("heartbeat_detail"));
                if frame.clock_skew {
                    props.insert("clock_skew".to_string(), JsonValue::from(true));
                }
                features.push(point_feature(frame.lon, frame.lat, props));
            }
        }
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
