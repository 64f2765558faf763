//! Unit conversions and code interpretation for OTDR measurements.
//!
//! SOR files store positions as light travel time in 100 ps increments;
//! converting to metres needs the group index of the fibre under test,
//! which lives in the fixed parameters block.

use chrono::{LocalResult, SecondsFormat, TimeZone, Utc};

/// Group index assumed when the file supplies none, or a non-positive one.
/// Typical value for silica single-mode fibre.
pub const DEFAULT_GROUP_INDEX: f64 = 1.46850;

const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// Converts a round-trip light travel time in 100 ps units to a one-way
/// distance in metres, rounded to the millimetre. The divide by two turns
/// the round trip into the distance along the fibre.
pub fn time_to_distance_m(time_100ps: u32, group_index: f64) -> f64 {
    let gi = if group_index > 0.0 {
        group_index
    } else {
        DEFAULT_GROUP_INDEX
    };
    let meters = time_100ps as f64 * 1e-10 * SPEED_OF_LIGHT_M_PER_S / (2.0 * gi);
    (meters * 1000.0).round() / 1000.0
}

/// Interprets an event-type code into a readable description.
///
/// The first character carries the reflectance class, the second how the
/// event entered the record, and the seventh (when present) whether the
/// event sits on a launch or tail fibre. Characters outside those sets
/// contribute nothing; codes shorter than two characters are unknown.
/// The raw code should always be kept alongside the interpretation, as
/// vendors use further characters that are not distinguished here.
pub fn describe_event_type(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() < 2 {
        return "unknown".to_string();
    }
    let mut parts: Vec<&str> = Vec::new();
    match chars[0] {
        '0' => parts.push("non-reflective"),
        '1' => parts.push("reflective"),
        '2' => parts.push("saturated reflective"),
        _ => {}
    }
    match chars[1] {
        'F' => parts.push("end-of-fiber"),
        'A' => parts.push("added-by-user"),
        'O' => parts.push("found-by-OTDR"),
        'M' => parts.push("moved-by-user"),
        _ => {}
    }
    if let Some(&c) = chars.get(6) {
        match c {
            'L' => parts.push("launch-fiber"),
            'T' => parts.push("tail-fiber"),
            _ => {}
        }
    }
    parts.join(", ")
}

/// Maps an ITU-T fibre type code to its name. Unknown codes pass through
/// as their decimal value.
pub fn fiber_type_name(code: u16) -> String {
    match code {
        651 => "G.651 (multimode)".to_string(),
        652 => "G.652 (standard SM)".to_string(),
        653 => "G.653 (dispersion-shifted)".to_string(),
        654 => "G.654 (cut-off shifted)".to_string(),
        655 => "G.655 (NZ-DSF)".to_string(),
        656 => "G.656 (wideband NZ-DSF)".to_string(),
        657 => "G.657 (bend-insensitive)".to_string(),
        other => other.to_string(),
    }
}

/// Maps a build condition code to its name. Unknown codes pass through.
pub fn build_condition_name(code: &str) -> String {
    match code {
        "BC" => "as-built".to_string(),
        "CC" => "as-current".to_string(),
        "RC" => "as-repaired".to_string(),
        "OT" => "other".to_string(),
        other => other.to_string(),
    }
}

/// Maps a trace type code to its name. Unknown codes pass through.
pub fn trace_type_name(code: &str) -> String {
    match code {
        "ST" => "standard".to_string(),
        "RT" => "reverse".to_string(),
        "DT" => "difference".to_string(),
        "RF" => "reference".to_string(),
        other => other.to_string(),
    }
}

/// Renders an acquisition timestamp (unix epoch seconds) as RFC 3339 UTC.
/// Returns None when the calendar rejects the value; callers keep the raw
/// epoch either way.
pub fn epoch_to_utc(epoch: u32) -> Option<String> {
    match Utc.timestamp_opt(i64::from(epoch), 0) {
        LocalResult::Single(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        _ => None,
    }
}

#[test]
fn test_time_to_distance() {
    assert_eq!(time_to_distance_m(1_000_000, 1.46850), 10207.438);
    assert_eq!(time_to_distance_m(0, 1.46850), 0.0);
}

#[test]
fn test_time_to_distance_default_group_index() {
    // Non-positive group indices fall back to the silica default
    assert_eq!(
        time_to_distance_m(1_000_000, 0.0),
        time_to_distance_m(1_000_000, DEFAULT_GROUP_INDEX)
    );
    assert_eq!(
        time_to_distance_m(532, -1.0),
        time_to_distance_m(532, DEFAULT_GROUP_INDEX)
    );
}

#[test]
fn test_time_to_distance_monotone() {
    let mut last = -1.0;
    for t in [0u32, 1, 532, 182_802, 1_000_000, u32::MAX] {
        let d = time_to_distance_m(t, 1.4685);
        assert!(d > last);
        last = d;
    }
}

#[test]
fn test_describe_event_type() {
    assert_eq!(
        describe_event_type("1F9999LS"),
        "reflective, end-of-fiber, launch-fiber"
    );
    assert_eq!(
        describe_event_type("0O9999TS"),
        "non-reflective, found-by-OTDR, tail-fiber"
    );
    assert_eq!(
        describe_event_type("2A9999"),
        "saturated reflective, added-by-user"
    );
    assert_eq!(describe_event_type("1M"), "reflective, moved-by-user");
}

#[test]
fn test_describe_event_type_edge_cases() {
    assert_eq!(describe_event_type(""), "unknown");
    assert_eq!(describe_event_type("1"), "unknown");
    // Unrecognised characters contribute nothing
    assert_eq!(describe_event_type("XY9999ZZ"), "");
    assert_eq!(describe_event_type("9F9999"), "end-of-fiber");
}

#[test]
fn test_code_names() {
    assert_eq!(fiber_type_name(652), "G.652 (standard SM)");
    assert_eq!(fiber_type_name(999), "999");
    assert_eq!(build_condition_name("BC"), "as-built");
    assert_eq!(build_condition_name("ZZ"), "ZZ");
    assert_eq!(trace_type_name("ST"), "standard");
    assert_eq!(trace_type_name("??"), "??");
}

#[test]
fn test_epoch_to_utc() {
    assert_eq!(
        epoch_to_utc(1_569_835_674).as_deref(),
        Some("2019-09-30T09:27:54Z")
    );
    assert_eq!(epoch_to_utc(0).as_deref(), Some("1970-01-01T00:00:00Z"));
}
