//! Device frame decoding
//!
//! One frame is one newline-terminated JSON object of numeric fields.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{mechanical_power, RawSample};
use crate::logic::error::SourceError;

/// Frames longer than this are rejected without parsing.
pub const MAX_FRAME_BYTES: usize = 4096;

/// Longest excerpt of a bad line kept for logging.
const LINE_EXCERPT: usize = 120;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceFrame {
    machine_id: Option<String>,
    temperature: Option<f64>,
    vibration: Option<f64>,
    pressure: Option<f64>,
    rpm: Option<f64>,
    tool_wear: Option<f64>,
    air_temp: Option<f64>,
    process_temp: Option<f64>,
    rotation_speed: Option<f64>,
    torque: Option<f64>,
    temp_diff: Option<f64>,
    power: Option<f64>,
}

/// Decode one line. Blank lines yield `Ok(None)`.
///
/// Missing scored fields decode as `0.0`; missing derived fields are computed
/// here when their inputs are present.
pub fn decode_frame(
    line: &[u8],
    default_machine_id: &str,
    received_at: DateTime<Utc>,
) -> Result<Option<RawSample>, SourceError> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(SourceError::decode(
            format!("frame exceeds {} bytes", MAX_FRAME_BYTES),
            excerpt(&String::from_utf8_lossy(line)),
        ));
    }

    let text = std::str::from_utf8(line).map_err(|e| {
        SourceError::decode(
            format!("invalid UTF-8: {}", e),
            excerpt(&String::from_utf8_lossy(line)),
        )
    })?;

    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    // serde would also accept a JSON array for a struct
    if !text.starts_with('{') {
        return Err(SourceError::decode("frame is not a JSON object", excerpt(text)));
    }

    let frame: DeviceFrame = serde_json::from_str(text)
        .map_err(|e| SourceError::decode(e.to_string(), excerpt(text)))?;

    let temp_diff = frame.temp_diff.or(match (frame.process_temp, frame.air_temp) {
        (Some(p), Some(a)) => Some(p - a),
        _ => None,
    });
    let power = frame.power.or(match (frame.rotation_speed, frame.torque) {
        (Some(speed), Some(torque)) => Some(mechanical_power(speed, torque)),
        _ => None,
    });

    Ok(Some(RawSample {
        machine_id: frame
            .machine_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| default_machine_id.to_string()),
        timestamp: received_at,
        temperature: frame.temperature.unwrap_or(0.0),
        vibration: frame.vibration.unwrap_or(0.0),
        pressure: frame.pressure.unwrap_or(0.0),
        rpm: frame.rpm.unwrap_or(0.0),
        tool_wear: frame.tool_wear,
        air_temp: frame.air_temp,
        process_temp: frame.process_temp,
        rotation_speed: frame.rotation_speed,
        torque: frame.torque,
        temp_diff,
        power,
    }))
}

fn excerpt(s: &str) -> String {
    if s.chars().count() <= LINE_EXCERPT {
        s.to_string()
    } else {
        let cut: String = s.chars().take(LINE_EXCERPT).collect();
        format!("{}…", cut)
    }
}
