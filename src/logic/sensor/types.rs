//! Sensor Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One reading from the device or the generator.
///
/// The four scored fields are always present. Process fields are optional
/// because not every device reports them. The timestamp is attached on receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub machine_id: String,
    pub timestamp: DateTime<Utc>,

    // Scored fields
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub rpm: f64,

    // Process fields
    pub tool_wear: Option<f64>,
    pub air_temp: Option<f64>,
    pub process_temp: Option<f64>,
    pub rotation_speed: Option<f64>,
    pub torque: Option<f64>,
    pub temp_diff: Option<f64>,
    pub power: Option<f64>,
}

impl RawSample {
    /// Sample with only the scored fields set
    pub fn new(
        machine_id: impl Into<String>,
        temperature: f64,
        vibration: f64,
        pressure: f64,
        rpm: f64,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            timestamp: Utc::now(),
            temperature,
            vibration,
            pressure,
            rpm,
            tool_wear: None,
            air_temp: None,
            process_temp: None,
            rotation_speed: None,
            torque: None,
            temp_diff: None,
            power: None,
        }
    }
}

/// Mechanical power in watts from rotation speed (rpm) and torque (Nm).
pub fn mechanical_power(rotation_speed: f64, torque: f64) -> f64 {
    2.0 * std::f64::consts::PI * rotation_speed * torque / 60.0
}

/// Link state of a source. Owned by the source; the reader task drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff => "backoff",
        };
        f.write_str(s)
    }
}

/// Result of one successful read call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Sample(RawSample),
    /// Read timed out or the line was blank. Not an error.
    NoData,
}

/// Counters returned by the reader task when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub samples_read: u64,
    pub decode_errors: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub io_faults: u64,
    pub dropped_oldest: u64,
    /// Read but not queued because the stop won the race with `send`
    pub discarded_at_stop: u64,
}
