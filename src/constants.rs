//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every default can be overridden through the environment; the helpers at the
//! bottom of this file read a variable and fall back to the constant.

use std::time::Duration;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Machine Health";

// ============================================
// Source
// ============================================

/// Default device endpoint (Arduino Uno on Linux)
pub const DEFAULT_SENSOR_PORT: &str = "/dev/ttyACM0";

/// Machine identifier used when neither the frame nor the host name provides one
pub const UNKNOWN_MACHINE_ID: &str = "unknown";

/// Default product quality variant (L / M / H)
pub const DEFAULT_MACHINE_TYPE: &str = "L";

/// Fixed delay between reconnect attempts (seconds)
pub const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 5;

/// Upper bound on a single device read (milliseconds)
pub const DEFAULT_DEVICE_READ_TIMEOUT_MS: u64 = 1_000;

/// Synthetic generator cadence (milliseconds)
pub const DEFAULT_MOCK_INTERVAL_MS: u64 = 500;

// ============================================
// Pipeline
// ============================================

/// Bounded channel capacity between reader and consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Consumer poll timeout (milliseconds)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1_000;

/// Grace period for draining and joining tasks at shutdown (seconds)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

// ============================================
// Change detection
// ============================================

/// Default monitor check interval (5 minutes)
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 300;

/// Snapshots kept per monitored file (0 = unlimited)
pub const DEFAULT_MAX_SNAPSHOTS: usize = 50;

/// `rows_changed` strictly above this raises an alert
pub const DEFAULT_ALERT_ROW_THRESHOLD: u64 = 1_000;

/// Timeout for a single alert webhook delivery
pub const ALERT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Default data directory for sink output
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("machine-health")
        .join("data")
}

/// Machine id: `MACHINE_ID`, else the host name, else "unknown"
pub fn get_machine_id() -> String {
    if let Ok(id) = std::env::var("MACHINE_ID") {
        if !id.trim().is_empty() {
            return id.trim().to_string();
        }
    }

    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_MACHINE_ID.to_string())
}

/// Device endpoint from `SENSOR_PORT` (or the legacy `ARDUINO_PORT`)
pub fn get_sensor_port() -> String {
    std::env::var("SENSOR_PORT")
        .or_else(|_| std::env::var("ARDUINO_PORT"))
        .unwrap_or_else(|_| DEFAULT_SENSOR_PORT.to_string())
}

/// Drain and join grace from `SHUTDOWN_GRACE_SECS`
pub fn get_shutdown_grace() -> Duration {
    Duration::from_secs(env_number("SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS))
}

/// Boolean flag; accepts true/1/yes/on (case-insensitive)
pub fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Numeric variable with fallback; unparsable values are logged and ignored
pub fn env_number<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("Ignoring invalid {}={:?}, using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Optional string variable (empty counts as unset)
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
