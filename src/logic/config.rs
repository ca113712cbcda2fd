//! Runtime configuration
//!
//! Built once at startup from the environment (defaults in `constants.rs`),
//! with a few command-line overrides on top. Everything downstream receives
//! these structs explicitly.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{self, env_flag, env_number, env_opt};
use crate::logic::channel::BackpressurePolicy;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::scoring::MachineType;
use crate::logic::sink::sensor_data_path;

/// Command-line overrides applied over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mock: bool,
    pub port: Option<String>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub use_mock: bool,
    pub sensor_port: String,
    pub machine_id: String,
    pub machine_type: MachineType,
    pub data_dir: PathBuf,
    /// Set but missing/unloadable is fatal at startup
    pub classifier_model: Option<PathBuf>,

    pub channel_capacity: usize,
    pub backpressure: BackpressurePolicy,
    pub reconnect_backoff: Duration,
    pub device_read_timeout: Duration,
    pub poll_timeout: Duration,
    pub mock_interval: Duration,
    pub shutdown_grace: Duration,

    pub monitor_enabled: bool,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// File watched for drift
    pub target: PathBuf,
    pub interval: Duration,
    pub backup_dir: PathBuf,
    pub metrics_dir: PathBuf,
    /// 0 = keep every snapshot
    pub max_snapshots: usize,
    pub alert_row_threshold: u64,
    /// Process whose resource usage is attached to reports
    pub process_name: Option<String>,
    /// Unset means alerts are dropped silently
    pub webhook_url: Option<String>,
}

impl MonitorConfig {
    /// Defaults rooted at `data_dir`, watching the machine's record file.
    pub fn for_data_dir(data_dir: &std::path::Path, machine_id: &str) -> Self {
        Self {
            target: sensor_data_path(data_dir, machine_id),
            interval: Duration::from_secs(constants::DEFAULT_MONITOR_INTERVAL_SECS),
            backup_dir: data_dir.join("csv_backups"),
            metrics_dir: data_dir.join("metrics"),
            max_snapshots: constants::DEFAULT_MAX_SNAPSHOTS,
            alert_row_threshold: constants::DEFAULT_ALERT_ROW_THRESHOLD,
            process_name: None,
            webhook_url: None,
        }
    }

    pub fn from_env(data_dir: &std::path::Path, machine_id: &str) -> Self {
        let defaults = Self::for_data_dir(data_dir, machine_id);

        Self {
            target: env_opt("MONITOR_TARGET").map(PathBuf::from).unwrap_or(defaults.target),
            interval: Duration::from_secs(env_number(
                "MONITOR_INTERVAL_SECS",
                constants::DEFAULT_MONITOR_INTERVAL_SECS,
            )),
            backup_dir: env_opt("BACKUP_DIR").map(PathBuf::from).unwrap_or(defaults.backup_dir),
            metrics_dir: env_opt("METRICS_DIR").map(PathBuf::from).unwrap_or(defaults.metrics_dir),
            max_snapshots: env_number("MONITOR_MAX_SNAPSHOTS", constants::DEFAULT_MAX_SNAPSHOTS),
            alert_row_threshold: env_number(
                "ALERT_ROW_THRESHOLD",
                constants::DEFAULT_ALERT_ROW_THRESHOLD,
            ),
            process_name: env_opt("MONITOR_PROCESS_NAME"),
            webhook_url: env_opt("ALERT_WEBHOOK_URL"),
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.interval.is_zero() {
            return Err(PipelineError::fatal("MONITOR_INTERVAL_SECS must be at least 1"));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Defaults for a given data directory. Used as the base of `from_env`.
    pub fn with_defaults(data_dir: PathBuf, machine_id: String) -> Self {
        Self {
            use_mock: false,
            sensor_port: constants::DEFAULT_SENSOR_PORT.to_string(),
            machine_type: MachineType::default(),
            classifier_model: None,
            channel_capacity: constants::DEFAULT_CHANNEL_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            reconnect_backoff: Duration::from_secs(constants::DEFAULT_RECONNECT_BACKOFF_SECS),
            device_read_timeout: Duration::from_millis(constants::DEFAULT_DEVICE_READ_TIMEOUT_MS),
            poll_timeout: Duration::from_millis(constants::DEFAULT_POLL_TIMEOUT_MS),
            mock_interval: Duration::from_millis(constants::DEFAULT_MOCK_INTERVAL_MS),
            shutdown_grace: Duration::from_secs(constants::DEFAULT_SHUTDOWN_GRACE_SECS),
            monitor_enabled: true,
            monitor: MonitorConfig::for_data_dir(&data_dir, &machine_id),
            data_dir,
            machine_id,
        }
    }

    /// Load from environment variables, then apply `overrides`.
    ///
    /// Bad numbers fall back to their default with a warning; a bad policy or
    /// machine type is fatal.
    pub fn from_env(overrides: &Overrides) -> PipelineResult<Self> {
        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| env_opt("DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(constants::default_data_dir);
        let machine_id = constants::get_machine_id();

        let backpressure = match env_opt("BACKPRESSURE_POLICY") {
            Some(raw) => raw.parse::<BackpressurePolicy>().map_err(PipelineError::fatal)?,
            None => BackpressurePolicy::default(),
        };

        let machine_type = env_opt("MACHINE_TYPE")
            .unwrap_or_else(|| constants::DEFAULT_MACHINE_TYPE.to_string())
            .parse::<MachineType>()
            .map_err(PipelineError::fatal)?;

        let config = Self {
            use_mock: overrides.mock || env_flag("USE_MOCK_DATA", false),
            sensor_port: overrides.port.clone().unwrap_or_else(constants::get_sensor_port),
            machine_type,
            classifier_model: env_opt("CLASSIFIER_MODEL").map(PathBuf::from),
            channel_capacity: env_number("CHANNEL_CAPACITY", constants::DEFAULT_CHANNEL_CAPACITY),
            backpressure,
            reconnect_backoff: Duration::from_secs(env_number(
                "RECONNECT_BACKOFF_SECS",
                constants::DEFAULT_RECONNECT_BACKOFF_SECS,
            )),
            device_read_timeout: Duration::from_millis(env_number(
                "DEVICE_READ_TIMEOUT_MS",
                constants::DEFAULT_DEVICE_READ_TIMEOUT_MS,
            )),
            poll_timeout: Duration::from_millis(env_number(
                "POLL_TIMEOUT_MS",
                constants::DEFAULT_POLL_TIMEOUT_MS,
            )),
            mock_interval: Duration::from_millis(env_number(
                "MOCK_INTERVAL_MS",
                constants::DEFAULT_MOCK_INTERVAL_MS,
            )),
            shutdown_grace: constants::get_shutdown_grace(),
            monitor_enabled: env_flag("MONITOR_ENABLED", true),
            monitor: MonitorConfig::from_env(&data_dir, &machine_id),
            data_dir,
            machine_id,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.channel_capacity == 0 {
            return Err(PipelineError::fatal("CHANNEL_CAPACITY must be at least 1"));
        }
        if self.poll_timeout.is_zero() {
            return Err(PipelineError::fatal("POLL_TIMEOUT_MS must be at least 1"));
        }
        if self.device_read_timeout.is_zero() {
            return Err(PipelineError::fatal("DEVICE_READ_TIMEOUT_MS must be at least 1"));
        }
        if self.mock_interval.is_zero() {
            return Err(PipelineError::fatal("MOCK_INTERVAL_MS must be at least 1"));
        }
        if self.monitor_enabled {
            self.monitor.validate()?;
        }
        Ok(())
    }
}
