//! Historical sensor report
//!
//! Summary statistics over the last N days of a machine's record file.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use csv::StringRecord;
use serde::Serialize;

use crate::logic::error::MonitorError;
use crate::logic::sink::sensor_data_path;
use crate::logic::table::Table;

pub const DEFAULT_REPORT_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub machine_id: String,
    pub days: i64,
    pub total_readings: usize,
    pub anomaly_count: usize,
    pub anomaly_percentage: f64,
    pub avg_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub avg_vibration: Option<f64>,
    pub max_vibration: Option<f64>,
    pub last_reading: Option<DateTime<Utc>>,
}

/// Build the report for `machine_id` from `<data_dir>/<machine_id>_sensor_data.csv`.
pub fn machine_report(
    data_dir: &Path,
    machine_id: &str,
    days: i64,
    now: DateTime<Utc>,
) -> Result<SensorReport, MonitorError> {
    let path = sensor_data_path(data_dir, machine_id);
    let table = Table::read(&path)?;
    Ok(summarize(&table, machine_id, days, now))
}

fn parse_bool(cell: &str) -> bool {
    matches!(cell.trim().to_lowercase().as_str(), "true" | "1")
}

fn mean_max(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (Some(mean), Some(max))
}

/// Rows with an unparsable timestamp are skipped.
pub fn summarize(table: &Table, machine_id: &str, days: i64, now: DateTime<Utc>) -> SensorReport {
    let since = now - Duration::days(days.max(0));
    let ts_col = table.column_index("timestamp");
    let anomaly_col = table.column_index("anomaly_detected");
    let temp_col = table.column_index("temperature");
    let vib_col = table.column_index("vibration");

    let cell = |row: &StringRecord, col: Option<usize>| -> Option<String> {
        col.and_then(|c| row.get(c)).map(|s| s.trim().to_string())
    };

    let mut total = 0;
    let mut anomalies = 0;
    let mut temperatures = Vec::new();
    let mut vibrations = Vec::new();
    let mut last_reading: Option<DateTime<Utc>> = None;

    for row in &table.rows {
        let Some(ts) = cell(row, ts_col)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc))
        else {
            continue;
        };
        if ts < since {
            continue;
        }

        total += 1;
        if cell(row, anomaly_col).map(|s| parse_bool(&s)).unwrap_or(false) {
            anomalies += 1;
        }
        if let Some(v) = cell(row, temp_col).and_then(|s| s.parse::<f64>().ok()) {
            temperatures.push(v);
        }
        if let Some(v) = cell(row, vib_col).and_then(|s| s.parse::<f64>().ok()) {
            vibrations.push(v);
        }
        last_reading = Some(last_reading.map_or(ts, |l| l.max(ts)));
    }

    let (avg_temperature, max_temperature) = mean_max(&temperatures);
    let (avg_vibration, max_vibration) = mean_max(&vibrations);

    SensorReport {
        machine_id: machine_id.to_string(),
        days,
        total_readings: total,
        anomaly_count: anomalies,
        anomaly_percentage: if total > 0 {
            anomalies as f64 / total as f64 * 100.0
        } else {
            0.0
        },
        avg_temperature,
        max_temperature,
        avg_vibration,
        max_vibration,
        last_reading,
    }
}
