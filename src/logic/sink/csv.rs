//! CSV/JSON file sink
//!
//! Per machine:
//! - `<machine_id>_sensor_data.csv` every record, append-only
//! - `<machine_id>_alerts.csv` anomalous records, same columns
//! - `<machine_id>_latest_alert.json` most recent anomalous record
//!
//! Headers are written only when a file is created. Each row is flushed as it
//! is written so a crash loses at most the row in flight.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::Sink;
use crate::logic::error::SinkError;
use crate::logic::scoring::ScoredRecord;

pub const COLUMNS: &[&str] = &[
    "timestamp",
    "machine_id",
    "temperature",
    "vibration",
    "pressure",
    "rpm",
    "tool_wear",
    "air_temp",
    "process_temp",
    "rotation_speed",
    "torque",
    "temp_diff",
    "power",
    "temp_anomaly",
    "vibration_anomaly",
    "pressure_anomaly",
    "rpm_anomaly",
    "anomaly_detected",
    "failure_probability",
    "failure_type",
    "vibration_to_rpm_ratio",
    "temperature_pressure_ratio",
    "prediction_label",
    "prediction_score",
];

/// Keep machine ids from escaping the data directory.
fn file_stem(machine_id: &str) -> String {
    let stem: String = machine_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    match stem.trim_matches('.') {
        "" => "unknown".to_string(),
        s => s.to_string(),
    }
}

pub fn sensor_data_path(data_dir: &Path, machine_id: &str) -> PathBuf {
    data_dir.join(format!("{}_sensor_data.csv", file_stem(machine_id)))
}

fn alerts_path(data_dir: &Path, machine_id: &str) -> PathBuf {
    data_dir.join(format!("{}_alerts.csv", file_stem(machine_id)))
}

fn latest_alert_path(data_dir: &Path, machine_id: &str) -> PathBuf {
    data_dir.join(format!("{}_latest_alert.json", file_stem(machine_id)))
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Cells in `COLUMNS` order; quoting is left to the writer.
fn row(record: &ScoredRecord) -> Vec<String> {
    let s = &record.sample;
    vec![
        s.timestamp.to_rfc3339(),
        s.machine_id.clone(),
        s.temperature.to_string(),
        s.vibration.to_string(),
        s.pressure.to_string(),
        s.rpm.to_string(),
        opt(s.tool_wear),
        opt(s.air_temp),
        opt(s.process_temp),
        opt(s.rotation_speed),
        opt(s.torque),
        opt(s.temp_diff),
        opt(s.power),
        record.flags.temp_anomaly.to_string(),
        record.flags.vibration_anomaly.to_string(),
        record.flags.pressure_anomaly.to_string(),
        record.flags.rpm_anomaly.to_string(),
        record.anomaly_detected.to_string(),
        opt(record.failure_probability()),
        record.failure_type().map(|t| t.as_str().to_string()).unwrap_or_default(),
        record.vibration_to_rpm_ratio.to_string(),
        record.temperature_pressure_ratio.to_string(),
        record
            .prediction
            .map(|p| p.prediction_label.to_string())
            .unwrap_or_default(),
        opt(record.prediction.map(|p| p.prediction_score)),
    ]
}

/// Append-only CSV writer with the header written on creation.
struct CsvAppender {
    writer: ::csv::Writer<File>,
    path: PathBuf,
}

impl CsvAppender {
    fn open(path: PathBuf) -> Result<Self, SinkError> {
        let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::io(&path, e))?;
        let mut appender = Self {
            writer: ::csv::WriterBuilder::new().has_headers(false).from_writer(file),
            path,
        };

        if is_new {
            appender.write_row(COLUMNS)?;
            log::info!("Created {}", appender.path.display());
        }
        Ok(appender)
    }

    fn write_row<I>(&mut self, cells: I) -> Result<(), SinkError>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.writer
            .write_record(cells)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.flush())
            .map_err(|e| SinkError::io(&self.path, e))
    }
}

struct MachineFiles {
    records: CsvAppender,
    alerts: Option<CsvAppender>,
}

/// File sink rooted at one data directory.
pub struct CsvSink {
    data_dir: PathBuf,
    machines: HashMap<String, MachineFiles>,
}

impl CsvSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| SinkError::io(&data_dir, e))?;
        Ok(Self {
            data_dir,
            machines: HashMap::new(),
        })
    }

    fn files(&mut self, machine_id: &str) -> Result<&mut MachineFiles, SinkError> {
        if !self.machines.contains_key(machine_id) {
            let records = CsvAppender::open(sensor_data_path(&self.data_dir, machine_id))?;
            self.machines.insert(
                machine_id.to_string(),
                MachineFiles {
                    records,
                    alerts: None,
                },
            );
        }
        self.machines
            .get_mut(machine_id)
            .ok_or_else(|| SinkError::io(&self.data_dir, std::io::ErrorKind::NotFound.into()))
    }
}

impl Sink for CsvSink {
    fn append_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        let cells = row(record);
        self.files(record.machine_id())?.records.write_row(&cells)
    }

    fn raise_alert(&mut self, record: &ScoredRecord) -> Result<(), SinkError> {
        let data_dir = self.data_dir.clone();
        let cells = row(record);
        let files = self.files(record.machine_id())?;

        let appended = match files.alerts.take() {
            Some(alerts) => Ok(alerts),
            None => CsvAppender::open(alerts_path(&data_dir, record.machine_id())),
        }
        .and_then(|mut alerts| {
            let result = alerts.write_row(&cells);
            files.alerts = Some(alerts);
            result
        });

        // The snapshot is written even if the alerts row failed
        let snapshot_path = latest_alert_path(&data_dir, record.machine_id());
        let snapshot = serde_json::to_string_pretty(record)
            .map_err(SinkError::from)
            .and_then(|json| std::fs::write(&snapshot_path, json).map_err(|e| SinkError::io(&snapshot_path, e)));

        log::warn!(
            "ALERT {}: {} (p={:.2})",
            record.machine_id(),
            record.failure_type().map(|t| t.as_str()).unwrap_or("Unknown"),
            record.failure_probability().unwrap_or(0.0)
        );

        appended.and(snapshot)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for files in self.machines.values_mut() {
            files
                .records
                .writer
                .flush()
                .map_err(|e| SinkError::io(&files.records.path, e))?;
            if let Some(alerts) = files.alerts.as_mut() {
                alerts.writer.flush().map_err(|e| SinkError::io(&alerts.path, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::scoring::score_rules;
    use crate::logic::sensor::RawSample;
    use crate::logic::table::Table;

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvSink::new(dir.path()).unwrap();
            sink.append_record(&score_rules(RawSample::new("m1", 70.0, 1.0, 1.0, 1500.0))).unwrap();
        }
        {
            // Reopen: existing file, no second header
            let mut sink = CsvSink::new(dir.path()).unwrap();
            sink.append_record(&score_rules(RawSample::new("m1", 71.0, 1.0, 1.0, 1500.0))).unwrap();
        }

        let rows = lines(&sensor_data_path(dir.path(), "m1"));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], COLUMNS.join(","));
        assert!(rows[1].contains(",m1,70,"));
        assert!(rows[2].contains(",m1,71,"));
        assert_eq!(rows[1].split(',').count(), COLUMNS.len());
    }

    #[test]
    fn test_alert_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();

        let first = score_rules(RawSample::new("press-2", 95.0, 6.0, 1.0, 2000.0));
        let second = score_rules(RawSample::new("press-2", 70.0, 2.0, 0.5, 2000.0));
        for record in [&first, &second] {
            sink.append_record(record).unwrap();
            sink.raise_alert(record).unwrap();
        }

        let alerts = lines(&alerts_path(dir.path(), "press-2"));
        assert_eq!(alerts.len(), 3);
        assert!(alerts[1].contains("Overheating"));

        let latest: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(latest_alert_path(dir.path(), "press-2")).unwrap(),
        )
        .unwrap();
        assert_eq!(latest["failure_type"], "Pressure Issue");
        assert_eq!(latest["machine_id"], "press-2");
    }

    #[test]
    fn test_optional_cells_are_empty() {
        let record = score_rules(RawSample::new("m1", 70.0, 2.0, 1.0, 2000.0));
        let cells = row(&record);

        let idx = |name: &str| COLUMNS.iter().position(|c| *c == name).unwrap();
        assert_eq!(cells[idx("tool_wear")], "");
        assert_eq!(cells[idx("failure_type")], "");
        assert_eq!(cells[idx("prediction_label")], "");
        assert_eq!(cells[idx("anomaly_detected")], "false");
    }

    #[test]
    fn test_machine_id_is_sanitized() {
        let path = sensor_data_path(Path::new("/data"), "../etc/passwd");
        assert_eq!(path, Path::new("/data/_etc_passwd_sensor_data.csv"));
        assert_eq!(file_stem(""), "unknown");
    }

    #[test]
    fn test_awkward_machine_id_reads_back_intact() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();
        let id = "line 3, \"north\"";
        sink.append_record(&score_rules(RawSample::new(id, 70.0, 1.0, 1.0, 1500.0))).unwrap();

        let table = Table::read(&sensor_data_path(dir.path(), id)).unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.headers.len(), COLUMNS.len());
        let col = table.column_index("machine_id").unwrap();
        assert_eq!(&table.rows[0][col], id);
    }

    #[test]
    fn test_failed_append_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path()).unwrap();
        // A directory where the CSV should be
        std::fs::create_dir(sensor_data_path(dir.path(), "m9")).unwrap();

        let err = sink
            .append_record(&score_rules(RawSample::new("m9", 70.0, 1.0, 1.0, 1500.0)))
            .unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
    }
}
