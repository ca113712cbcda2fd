//! Change reports

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::probe::ResourceStats;
use super::snapshot::FileSnapshot;
use crate::logic::error::MonitorError;

/// Mean/std movement of one numeric column between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnDelta {
    pub previous_mean: f64,
    pub current_mean: f64,
    pub mean_delta: f64,
    pub previous_std: Option<f64>,
    pub current_std: Option<f64>,
    pub std_delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub target: PathBuf,
    pub previous_snapshot: PathBuf,
    pub current_snapshot: PathBuf,
    pub previous_rows: usize,
    pub current_rows: usize,
    /// Absolute row-count difference
    pub rows_changed: u64,
    pub columns: BTreeMap<String, ColumnDelta>,
    pub resource_stats: Option<ResourceStats>,
    pub alert_raised: bool,
}

impl ChangeReport {
    /// Compare two snapshots. Only columns numeric in both are reported.
    pub fn between(target: &Path, previous: &FileSnapshot, current: &FileSnapshot) -> Self {
        let columns = current
            .columns
            .iter()
            .filter_map(|(name, curr)| {
                let prev = previous.columns.get(name)?;
                let std_delta = match (prev.std, curr.std) {
                    (Some(p), Some(c)) => Some(c - p),
                    _ => None,
                };
                Some((
                    name.clone(),
                    ColumnDelta {
                        previous_mean: prev.mean,
                        current_mean: curr.mean,
                        mean_delta: curr.mean - prev.mean,
                        previous_std: prev.std,
                        current_std: curr.std,
                        std_delta,
                    },
                ))
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            target: target.to_path_buf(),
            previous_snapshot: previous.path.clone(),
            current_snapshot: current.path.clone(),
            previous_rows: previous.row_count,
            current_rows: current.row_count,
            rows_changed: current.row_count.abs_diff(previous.row_count) as u64,
            columns,
            resource_stats: None,
            alert_raised: false,
        }
    }

    /// Write as `metrics_<timestamp>.json` in `dir`.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, MonitorError> {
        std::fs::create_dir_all(dir).map_err(|e| MonitorError::io(dir, e))?;

        let stamp = self.generated_at.format("%Y%m%d_%H%M%S_%3f");
        let mut path = dir.join(format!("metrics_{}.json", stamp));
        if path.exists() {
            path = dir.join(format!("metrics_{}_{}.json", stamp, self.id.simple()));
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| MonitorError::io(&path, e))?;
        log::info!("Change report saved: {}", path.display());
        Ok(path)
    }

    /// Plain-text alert body.
    pub fn alert_body(&self) -> String {
        let mut body = format!(
            "File: {}\nRows: {} -> {} ({} changed)\nSnapshot: {}\n",
            self.target.display(),
            self.previous_rows,
            self.current_rows,
            self.rows_changed,
            self.current_snapshot.display()
        );

        for (name, delta) in &self.columns {
            body.push_str(&format!(
                "{}: mean {:.3} -> {:.3} ({:+.3})\n",
                name, delta.previous_mean, delta.current_mean, delta.mean_delta
            ));
        }

        if let Some(stats) = &self.resource_stats {
            body.push_str(&format!(
                "Process: CPU {:.1}%, memory {:.1} MB ({:.1}%)\n",
                stats.cpu_percent, stats.memory_mb, stats.memory_percent
            ));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::table::Table;

    fn snapshot(path: &str, csv: &str) -> FileSnapshot {
        let table = Table::parse(csv).unwrap();
        FileSnapshot {
            path: PathBuf::from(path),
            hash: String::new(),
            taken_at: Utc::now(),
            row_count: table.row_count(),
            columns: table.summarize(),
        }
    }

    #[test]
    fn test_deltas_between_snapshots() {
        let prev = snapshot("a.1", "temperature,label\n60,x\n70,y\n");
        let curr = snapshot("a.2", "temperature,label,extra\n70,x,1\n80,y,2\n90,z,3\n");

        let report = ChangeReport::between(Path::new("a"), &prev, &curr);
        assert_eq!(report.rows_changed, 1);
        assert_eq!(report.columns.len(), 1);

        let t = report.columns["temperature"];
        assert_eq!(t.previous_mean, 65.0);
        assert_eq!(t.current_mean, 80.0);
        assert_eq!(t.mean_delta, 15.0);
        assert!((t.std_delta.unwrap() - (10.0 - 50f64.sqrt())).abs() < 1e-9);
    }

    #[test]
    fn test_shrinking_file_counts_absolute_change() {
        let prev = snapshot("a.1", "v\n1\n2\n3\n");
        let curr = snapshot("a.2", "v\n1\n");
        assert_eq!(ChangeReport::between(Path::new("a"), &prev, &curr).rows_changed, 2);
    }

    #[test]
    fn test_persist_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let prev = snapshot("a.1", "v\n1\n");
        let curr = snapshot("a.2", "v\n1\n2\n");
        let report = ChangeReport::between(Path::new("a"), &prev, &curr);

        let path = report.persist(dir.path()).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["rows_changed"], 1);
        assert_eq!(saved["columns"]["v"]["mean_delta"], 0.5);
    }
}
