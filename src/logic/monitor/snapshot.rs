//! File snapshots
//!
//! A snapshot is a timestamped copy of the watched file in the backup
//! directory, named `<file name>.<YYYYmmdd_HHMMSS_mmm>`, plus its SHA-256 and
//! column summaries taken at copy time.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::logic::error::MonitorError;
use crate::logic::table::{ColumnSummary, Table};

#[derive(Debug, Clone, Serialize)]
pub struct FileSnapshot {
    /// The backup copy
    pub path: PathBuf,
    pub hash: String,
    pub taken_at: DateTime<Utc>,
    pub row_count: usize,
    #[serde(skip)]
    pub columns: BTreeMap<String, ColumnSummary>,
}

impl FileSnapshot {
    /// Describe an existing backup copy.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let hash = hash_file(path)?;
        let table = Table::read(path)?;
        let taken_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            path: path.to_path_buf(),
            hash,
            taken_at,
            row_count: table.row_count(),
            columns: table.summarize(),
        })
    }
}

/// SHA-256 of the file contents, hex encoded.
pub fn hash_file(path: &Path) -> Result<String, MonitorError> {
    let mut file = File::open(path).map_err(|e| MonitorError::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| MonitorError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Length of `%Y%m%d_%H%M%S_%3f`
const STAMP_LEN: usize = 19;

fn snapshot_prefix(target: &Path) -> String {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    format!("{}.", name)
}

/// Copy `target` into `backup_dir` and describe the copy. The hash is taken
/// from the copy, not the live file.
pub fn create_snapshot(target: &Path, backup_dir: &Path) -> Result<FileSnapshot, MonitorError> {
    std::fs::create_dir_all(backup_dir).map_err(|e| MonitorError::io(backup_dir, e))?;

    let now = Utc::now();
    let base = format!("{}{}", snapshot_prefix(target), now.format("%Y%m%d_%H%M%S_%3f"));
    let mut path = backup_dir.join(&base);
    let mut n = 1;
    while path.exists() {
        path = backup_dir.join(format!("{}_{}", base, n));
        n += 1;
    }

    std::fs::copy(target, &path).map_err(|e| MonitorError::io(&path, e))?;
    let mut snapshot = FileSnapshot::load(&path)?;
    snapshot.taken_at = now;

    log::info!("Backup created: {}", path.display());
    Ok(snapshot)
}

/// Existing snapshots of `target`, oldest first.
pub fn list_snapshots(target: &Path, backup_dir: &Path) -> Result<Vec<PathBuf>, MonitorError> {
    let prefix = snapshot_prefix(target);
    let entries = match std::fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MonitorError::io(backup_dir, e)),
    };

    let mut snapshots: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect();

    snapshots.sort_by_key(|p| {
        let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        snapshot_order(&name, prefix.len())
    });
    Ok(snapshots)
}

/// Timestamps sort lexicographically; copies within the same millisecond
/// carry a `_N` suffix.
fn snapshot_order(name: &str, prefix_len: usize) -> (String, u64) {
    let end = prefix_len + STAMP_LEN;
    let stamp = name.get(..end).unwrap_or(name).to_string();
    let seq = name
        .get(end..)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    (stamp, seq)
}

/// Delete the oldest snapshots beyond `keep`. `keep == 0` keeps everything.
pub fn prune_snapshots(target: &Path, backup_dir: &Path, keep: usize) -> Result<usize, MonitorError> {
    if keep == 0 {
        return Ok(0);
    }

    let snapshots = list_snapshots(target, backup_dir)?;
    let excess = snapshots.len().saturating_sub(keep);

    for path in &snapshots[..excess] {
        std::fs::remove_file(path).map_err(|e| MonitorError::io(path, e))?;
        log::debug!("Pruned snapshot {}", path.display());
    }
    Ok(excess)
}
