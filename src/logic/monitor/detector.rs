//! Change Detection Monitor
//!
//! Idle → Checking → Unchanged → Idle
//!                 → Changed → backup, diff, report, maybe alert → Idle
//!
//! All work here is blocking file I/O; the async loop in `mod.rs` runs it on
//! the blocking pool.

use std::path::Path;

use serde::Serialize;

use super::alert::{notifier_for, AlertNotifier};
use super::probe::{ProcessProbe, ResourceProbe};
use super::report::ChangeReport;
use super::snapshot::{create_snapshot, hash_file, list_snapshots, prune_snapshots, FileSnapshot};
use crate::logic::config::MonitorConfig;
use crate::logic::error::MonitorError;

/// Counters returned by the monitor task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub checks: u64,
    pub changes: u64,
    pub reports: u64,
    pub alerts: u64,
    pub errors: u64,
}

pub struct ChangeDetectionMonitor {
    config: MonitorConfig,
    notifier: Box<dyn AlertNotifier>,
    probe: Option<Box<dyn ResourceProbe>>,
    last: Option<FileSnapshot>,
    stats: MonitorStats,
}

impl ChangeDetectionMonitor {
    /// Monitor with the configured webhook and process probe.
    pub fn from_config(config: MonitorConfig) -> Result<Self, MonitorError> {
        let notifier = notifier_for(config.webhook_url.as_deref());
        let probe = config
            .process_name
            .clone()
            .map(|name| Box::new(ProcessProbe::new(name)) as Box<dyn ResourceProbe>);
        Self::new(config, notifier, probe)
    }

    /// Take the initial snapshot, reusing the newest backup when the target
    /// has not changed since it was made.
    pub fn new(
        config: MonitorConfig,
        notifier: Box<dyn AlertNotifier>,
        probe: Option<Box<dyn ResourceProbe>>,
    ) -> Result<Self, MonitorError> {
        let mut monitor = Self {
            config,
            notifier,
            probe,
            last: None,
            stats: MonitorStats::default(),
        };

        if !monitor.config.target.exists() {
            log::info!(
                "Monitor target {} does not exist yet, waiting for it",
                monitor.config.target.display()
            );
            return Ok(monitor);
        }

        let hash = hash_file(&monitor.config.target)?;
        if let Some(newest) = monitor.newest_snapshot()? {
            if newest.hash == hash {
                log::info!("Target unchanged since {}, reusing it", newest.path.display());
                monitor.last = Some(newest);
                return Ok(monitor);
            }
        }

        monitor.last = Some(monitor.backup()?);
        Ok(monitor)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn last_snapshot(&self) -> Option<&FileSnapshot> {
        self.last.as_ref()
    }

    fn newest_snapshot(&self) -> Result<Option<FileSnapshot>, MonitorError> {
        let snapshots = list_snapshots(&self.config.target, &self.config.backup_dir)?;
        snapshots.last().map(|p| FileSnapshot::load(p)).transpose()
    }

    fn backup(&self) -> Result<FileSnapshot, MonitorError> {
        let snapshot = create_snapshot(&self.config.target, &self.config.backup_dir)?;
        match prune_snapshots(&self.config.target, &self.config.backup_dir, self.config.max_snapshots) {
            Ok(0) => {}
            Ok(n) => log::info!("Pruned {} old snapshot(s)", n),
            Err(e) => log::warn!("Snapshot pruning failed: {}", e),
        }
        Ok(snapshot)
    }

    /// One check. Returns the report when the file changed.
    ///
    /// An unchanged file has no side effects. A changed file gets a backup and,
    /// when a previous snapshot exists, a persisted report; an alert is raised
    /// at most once per detected change.
    pub fn check_for_changes(&mut self) -> Result<Option<ChangeReport>, MonitorError> {
        self.stats.checks += 1;

        let result = self.check_inner();
        if let Err(e) = &result {
            self.stats.errors += 1;
            log::error!("Change check on {} failed: {}", self.config.target.display(), e);
        }
        result
    }

    fn check_inner(&mut self) -> Result<Option<ChangeReport>, MonitorError> {
        let target = self.config.target.clone();
        if !target.exists() {
            log::debug!("Monitor target {} missing, skipping", target.display());
            return Ok(None);
        }

        let hash = hash_file(&target)?;
        if self.last.as_ref().map(|s| s.hash == hash).unwrap_or(false) {
            log::debug!("No changes in {}", target.display());
            return Ok(None);
        }

        log::info!("Change detected in {}", target.display());
        self.stats.changes += 1;

        let current = self.backup()?;
        let Some(previous) = self.last.replace(current) else {
            log::info!("First snapshot of {} taken, nothing to compare", target.display());
            return Ok(None);
        };
        let Some(current) = self.last.as_ref() else {
            return Ok(None);
        };

        let mut report = ChangeReport::between(&target, &previous, current);
        report.resource_stats = self.probe.as_mut().and_then(|p| p.probe());
        report.alert_raised = report.rows_changed > self.config.alert_row_threshold;

        // The change is consumed at this point; alert even if the report is not saved
        match report.persist(&self.config.metrics_dir) {
            Ok(_) => self.stats.reports += 1,
            Err(e) => {
                self.stats.errors += 1;
                log::error!("Failed to persist change report: {}", e);
            }
        }

        if report.alert_raised {
            self.raise_alert(&report, &target);
        }

        Ok(Some(report))
    }

    fn raise_alert(&mut self, report: &ChangeReport, target: &Path) {
        let file = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let subject = format!("Significant data change in {}: {} rows", file, report.rows_changed);
        log::warn!("{}", subject);

        match self.notifier.send(&subject, &report.alert_body()) {
            Ok(()) => self.stats.alerts += 1,
            Err(e) => {
                self.stats.errors += 1;
                log::error!("Alert delivery failed: {}", e);
            }
        }
    }
}
