use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::snapshot::list_snapshots;
use super::*;
use crate::logic::config::MonitorConfig;
use crate::logic::error::MonitorError;
use crate::logic::pipeline::shutdown::ShutdownCoordinator;

#[derive(Clone, Default)]
struct CountingNotifier {
    sent: Arc<AtomicU64>,
}

impl AlertNotifier for CountingNotifier {
    fn send(&self, _subject: &str, _body: &str) -> Result<(), MonitorError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FixedProbe;

impl ResourceProbe for FixedProbe {
    fn probe(&mut self) -> Option<ResourceStats> {
        Some(ResourceStats {
            cpu_percent: 12.5,
            memory_mb: 256.0,
            memory_percent: 3.2,
        })
    }
}

fn write_rows(path: &Path, rows: usize) {
    let mut csv = String::from("timestamp,temperature,vibration\n");
    for i in 0..rows {
        csv.push_str(&format!("2026-01-01T00:00:00Z,{},{}\n", 60 + i % 20, (i % 5) as f64 * 0.5));
    }
    std::fs::write(path, csv).unwrap();
}

fn config(dir: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::for_data_dir(dir, "m1");
    config.interval = Duration::from_secs(10);
    config
}

fn metrics_files(config: &MonitorConfig) -> usize {
    std::fs::read_dir(&config.metrics_dir).map(|d| d.count()).unwrap_or(0)
}

fn monitor(config: MonitorConfig, notifier: &CountingNotifier) -> ChangeDetectionMonitor {
    ChangeDetectionMonitor::new(config, Box::new(notifier.clone()), None).unwrap()
}

#[test]
fn test_unmodified_file_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_rows(&config.target, 10);
    let notifier = CountingNotifier::default();

    let mut first = monitor(config.clone(), &notifier);
    assert!(first.check_for_changes().unwrap().is_none());
    drop(first);

    // Restart against the same file
    let mut second = monitor(config.clone(), &notifier);
    assert!(second.check_for_changes().unwrap().is_none());

    assert_eq!(list_snapshots(&config.target, &config.backup_dir).unwrap().len(), 1);
    assert_eq!(metrics_files(&config), 0);
    assert_eq!(second.stats().reports, 0);
}

#[test]
fn test_large_growth_raises_one_alert() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_rows(&config.target, 500);
    let notifier = CountingNotifier::default();
    let mut monitor = monitor(config.clone(), &notifier);

    write_rows(&config.target, 1600);
    let report = monitor.check_for_changes().unwrap().expect("change must be reported");
    assert_eq!(report.previous_rows, 500);
    assert_eq!(report.current_rows, 1600);
    assert_eq!(report.rows_changed, 1100);
    assert!(report.alert_raised);
    assert!(report.columns.contains_key("temperature"));

    // Unchanged since: no second alert
    assert!(monitor.check_for_changes().unwrap().is_none());
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.stats().alerts, 1);
    assert_eq!(metrics_files(&config), 1);
    assert_eq!(list_snapshots(&config.target, &config.backup_dir).unwrap().len(), 2);
}

#[test]
fn test_small_change_reports_without_alert() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_rows(&config.target, 500);
    let notifier = CountingNotifier::default();
    let mut monitor = monitor(config.clone(), &notifier);

    write_rows(&config.target, 1500);
    let report = monitor.check_for_changes().unwrap().unwrap();
    assert_eq!(report.rows_changed, 1000);
    assert!(!report.alert_raised);
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);
}

#[test]
fn test_alert_sent_when_report_cannot_be_saved() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    // A plain file where the metrics directory should be
    config.metrics_dir = dir.path().join("metrics.txt");
    std::fs::write(&config.metrics_dir, "not a directory").unwrap();
    write_rows(&config.target, 500);
    let notifier = CountingNotifier::default();
    let mut monitor = monitor(config.clone(), &notifier);

    write_rows(&config.target, 1600);
    let report = monitor.check_for_changes().unwrap().expect("change must be reported");
    assert!(report.alert_raised);
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.stats().alerts, 1);
    assert_eq!(monitor.stats().reports, 0);
    assert_eq!(monitor.stats().errors, 1);

    // Already consumed: no duplicate on the next check
    assert!(monitor.check_for_changes().unwrap().is_none());
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
}

#[test]
fn test_probe_stats_attached() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_rows(&config.target, 5);

    let mut monitor = ChangeDetectionMonitor::new(
        config.clone(),
        Box::new(NoopNotifier),
        Some(Box::new(FixedProbe)),
    )
    .unwrap();

    write_rows(&config.target, 6);
    let report = monitor.check_for_changes().unwrap().unwrap();
    assert_eq!(report.resource_stats.unwrap().cpu_percent, 12.5);
}

#[test]
fn test_target_appearing_later_becomes_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let notifier = CountingNotifier::default();

    let mut monitor = monitor(config.clone(), &notifier);
    assert!(monitor.last_snapshot().is_none());
    assert!(monitor.check_for_changes().unwrap().is_none());

    write_rows(&config.target, 3);
    assert!(monitor.check_for_changes().unwrap().is_none());
    assert_eq!(monitor.last_snapshot().unwrap().row_count, 3);

    write_rows(&config.target, 4);
    assert_eq!(monitor.check_for_changes().unwrap().unwrap().rows_changed, 1);
}

#[test]
fn test_retention_prunes_oldest() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.max_snapshots = 2;
    write_rows(&config.target, 1);
    let mut monitor = monitor(config.clone(), &CountingNotifier::default());

    for rows in 2..6 {
        write_rows(&config.target, rows);
        monitor.check_for_changes().unwrap();
    }

    let snapshots = list_snapshots(&config.target, &config.backup_dir).unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots.last(), Some(&monitor.last_snapshot().unwrap().path));
}

#[tokio::test(start_paused = true)]
async fn test_loop_checks_before_first_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.interval = Duration::from_secs(3600);
    write_rows(&config.target, 2);
    let notifier = CountingNotifier::default();
    let monitor = monitor(config.clone(), &notifier);

    // Changed while the process was down
    write_rows(&config.target, 1500);

    let coordinator = ShutdownCoordinator::new();
    let task = tokio::spawn(run_monitor(monitor, coordinator.signal()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    coordinator.request_stop();

    let stats = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("monitor must stop")
        .unwrap();
    assert_eq!(stats.checks, 1);
    assert_eq!(stats.changes, 1);
    assert_eq!(stats.alerts, 1);
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_loop_exits_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_rows(&config.target, 2);
    let monitor = monitor(config, &CountingNotifier::default());

    let coordinator = ShutdownCoordinator::new();
    let task = tokio::spawn(run_monitor(monitor, coordinator.signal()));

    tokio::time::sleep(Duration::from_secs(15)).await;
    coordinator.request_stop();

    let stats = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("monitor must stop")
        .unwrap();
    assert!(stats.checks >= 1);
    assert_eq!(stats.changes, 0);
}
