//! Monitor Module - Change Detection
//!
//! Periodically hashes the record file, keeps rotating backups, reports
//! per-column drift between consecutive snapshots and raises an alert on
//! large row-count changes.
//!
//! ## Structure
//! - `snapshot.rs` - hashing, backup copies, retention
//! - `report.rs` - ChangeReport
//! - `probe.rs` - process resource usage (sysinfo)
//! - `alert.rs` - alert channel (webhook or no-op)
//! - `detector.rs` - ChangeDetectionMonitor state machine

pub mod alert;
pub mod detector;
pub mod probe;
pub mod report;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use alert::{AlertNotifier, NoopNotifier, WebhookNotifier};
pub use detector::{ChangeDetectionMonitor, MonitorStats};
pub use probe::{ProcessProbe, ResourceProbe, ResourceStats};
pub use report::{ChangeReport, ColumnDelta};
pub use snapshot::FileSnapshot;

use crate::logic::pipeline::shutdown::ShutdownSignal;

/// Check once, then every `interval` until stopped.
///
/// Each check runs on the blocking pool; a stop arriving mid-check takes
/// effect once that check returns.
pub async fn run_monitor(monitor: ChangeDetectionMonitor, mut shutdown: ShutdownSignal) -> MonitorStats {
    let interval = monitor.config().interval;
    log::info!(
        "Monitoring {} every {:?}",
        monitor.config().target.display(),
        interval
    );

    let mut monitor = Some(monitor);
    while !shutdown.is_stopping() {
        let Some(mut current) = monitor.take() else {
            break;
        };
        let checked = tokio::task::spawn_blocking(move || {
            // Errors are logged and counted inside
            if let Ok(Some(report)) = current.check_for_changes() {
                log::debug!(
                    "Check finished: {} rows changed, alert {}",
                    report.rows_changed,
                    report.alert_raised
                );
            }
            current
        })
        .await;

        match checked {
            Ok(m) => monitor = Some(m),
            Err(e) => {
                log::error!("Monitor check task failed: {}", e);
                break;
            }
        }

        tokio::select! {
            _ = shutdown.stopped() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    let stats = monitor.map(|m| m.stats().clone()).unwrap_or_default();
    log::info!(
        "Monitor stopped: {} checks, {} changes, {} reports, {} alerts, {} errors",
        stats.checks,
        stats.changes,
        stats.reports,
        stats.alerts,
        stats.errors
    );
    stats
}
