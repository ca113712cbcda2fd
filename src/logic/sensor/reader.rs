//! Reader task
//!
//! Owns the source exclusively. Pulls samples, pushes them into the channel in
//! arrival order and hides every transient fault behind the fixed backoff.

use crate::logic::channel::{SampleSender, SendOutcome};
use crate::logic::error::SourceError;
use crate::logic::pipeline::shutdown::ShutdownSignal;

use super::types::{ConnectionState, ReadOutcome, ReaderStats};
use super::SensorSource;

/// Run until stop is requested or the consumer goes away.
///
/// Dropping `tx` on exit closes the channel, which lets the consumer finish
/// draining.
pub async fn run_reader(
    mut source: Box<dyn SensorSource>,
    tx: SampleSender,
    mut shutdown: ShutdownSignal,
) -> ReaderStats {
    let mut stats = ReaderStats::default();
    log::info!("Reader started on {}", source.describe());

    'run: loop {
        if shutdown.is_stopping() {
            break;
        }

        match source.state() {
            ConnectionState::Connected => {
                let outcome = tokio::select! {
                    _ = shutdown.stopped() => break 'run,
                    outcome = source.read_next() => outcome,
                };

                match outcome {
                    Ok(ReadOutcome::Sample(sample)) => {
                        stats.samples_read += 1;

                        let sent = tokio::select! {
                            biased;
                            _ = shutdown.stopped() => {
                                stats.discarded_at_stop += 1;
                                log::debug!("Stop requested while queueing, discarding the sample in hand");
                                break 'run;
                            }
                            sent = tx.send(sample) => sent,
                        };

                        match sent {
                            Ok(SendOutcome::Delivered) => {}
                            Ok(SendOutcome::DroppedOldest) => {
                                stats.dropped_oldest += 1;
                                log::debug!("Channel full, dropped oldest sample");
                            }
                            Err(_) => {
                                log::warn!("Consumer gone, reader exiting");
                                break 'run;
                            }
                        }
                    }
                    Ok(ReadOutcome::NoData) => {}
                    Err(SourceError::Decode { reason, line }) => {
                        stats.decode_errors += 1;
                        log::warn!("Skipping malformed frame ({}): {}", reason, line);
                    }
                    Err(e @ SourceError::TransientIo { .. }) => {
                        stats.io_faults += 1;
                        log::warn!(
                            "Lost {} ({}), retrying in {:?}",
                            source.describe(),
                            e,
                            source.backoff()
                        );
                        source.close().await;
                        source.enter_backoff();
                    }
                }
            }
            ConnectionState::Backoff => {
                let backoff = source.backoff();
                tokio::select! {
                    _ = shutdown.stopped() => break 'run,
                    _ = tokio::time::sleep(backoff) => {}
                }
                try_connect(source.as_mut(), &mut stats, &mut shutdown).await;
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                try_connect(source.as_mut(), &mut stats, &mut shutdown).await;
            }
        }
    }

    source.close().await;
    drop(tx);

    log::info!(
        "Reader stopped: {} samples, {} decode errors, {} connect attempts ({} failed), {} I/O faults, {} dropped, {} discarded at stop",
        stats.samples_read,
        stats.decode_errors,
        stats.connect_attempts,
        stats.connect_failures,
        stats.io_faults,
        stats.dropped_oldest,
        stats.discarded_at_stop
    );
    stats
}

async fn try_connect(
    source: &mut dyn SensorSource,
    stats: &mut ReaderStats,
    shutdown: &mut ShutdownSignal,
) {
    stats.connect_attempts += 1;

    let result = tokio::select! {
        _ = shutdown.stopped() => return,
        result = source.connect() => result,
    };

    match result {
        Ok(()) => log::info!("Connected to {}", source.describe()),
        Err(e) => {
            stats.connect_failures += 1;
            log::warn!(
                "Connect to {} failed ({}), retrying in {:?}",
                source.describe(),
                e,
                source.backoff()
            );
            source.enter_backoff();
        }
    }
}
