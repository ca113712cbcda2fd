//! Orchestrator
//!
//! Owns the channel, the sink and the lifecycle. One task reads, one task
//! consumes, an optional third watches the output file; this task supervises
//! and joins them within the grace period once a stop is requested.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::shutdown::{grace_deadline, join_with_grace, ShutdownCoordinator, ShutdownSignal};
use crate::logic::channel::{bounded, RecvOutcome, SampleReceiver};
use crate::logic::config::PipelineConfig;
use crate::logic::monitor::{run_monitor, ChangeDetectionMonitor, MonitorStats};
use crate::logic::scoring::AnomalyScorer;
use crate::logic::sensor::{
    run_reader, DeviceSource, Endpoint, MockSource, RawSample, ReaderStats, SensorSource,
};
use crate::logic::sink::Sink;

/// Counters returned by the consumer task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub scored: u64,
    pub anomalies: u64,
    pub alerts: u64,
    pub predicted_failures: u64,
    pub sink_errors: u64,
    pub classifier_errors: u64,
    /// Scored after the stop signal
    pub drained: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    pub poll_timeout: Duration,
    /// Upper bound on draining queued samples after a stop
    pub drain_grace: Duration,
}

/// Score and persist one sample. Failures are logged and counted only.
fn process(sample: RawSample, scorer: &AnomalyScorer, sink: &mut dyn Sink, stats: &mut ConsumerStats) {
    let record = scorer.score(sample);
    stats.scored += 1;

    if let Err(e) = sink.append_record(&record) {
        stats.sink_errors += 1;
        log::error!("Failed to persist record for {}: {}", record.machine_id(), e);
    }

    if record.anomaly_detected {
        stats.anomalies += 1;
        match sink.raise_alert(&record) {
            Ok(()) => stats.alerts += 1,
            Err(e) => {
                stats.sink_errors += 1;
                log::error!("Failed to raise alert for {}: {}", record.machine_id(), e);
            }
        }
    }

    if record.predicts_failure() {
        stats.predicted_failures += 1;
        log::warn!(
            "Failure predicted for {} (score {:.2})",
            record.machine_id(),
            record.prediction.map(|p| p.prediction_score).unwrap_or_default()
        );
    } else {
        log::debug!(
            "{} T={:.1} V={:.2} P={:.2} RPM={:.0} anomaly={}",
            record.machine_id(),
            record.sample.temperature,
            record.sample.vibration,
            record.sample.pressure,
            record.sample.rpm,
            record.anomaly_detected
        );
    }
}

/// Consume → score → persist until stopped or the reader is gone.
///
/// The poll timeout bounds how long a stop goes unnoticed. After a stop the
/// samples already queued are still processed, up to `drain_grace`.
pub async fn run_consumer(
    rx: SampleReceiver,
    scorer: AnomalyScorer,
    mut sink: Box<dyn Sink>,
    settings: ConsumerSettings,
    shutdown: ShutdownSignal,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    log::info!(
        "Consumer started (capacity {}, classifier: {})",
        rx.capacity(),
        if scorer.has_classifier() { "on" } else { "off" }
    );

    while !shutdown.is_stopping() {
        match rx.recv_timeout(settings.poll_timeout).await {
            RecvOutcome::Sample(sample) => process(sample, &scorer, sink.as_mut(), &mut stats),
            RecvOutcome::Timeout => continue,
            RecvOutcome::Closed => {
                log::info!("Reader closed the channel");
                break;
            }
        }
    }

    let deadline = Instant::now() + settings.drain_grace;
    while let Some(sample) = rx.try_recv() {
        if Instant::now() >= deadline {
            log::warn!("Drain grace exceeded, {} samples left unscored", rx.len() + 1);
            break;
        }
        process(sample, &scorer, sink.as_mut(), &mut stats);
        stats.drained += 1;
    }

    if let Err(e) = sink.flush() {
        stats.sink_errors += 1;
        log::error!("Final sink flush failed: {}", e);
    }
    drop(sink);

    stats.classifier_errors = scorer.classifier_errors();
    log::info!(
        "Consumer stopped: {} scored ({} drained), {} anomalies, {} alerts, {} sink errors, {} classifier errors",
        stats.scored,
        stats.drained,
        stats.anomalies,
        stats.alerts,
        stats.sink_errors,
        stats.classifier_errors
    );
    stats
}

/// Pick the sample source.
///
/// Device mode makes one connect attempt here; if it fails the run degrades
/// to the synthetic generator.
pub async fn select_source(config: &PipelineConfig) -> Box<dyn SensorSource> {
    let mock = || -> Box<dyn SensorSource> {
        Box::new(MockSource::new(config.machine_id.clone(), config.mock_interval))
    };

    if config.use_mock {
        log::info!("Mock mode: generating synthetic readings");
        return mock();
    }

    let endpoint = Endpoint::parse(&config.sensor_port);
    let mut device = DeviceSource::new(endpoint, config.machine_id.clone())
        .with_read_timeout(config.device_read_timeout)
        .with_backoff(config.reconnect_backoff);

    match device.connect().await {
        Ok(()) => {
            log::info!("Connected to {}", device.describe());
            Box::new(device)
        }
        Err(e) => {
            log::warn!("Could not connect to {} ({}), falling back to mock data", device.describe(), e);
            mock()
        }
    }
}

/// Final statistics of a run. A `None` task did not finish in time.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reader: Option<ReaderStats>,
    pub consumer: Option<ConsumerStats>,
    pub monitor: Option<MonitorStats>,
}

/// Owns everything a run needs.
pub struct Pipeline {
    config: PipelineConfig,
    coordinator: ShutdownCoordinator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, coordinator: ShutdownCoordinator) -> Self {
        Self { config, coordinator }
    }

    /// Run until a stop is requested, then drain and join.
    pub async fn run(
        self,
        source: Box<dyn SensorSource>,
        scorer: AnomalyScorer,
        sink: Box<dyn Sink>,
        monitor: Option<ChangeDetectionMonitor>,
    ) -> RunSummary {
        let (tx, rx) = bounded(self.config.channel_capacity, self.config.backpressure);
        log::info!(
            "Pipeline running: {} (capacity {}, policy {:?})",
            source.describe(),
            self.config.channel_capacity,
            self.config.backpressure
        );

        let reader = tokio::spawn(run_reader(source, tx, self.coordinator.signal()));

        let settings = ConsumerSettings {
            poll_timeout: self.config.poll_timeout,
            drain_grace: self.config.shutdown_grace,
        };
        let mut consumer = tokio::spawn(run_consumer(
            rx,
            scorer,
            sink,
            settings,
            self.coordinator.signal(),
        ));

        let monitor = monitor.map(|m| tokio::spawn(run_monitor(m, self.coordinator.signal())));

        let mut stop = self.coordinator.signal();
        let mut finished_early = None;
        tokio::select! {
            _ = stop.stopped() => {}
            joined = &mut consumer => {
                log::error!("Consumer exited before a stop was requested");
                finished_early = Some(joined);
            }
        }
        self.coordinator.request_stop();

        // Consumer needs up to one poll to notice, then drains
        let deadline = grace_deadline(self.config.shutdown_grace + self.config.poll_timeout);

        let reader = join_with_grace("reader", reader, deadline).await;
        let consumer = match finished_early {
            Some(Ok(stats)) => Some(stats),
            Some(Err(e)) => {
                log::error!("Consumer task failed: {}", e);
                None
            }
            None => join_with_grace("consumer", consumer, deadline).await,
        };
        let monitor = match monitor {
            Some(handle) => join_with_grace("monitor", handle, deadline).await,
            None => None,
        };

        self.coordinator.mark_stopped();
        RunSummary {
            reader,
            consumer,
            monitor,
        }
    }
}
