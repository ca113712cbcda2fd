//! Mock Source - synthetic readings when no device is attached
//!
//! Same contract as the device: connecting always succeeds and one sample is
//! produced per cadence tick. Derived fields are computed at generation time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use super::types::{mechanical_power, ConnectionState, RawSample, ReadOutcome};
use super::SensorSource;
use crate::logic::error::SourceError;

pub struct MockSource {
    machine_id: String,
    interval: Duration,
    state: ConnectionState,
    next_at: Option<Instant>,
    rng: StdRng,
}

impl MockSource {
    pub fn new(machine_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            machine_id: machine_id.into(),
            interval,
            state: ConnectionState::Disconnected,
            next_at: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

/// One plausible reading. Ranges sit slightly wider than the normal operating
/// ranges so that anomalies show up now and then.
pub fn synthesize<R: Rng>(rng: &mut R, machine_id: &str, at: DateTime<Utc>) -> RawSample {
    let air_temp = rng.gen_range(290..=310) as f64;
    let process_temp = rng.gen_range(290..=330) as f64;
    let rotation_speed = rng.gen_range(950..=3050) as f64;
    let torque = rng.gen_range(5..=75) as f64;

    RawSample {
        machine_id: machine_id.to_string(),
        timestamp: at,
        temperature: round2(rng.gen_range(45.0..95.0)),
        vibration: round2(rng.gen_range(0.05..5.5)),
        pressure: round2(rng.gen_range(0.75..1.25)),
        rpm: rotation_speed,
        tool_wear: Some(rng.gen_range(0..=300) as f64),
        air_temp: Some(air_temp),
        process_temp: Some(process_temp),
        rotation_speed: Some(rotation_speed),
        torque: Some(torque),
        temp_diff: Some(process_temp - air_temp),
        power: Some(mechanical_power(rotation_speed, torque)),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[async_trait]
impl SensorSource for MockSource {
    fn describe(&self) -> String {
        format!("mock generator ({:?} cadence)", self.interval)
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn backoff(&self) -> Duration {
        self.interval
    }

    fn enter_backoff(&mut self) {
        self.state = ConnectionState::Backoff;
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn read_next(&mut self) -> Result<ReadOutcome, SourceError> {
        let now = Instant::now();
        let due = *self.next_at.get_or_insert(now);
        if due > now {
            tokio::time::sleep_until(due).await;
        }
        self.next_at = Some(due + self.interval);

        let sample = synthesize(&mut self.rng, &self.machine_id, Utc::now());
        Ok(ReadOutcome::Sample(sample))
    }

    async fn close(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.next_at = None;
    }
}
