//! Bounded sample channel
//!
//! The only hand-off between the reader task and the consumer task: one
//! producer, one consumer, FIFO, fixed capacity. What happens when the queue
//! is full is decided by [`BackpressurePolicy`].

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::logic::error::ChannelClosed;
use crate::logic::sensor::RawSample;

/// Overflow behaviour of a full channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// The producer waits for space. No sample is lost; the device side
    /// stops being read while the consumer catches up.
    #[default]
    Block,
    /// The oldest queued sample is discarded to admit the new one.
    DropOldest,
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "block" => Ok(BackpressurePolicy::Block),
            "drop-oldest" => Ok(BackpressurePolicy::DropOldest),
            other => Err(format!(
                "unknown backpressure policy '{}' (expected 'block' or 'drop-oldest')",
                other
            )),
        }
    }
}

/// What `send` did with the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Delivered after evicting the oldest queued sample.
    DroppedOldest,
}

/// What `recv_timeout` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RecvOutcome {
    Sample(RawSample),
    Timeout,
    /// Producer gone and queue empty.
    Closed,
}

struct Shared {
    queue: Mutex<VecDeque<RawSample>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.not_empty.notify_one();
        self.not_full.notify_one();
    }
}

/// Create a channel holding at most `capacity` samples.
///
/// # Panics
///
/// Panics if `capacity` is zero; configuration rejects that earlier.
pub fn bounded(capacity: usize, policy: BackpressurePolicy) -> (SampleSender, SampleReceiver) {
    assert!(capacity > 0, "channel capacity must be at least 1");

    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        not_empty: Notify::new(),
        not_full: Notify::new(),
        closed: AtomicBool::new(false),
    });

    (
        SampleSender {
            shared: Arc::clone(&shared),
            policy,
        },
        SampleReceiver { shared },
    )
}

/// Producer half. Dropping it closes the channel.
pub struct SampleSender {
    shared: Arc<Shared>,
    policy: BackpressurePolicy,
}

impl SampleSender {
    /// Enqueue a sample, applying the backpressure policy when full.
    ///
    /// Cancel-safe: if the future is dropped while waiting for space the
    /// sample is simply not admitted.
    pub async fn send(&self, sample: RawSample) -> Result<SendOutcome, ChannelClosed> {
        let mut sample = Some(sample);

        loop {
            {
                let mut queue = self.shared.queue.lock();
                if self.shared.closed.load(Ordering::SeqCst) {
                    return Err(ChannelClosed);
                }

                if queue.len() < self.shared.capacity {
                    if let Some(s) = sample.take() {
                        queue.push_back(s);
                    }
                    self.shared.not_empty.notify_one();
                    return Ok(SendOutcome::Delivered);
                }

                if self.policy == BackpressurePolicy::DropOldest {
                    queue.pop_front();
                    if let Some(s) = sample.take() {
                        queue.push_back(s);
                    }
                    self.shared.not_empty.notify_one();
                    return Ok(SendOutcome::DroppedOldest);
                }
            }

            // A pop between unlock and here leaves a stored permit
            self.shared.not_full.notified().await;
        }
    }
}

impl Drop for SampleSender {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Consumer half. Dropping it closes the channel and wakes a blocked producer.
pub struct SampleReceiver {
    shared: Arc<Shared>,
}

impl SampleReceiver {
    /// Wait up to `timeout` for the next sample.
    pub async fn recv_timeout(&self, timeout: Duration) -> RecvOutcome {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.try_recv() {
                Some(sample) => return RecvOutcome::Sample(sample),
                None if self.shared.closed.load(Ordering::SeqCst) => {
                    // Recheck: a final send may have raced with close
                    return match self.try_recv() {
                        Some(sample) => RecvOutcome::Sample(sample),
                        None => RecvOutcome::Closed,
                    };
                }
                None => {}
            }

            if tokio::time::timeout_at(deadline, self.shared.not_empty.notified())
                .await
                .is_err()
            {
                return match self.try_recv() {
                    Some(sample) => RecvOutcome::Sample(sample),
                    None => RecvOutcome::Timeout,
                };
            }
        }
    }

    /// Pop without waiting.
    pub fn try_recv(&self) -> Option<RawSample> {
        let sample = self.shared.queue.lock().pop_front();
        if sample.is_some() {
            self.shared.not_full.notify_one();
        }
        sample
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Drop for SampleReceiver {
    fn drop(&mut self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: u32) -> RawSample {
        RawSample::new("m1", 70.0, 1.0, 1.0, n as f64)
    }

    fn rpm(outcome: RecvOutcome) -> f64 {
        match outcome {
            RecvOutcome::Sample(s) => s.rpm,
            other => panic!("expected sample, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, rx) = bounded(8, BackpressurePolicy::Block);
        for n in 0..5 {
            assert_eq!(tx.send(sample(n)).await, Ok(SendOutcome::Delivered));
        }

        for n in 0..5 {
            assert_eq!(rpm(rx.recv_timeout(Duration::from_millis(10)).await), n as f64);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_without_data() {
        let (_tx, rx) = bounded(4, BackpressurePolicy::Block);
        let started = tokio::time::Instant::now();

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).await, RecvOutcome::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_front() {
        let (tx, rx) = bounded(2, BackpressurePolicy::DropOldest);
        tx.send(sample(1)).await.unwrap();
        tx.send(sample(2)).await.unwrap();
        assert_eq!(tx.send(sample(3)).await, Ok(SendOutcome::DroppedOldest));
        assert_eq!(rx.len(), 2);

        assert_eq!(rpm(rx.recv_timeout(Duration::from_millis(10)).await), 2.0);
        assert_eq!(rpm(rx.recv_timeout(Duration::from_millis(10)).await), 3.0);
    }

    #[tokio::test]
    async fn test_block_waits_for_space() {
        let (tx, rx) = bounded(1, BackpressurePolicy::Block);
        tx.send(sample(1)).await.unwrap();

        let producer = tokio::spawn(async move {
            tx.send(sample(2)).await.unwrap();
            tx
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(rx.len(), 1);

        assert_eq!(rpm(rx.recv_timeout(Duration::from_millis(10)).await), 1.0);
        let _tx = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rpm(rx.recv_timeout(Duration::from_millis(10)).await), 2.0);
    }

    #[tokio::test]
    async fn test_closed_after_sender_drop_drains_first() {
        let (tx, rx) = bounded(4, BackpressurePolicy::Block);
        tx.send(sample(7)).await.unwrap();
        drop(tx);

        assert_eq!(rpm(rx.recv_timeout(Duration::from_millis(10)).await), 7.0);
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)).await, RecvOutcome::Closed);
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_drop() {
        let (tx, rx) = bounded(1, BackpressurePolicy::Block);
        tx.send(sample(1)).await.unwrap();

        let producer = tokio::spawn(async move { tx.send(sample(2)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(rx);

        let result = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(ChannelClosed));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("block".parse::<BackpressurePolicy>(), Ok(BackpressurePolicy::Block));
        assert_eq!(
            "Drop_Oldest".parse::<BackpressurePolicy>(),
            Ok(BackpressurePolicy::DropOldest)
        );
        assert!("lossy".parse::<BackpressurePolicy>().is_err());
    }
}
