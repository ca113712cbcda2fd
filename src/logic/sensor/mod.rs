//! Sensor Module - Source Reader
//!
//! Reads raw frames from a device (or synthesizes them) and feeds the bounded
//! channel. Reconnect and backoff live here and never escalate past the
//! reader task.
//!
//! ## Structure
//! - `types.rs` - RawSample, ConnectionState, ReaderStats
//! - `frame.rs` - newline-delimited JSON frame decoding
//! - `device.rs` - byte-stream device source (tty/FIFO path or TCP)
//! - `mock.rs` - synthetic generator with the same contract
//! - `reader.rs` - the reader task loop

pub mod device;
pub mod frame;
pub mod mock;
pub mod reader;
pub mod types;


use std::time::Duration;

use async_trait::async_trait;

pub use device::{DeviceSource, Endpoint};
pub use mock::MockSource;
pub use reader::run_reader;
pub use types::{ConnectionState, RawSample, ReadOutcome, ReaderStats};

use crate::logic::error::SourceError;

/// Contract shared by the device and the synthetic generator.
///
/// Transitions: `connect` moves Disconnected/Backoff → Connecting → Connected,
/// or back to Disconnected on failure. A failed `read_next` with
/// `TransientIo` leaves the source Disconnected. The reader task calls
/// `enter_backoff` before every reconnect that follows a failure.
#[async_trait]
pub trait SensorSource: Send {
    /// Human-readable endpoint for logs
    fn describe(&self) -> String;

    fn state(&self) -> ConnectionState;

    /// Delay between reconnect attempts
    fn backoff(&self) -> Duration;

    fn enter_backoff(&mut self);

    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Next sample, `NoData` on timeout, `Decode` for a bad frame (link stays
    /// up) or `TransientIo` when the link is lost.
    async fn read_next(&mut self) -> Result<ReadOutcome, SourceError>;

    /// Release the handle and go Disconnected.
    async fn close(&mut self);
}
