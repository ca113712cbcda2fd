//! Sink Module - Record Persistence
//!
//! The consumer task is the only writer. Every scored record goes to
//! `append_record`; anomalous ones additionally go to `raise_alert`.
//! Neither call retries internally.

pub mod csv;

pub use self::csv::{sensor_data_path, CsvSink};

use crate::logic::error::SinkError;
use crate::logic::scoring::ScoredRecord;

pub trait Sink: Send {
    /// Append to the per-machine record file.
    fn append_record(&mut self, record: &ScoredRecord) -> Result<(), SinkError>;

    /// Append to the alerts file and overwrite the latest-alert snapshot.
    fn raise_alert(&mut self, record: &ScoredRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;
}
