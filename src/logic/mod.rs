//! Logic Module - Engines
//!
//! ## Architecture
//! - `sensor/` - source reader (device, mock, reconnect/backoff)
//! - `channel` - bounded hand-off between reader and consumer
//! - `scoring/` - anomaly rules and the optional classifier
//! - `sink/` - record and alert persistence
//! - `pipeline/` - consumer loop, lifecycle, shutdown
//! - `monitor/` - change detection on the record file
//! - `table`, `report` - CSV reading and the historical report

pub mod channel;
pub mod config;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod sensor;
pub mod sink;
pub mod table;
