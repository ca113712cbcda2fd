//! Device Source
//!
//! Byte-stream device: a tty/FIFO path opened read-only (the Arduino case) or a
//! `tcp://host:port` bridge. Frames are newline-delimited JSON.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};

use super::frame::decode_frame;
use super::types::{ConnectionState, ReadOutcome};
use super::SensorSource;
use crate::logic::error::SourceError;

/// Upper bound on opening the endpoint
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Arduino boards reset when the port opens
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

type DeviceStream = Box<dyn AsyncRead + Send + Sync + Unpin>;
type FrameReader = Split<BufReader<DeviceStream>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Path(PathBuf),
    Tcp(String),
}

impl Endpoint {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().strip_prefix("tcp://") {
            Some(addr) => Endpoint::Tcp(addr.to_string()),
            None => Endpoint::Path(PathBuf::from(raw.trim())),
        }
    }

    /// Open the byte stream. Opening a FIFO waits for a writer, so both
    /// kinds of endpoint are bounded by the connect timeout.
    async fn open(&self) -> std::io::Result<DeviceStream> {
        let opening = async {
            let stream: DeviceStream = match self {
                Endpoint::Path(path) => Box::new(tokio::fs::OpenOptions::new().read(true).open(path).await?),
                Endpoint::Tcp(addr) => Box::new(tokio::net::TcpStream::connect(addr).await?),
            };
            Ok::<_, std::io::Error>(stream)
        };

        tokio::time::timeout(CONNECT_TIMEOUT, opening)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))?
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Path(p) => write!(f, "{}", p.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

pub struct DeviceSource {
    endpoint: Endpoint,
    machine_id: String,
    read_timeout: Duration,
    backoff: Duration,
    settle_delay: Duration,
    state: ConnectionState,
    frames: Option<FrameReader>,
}

impl DeviceSource {
    pub fn new(endpoint: Endpoint, machine_id: impl Into<String>) -> Self {
        let settle_delay = match endpoint {
            Endpoint::Path(_) => DEFAULT_SETTLE_DELAY,
            Endpoint::Tcp(_) => Duration::ZERO,
        };

        Self {
            endpoint,
            machine_id: machine_id.into(),
            read_timeout: Duration::from_millis(crate::constants::DEFAULT_DEVICE_READ_TIMEOUT_MS),
            backoff: Duration::from_secs(crate::constants::DEFAULT_RECONNECT_BACKOFF_SECS),
            settle_delay,
            state: ConnectionState::Disconnected,
            frames: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    fn drop_handle(&mut self) {
        self.frames = None;
        self.state = ConnectionState::Disconnected;
    }

    fn transient(&self, source: std::io::Error) -> SourceError {
        SourceError::TransientIo {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }
}

#[async_trait]
impl SensorSource for DeviceSource {
    fn describe(&self) -> String {
        format!("device {}", self.endpoint)
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn backoff(&self) -> Duration {
        self.backoff
    }

    fn enter_backoff(&mut self) {
        self.state = ConnectionState::Backoff;
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        self.frames = None;
        self.state = ConnectionState::Connecting;

        match self.endpoint.open().await {
            Ok(reader) => {
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                self.frames = Some(BufReader::new(reader).split(b'\n'));
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(self.transient(e))
            }
        }
    }

    async fn read_next(&mut self) -> Result<ReadOutcome, SourceError> {
        let timeout = self.read_timeout;
        let Some(frames) = self.frames.as_mut() else {
            self.state = ConnectionState::Disconnected;
            return Err(self.transient(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "device not connected",
            )));
        };

        // next_segment is cancel-safe, so a timed-out read keeps partial data
        match tokio::time::timeout(timeout, frames.next_segment()).await {
            Err(_) => Ok(ReadOutcome::NoData),
            Ok(Ok(Some(line))) => match decode_frame(&line, &self.machine_id, Utc::now())? {
                Some(sample) => Ok(ReadOutcome::Sample(sample)),
                None => Ok(ReadOutcome::NoData),
            },
            Ok(Ok(None)) => {
                self.drop_handle();
                Err(self.transient(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "device closed the stream",
                )))
            }
            Ok(Err(e)) => {
                self.drop_handle();
                Err(self.transient(e))
            }
        }
    }

    async fn close(&mut self) {
        self.drop_handle();
    }
}
