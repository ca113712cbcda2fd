//! Error taxonomy
//!
//! Retryable conditions (`SourceError`) never cross the reader boundary;
//! per-sample failures (`SinkError`, `ClassifierError`) are logged by the
//! consumer and never stop the loop. Only `PipelineError::FatalConfig` aborts
//! startup.

use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by a sensor source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Device connect/read failure. Handled with the fixed backoff.
    #[error("transient I/O on {endpoint}: {source}")]
    TransientIo {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed frame. Skipped; the connection stays open.
    #[error("malformed frame: {reason}")]
    Decode { reason: String, line: String },
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::TransientIo { .. })
    }

    pub fn decode(reason: impl Into<String>, line: impl Into<String>) -> Self {
        SourceError::Decode {
            reason: reason.into(),
            line: line.into(),
        }
    }
}

/// The receiving side of the channel is gone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("sample channel closed")]
pub struct ChannelClosed;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SinkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("failed to load classifier: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("classifier panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("alert delivery failed: {0}")]
    Alert(String),
}

impl MonitorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MonitorError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level errors. Only `FatalConfig` is raised before the run loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        PipelineError::FatalConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let io = SourceError::TransientIo {
            endpoint: "/dev/ttyACM0".into(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
        };
        assert!(io.is_retryable());
        assert!(!SourceError::decode("not json", "{oops").is_retryable());
    }

    #[test]
    fn test_fatal_config_message() {
        let err = PipelineError::fatal("no writable data directory");
        assert_eq!(
            err.to_string(),
            "fatal configuration error: no writable data directory"
        );
    }
}
