//! Error types for the collector pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Why a sensor state file could not be turned into an update
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not a JSON object; usually a sensor caught mid-write
    #[error("malformed sensor data: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("sensor \"{sensor}\" used invalid state value \"{value}\"")]
    UnknownState { sensor: String, value: String },
}

impl ParseError {
    /// Transient failures are retried on the next change notification
    pub fn is_transient(&self) -> bool {
        matches!(self, ParseError::MalformedInput(_))
    }
}

/// Failure reported by a [`crate::WatchRegistry`]
#[derive(Debug, Error)]
#[error("failed to watch {}: {source}", path.display())]
pub struct WatchError {
    pub path: PathBuf,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl WatchError {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}
