//! Error types of the control engine

use std::path::PathBuf;

use thiserror::Error;

/// A configuration scalar outside its legal range
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        value: u64,
        min: u64,
    },
}

/// Snapshot data that does not fit the configured network shape
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("vision grid has {actual} cells, expected {width}x{height} = {expected}")]
    VisionSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
}

/// Failure to read or write a persisted file
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
