use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::SnapshotName;

/// Error type for input loading, snapshot persistence, and configuration failures.
///
/// Row-level data anomalies never surface here; they are absorbed by the
/// normalization stage and reported through `NormalizationReport`.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("required input {} is missing", path.display())]
    MissingInput { path: PathBuf },
    #[error("input {} could not be decoded: {reason}", path.display())]
    InputFormat { path: PathBuf, reason: String },
    #[error("snapshot '{name}' failure: {reason}")]
    Snapshot { name: SnapshotName, reason: String },
    #[error("snapshot codec failure: {0}")]
    Codec(String),
    #[error("dataset schema violation: {0}")]
    Schema(String),
    #[error("snapshot cache failure: {0}")]
    Cache(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
}
