use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::env as env_keys;
use crate::constants::files::{DEFAULT_DATA_DIR, DEFAULT_RAW_BATCH, DEFAULT_TAXONOMY_FILE};
use crate::errors::MonitorError;

/// Rule applied when the raw feed carries the same identifier more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first row seen for an identifier (batch order, then row order).
    #[default]
    FirstSeen,
    /// Keep the row with the greatest update date; ties keep the earlier row.
    LatestUpdate,
}

impl FromStr for DuplicatePolicy {
    type Err = MonitorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_seen" | "first-seen" => Ok(Self::FirstSeen),
            "latest_update" | "latest-update" => Ok(Self::LatestUpdate),
            other => Err(MonitorError::Configuration(format!(
                "unknown duplicate policy '{other}' (expected first_seen or latest_update)"
            ))),
        }
    }
}

/// Top-level pipeline configuration.
///
/// Relative paths are resolved against `data_dir`.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Directory holding the raw batch, the taxonomy file, and (by default) snapshots.
    pub data_dir: PathBuf,
    /// Raw batch file, or a directory of batch files concatenated in path order.
    pub raw_batch: PathBuf,
    /// Taxonomy reference table (`.csv` or `.jsonl`).
    pub taxonomy_file: PathBuf,
    /// Snapshot directory; `None` means `data_dir`.
    pub snapshot_dir: Option<PathBuf>,
    /// Deduplication rule for repeated identifiers.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            raw_batch: PathBuf::from(DEFAULT_RAW_BATCH),
            taxonomy_file: PathBuf::from(DEFAULT_TAXONOMY_FILE),
            snapshot_dir: None,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Default layout rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Apply `JUDILIBRE_*` environment overrides on top of the defaults.
    pub fn from_env() -> Result<Self, MonitorError> {
        Self::default().with_env_overrides()
    }

    /// Apply `JUDILIBRE_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, MonitorError> {
        if let Some(value) = env_value(env_keys::DATA_DIR) {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = env_value(env_keys::RAW_BATCH) {
            self.raw_batch = PathBuf::from(value);
        }
        if let Some(value) = env_value(env_keys::TAXONOMY_FILE) {
            self.taxonomy_file = PathBuf::from(value);
        }
        if let Some(value) = env_value(env_keys::SNAPSHOT_DIR) {
            self.snapshot_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = env_value(env_keys::DUPLICATE_POLICY) {
            self.duplicate_policy = value.parse()?;
        }
        Ok(self)
    }

    /// Resolved raw batch location.
    pub fn raw_batch_path(&self) -> PathBuf {
        self.resolve(&self.raw_batch)
    }

    /// Resolved taxonomy reference location.
    pub fn taxonomy_path(&self) -> PathBuf {
        self.resolve(&self.taxonomy_file)
    }

    /// Resolved snapshot directory.
    pub fn snapshot_path(&self) -> PathBuf {
        match &self.snapshot_dir {
            Some(dir) => self.resolve(dir),
            None => self.data_dir.clone(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
