//! Snapshot persistence: one immutable parquet file per dataset plus a
//! generation manifest.
//!
//! Every generation is written into its own `gen-<id>/` directory. Nothing in
//! that directory is visible until the manifest, replaced in one rename, names
//! it; reads of generation snapshots resolve through the manifest. A failure
//! anywhere before that rename removes the directory and leaves the published
//! generation as it was. Standalone snapshots live at the store root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::{AggregateKind, SnapshotGroup};
use crate::constants::columns::N_DECISIONS;
use crate::constants::snapshot::{
    EXTENSION, GENERATION_DIR_PREFIX, MANIFEST_FILENAME, RETAINED_GENERATIONS,
};
use crate::errors::MonitorError;
use crate::frame::Dataset;
use crate::hash::dataset_fingerprint;
use crate::transport::fs::{commit_staged, discard_staged, write_atomic, write_staged};
use crate::types::{GenerationId, SnapshotName};

/// Parquet encoding of datasets.
pub mod codec;

pub use codec::SnapshotFile;

/// Manifest line describing one snapshot of a generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: SnapshotName,
    /// File path relative to the store root.
    pub file: String,
    pub rows: usize,
    /// Sum of `n_decisions`, when the dataset has that column.
    pub total_decisions: Option<i64>,
    /// Content fingerprint of the dataset.
    pub fingerprint: u64,
}

/// Description of the complete generation currently published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub generation: GenerationId,
    /// Generation directory relative to the store root.
    pub directory: String,
    pub created_at: DateTime<Utc>,
    pub snapshots: Vec<SnapshotEntry>,
}

impl GenerationManifest {
    /// Entry for `name`, if part of this generation.
    pub fn entry(&self, name: &str) -> Option<&SnapshotEntry> {
        self.snapshots.iter().find(|entry| entry.name == name)
    }
}

/// True for names made of `[a-z0-9_]`.
pub fn is_valid_snapshot_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

fn snapshot_error(name: &str, err: impl std::fmt::Display) -> MonitorError {
    MonitorError::Snapshot {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

fn generation_dir_name(generation: GenerationId) -> String {
    format!("{GENERATION_DIR_PREFIX}{generation}")
}

fn generation_of_dir(name: &str) -> Option<GenerationId> {
    name.strip_prefix(GENERATION_DIR_PREFIX)?.parse().ok()
}

/// Directory of snapshot files and their generation manifest.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(name: &str) -> Result<String, MonitorError> {
        if !is_valid_snapshot_name(name) {
            return Err(snapshot_error(name, "snapshot names must match [a-z0-9_]+"));
        }
        Ok(format!("{name}.{EXTENSION}"))
    }

    /// Path of the standalone snapshot `name` at the store root.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, MonitorError> {
        Ok(self.root.join(Self::file_name(name)?))
    }

    /// Path `name` is read from: its file in the published generation when
    /// listed there, the standalone file otherwise.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, MonitorError> {
        let standalone = self.path_for(name)?;
        Ok(match self.manifest()?.as_ref().and_then(|manifest| manifest.entry(name)) {
            Some(entry) => self.root.join(&entry.file),
            None => standalone,
        })
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILENAME)
    }

    /// True when a readable file for `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn write_into(
        &self,
        dir: &Path,
        name: &str,
        dataset: &Dataset,
        generation: Option<GenerationId>,
    ) -> Result<(), MonitorError> {
        let target = dir.join(Self::file_name(name)?);
        let staging = write_staged(&target, |file| codec::encode(file, dataset, generation))
            .map_err(|err| snapshot_error(name, err))?;
        if let Err(err) = commit_staged(&staging, &target) {
            discard_staged([staging.as_path()]);
            return Err(snapshot_error(name, err));
        }
        Ok(())
    }

    /// Atomically replace one standalone snapshot.
    ///
    /// The file carries no generation stamp, so caches never pin it.
    pub fn write(&self, name: &str, dataset: &Dataset) -> Result<(), MonitorError> {
        self.write_into(&self.root, name, dataset, None)
    }

    /// Read snapshot `name` with its generation stamp.
    pub fn read_file(&self, name: &str) -> Result<SnapshotFile, MonitorError> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(snapshot_error(name, format!("{} not found", path.display())));
        }
        codec::decode(&path).map_err(|err| snapshot_error(name, err))
    }

    /// Read snapshot `name`.
    pub fn read(&self, name: &str) -> Result<Dataset, MonitorError> {
        Ok(self.read_file(name)?.dataset)
    }

    /// Current generation manifest; `None` before the first generation write.
    pub fn manifest(&self) -> Result<Option<GenerationManifest>, MonitorError> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let manifest = serde_json::from_slice(&bytes)
            .map_err(|err| snapshot_error(MANIFEST_FILENAME, format!("invalid manifest: {err}")))?;
        Ok(Some(manifest))
    }

    /// Current generation id; 0 before the first generation write.
    pub fn current_generation(&self) -> Result<GenerationId, MonitorError> {
        Ok(self.manifest()?.map(|manifest| manifest.generation).unwrap_or(0))
    }

    /// Publish the whole snapshot set as one new generation.
    ///
    /// Snapshots are written into a fresh generation directory and become
    /// visible together when the manifest is replaced. Any failure before that
    /// removes the directory; the previous generation stays published and
    /// unmodified.
    pub fn write_generation(
        &self,
        datasets: &IndexMap<SnapshotName, Dataset>,
    ) -> Result<GenerationManifest, MonitorError> {
        let started = Instant::now();
        let generation = self.current_generation()? + 1;
        let directory = generation_dir_name(generation);
        let dir = self.root.join(&directory);
        if dir.exists() {
            debug!(
                "[judilibre:snapshot] clearing leftover directory {}",
                dir.display()
            );
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        match self.publish(generation, &directory, datasets) {
            Ok(manifest) => {
                self.prune_generations(generation);
                info!(
                    "[judilibre:snapshot] generation {} written ({} snapshot(s)) in {:.2}s",
                    generation,
                    manifest.snapshots.len(),
                    started.elapsed().as_secs_f64()
                );
                Ok(manifest)
            }
            Err(err) => {
                warn!(
                    "[judilibre:snapshot] generation {} aborted: {}",
                    generation, err
                );
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    debug!(
                        "[judilibre:snapshot] could not remove {}: {}",
                        dir.display(),
                        cleanup
                    );
                }
                Err(err)
            }
        }
    }

    fn publish(
        &self,
        generation: GenerationId,
        directory: &str,
        datasets: &IndexMap<SnapshotName, Dataset>,
    ) -> Result<GenerationManifest, MonitorError> {
        let dir = self.root.join(directory);
        let mut entries = Vec::with_capacity(datasets.len());
        for (name, dataset) in datasets {
            self.write_into(&dir, name, dataset, Some(generation))?;
            entries.push(SnapshotEntry {
                name: name.clone(),
                file: format!("{directory}/{name}.{EXTENSION}"),
                rows: dataset.len(),
                total_decisions: dataset.total(N_DECISIONS).ok(),
                fingerprint: dataset_fingerprint(dataset),
            });
        }

        let manifest = GenerationManifest {
            generation,
            directory: directory.to_string(),
            created_at: Utc::now(),
            snapshots: entries,
        };
        let bytes = serde_json::to_vec_pretty(&manifest).map_err(|err| {
            snapshot_error(MANIFEST_FILENAME, format!("failed encoding manifest: {err}"))
        })?;
        write_atomic(&self.manifest_path(), &bytes)?;
        Ok(manifest)
    }

    /// Best-effort removal of generation directories older than the retained window.
    fn prune_generations(&self, current: GenerationId) {
        let Ok(listing) = fs::read_dir(&self.root) else {
            return;
        };
        for entry in listing.filter_map(Result::ok) {
            let name = entry.file_name();
            let Some(generation) = name.to_str().and_then(generation_of_dir) else {
                continue;
            };
            if generation + RETAINED_GENERATIONS <= current
                && let Err(err) = fs::remove_dir_all(entry.path())
            {
                debug!(
                    "[judilibre:snapshot] could not prune {}: {}",
                    entry.path().display(),
                    err
                );
            }
        }
    }

    /// Read every aggregate snapshot of `group`, in catalogue order.
    pub fn read_group(
        &self,
        group: SnapshotGroup,
    ) -> Result<IndexMap<SnapshotName, Dataset>, MonitorError> {
        AggregateKind::ALL
            .into_iter()
            .filter(|kind| kind.group() == group)
            .map(|kind| {
                let name = kind.snapshot_name();
                Ok((name.to_string(), self.read(name)?))
            })
            .collect()
    }
}
