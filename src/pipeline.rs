//! Refresh cycle: load, normalize, aggregate, and persist one generation.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::compute_all;
use crate::config::PipelineConfig;
use crate::constants::snapshot::CANONICAL_SNAPSHOT;
use crate::data::CanonicalTable;
use crate::errors::MonitorError;
use crate::metrics::DecisionSummary;
use crate::normalize::{NormalizationReport, Normalizer};
use crate::snapshot::{GenerationManifest, SnapshotStore};
use crate::source::{BatchSource, DecisionSource, load_taxonomy};

/// Outcome of one successful refresh.
#[derive(Clone, Debug, Serialize)]
pub struct RefreshReport {
    pub manifest: GenerationManifest,
    pub normalization: NormalizationReport,
    pub summary: DecisionSummary,
}

/// Drives the refresh cycle for one configuration.
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open the snapshot store configured for this pipeline.
    pub fn open_store(&self) -> Result<SnapshotStore, MonitorError> {
        SnapshotStore::open(self.config.snapshot_path())
    }

    fn ensure_input(path: PathBuf) -> Result<(), MonitorError> {
        if !path.exists() {
            warn!("[judilibre:pipeline] required input {} is missing", path.display());
            return Err(MonitorError::MissingInput { path });
        }
        Ok(())
    }

    /// Source reading the configured raw batch file or directory.
    pub fn batch_source(&self) -> BatchSource {
        BatchSource::new(self.config.raw_batch_path())
    }

    /// Load the configured raw batch and taxonomy and build the canonical table.
    pub fn load_canonical(&self) -> Result<(CanonicalTable, NormalizationReport), MonitorError> {
        Self::ensure_input(self.config.raw_batch_path())?;
        self.load_canonical_from(&self.batch_source())
    }

    /// Build the canonical table from `source` and the configured taxonomy.
    pub fn load_canonical_from(
        &self,
        source: &dyn DecisionSource,
    ) -> Result<(CanonicalTable, NormalizationReport), MonitorError> {
        let taxonomy_path = self.config.taxonomy_path();
        Self::ensure_input(taxonomy_path.clone())?;
        let batch = source.load()?;
        debug!(
            "[judilibre:pipeline] source '{}' yielded {} row(s)",
            source.id(),
            batch.decisions.len()
        );
        let taxonomy = load_taxonomy(&taxonomy_path)?;
        Ok(Normalizer::new(&taxonomy, self.config.duplicate_policy).normalize(&batch))
    }

    /// Run a full refresh from the configured raw batch and publish the result
    /// as a new generation of `store`.
    ///
    /// Nothing in `store` changes unless every snapshot was computed and written.
    pub fn refresh(&self, store: &SnapshotStore) -> Result<RefreshReport, MonitorError> {
        Self::ensure_input(self.config.raw_batch_path())?;
        self.refresh_from(&self.batch_source(), store)
    }

    /// Same as [`Pipeline::refresh`], reading raw rows from `source`.
    pub fn refresh_from(
        &self,
        source: &dyn DecisionSource,
        store: &SnapshotStore,
    ) -> Result<RefreshReport, MonitorError> {
        let started = Instant::now();
        let (table, normalization) = self.load_canonical_from(source)?;

        let mut datasets = compute_all(&table)?;
        datasets.insert(CANONICAL_SNAPSHOT.to_string(), table.to_dataset()?);
        let manifest = store.write_generation(&datasets)?;
        let summary = DecisionSummary::from_table(&table);

        info!(
            "[judilibre:pipeline] refresh published generation {} ({} decision(s), {} snapshot(s)) in {:.2}s",
            manifest.generation,
            summary.total_decisions,
            manifest.snapshots.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(RefreshReport {
            manifest,
            normalization,
            summary,
        })
    }
}
