#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Aggregation stage and aggregate catalogue.
pub mod aggregate;
/// Snapshot cache keyed by generation.
pub mod cache;
/// Pipeline configuration and environment overrides.
pub mod config;
/// Centralized constants for labels, columns, files, and persistence.
pub mod constants;
/// Raw decision, taxonomy, and canonical table types.
pub mod data;
/// Download projections re-derived from the canonical table.
pub mod export;
/// Typed columnar datasets.
pub mod frame;
mod hash;
/// Headline summary figures.
pub mod metrics;
/// Normalization stage and its data-quality report.
pub mod normalize;
/// Refresh cycle orchestration.
pub mod pipeline;
/// Code-to-label reference tables.
pub mod reference;
/// Parquet snapshot persistence and generation manifests.
pub mod snapshot;
/// Raw batch and taxonomy inputs.
pub mod source;
/// Deterministic fake raw batches.
pub mod synthetic;
/// Filesystem transport helpers.
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Code and label normalization helpers.
pub mod utils;

mod errors;

pub use aggregate::{AggregateKind, Scope, SnapshotGroup, centered_rolling_mean, compute_all};
pub use cache::SnapshotCache;
pub use config::{DuplicatePolicy, PipelineConfig};
pub use data::{
    CanonicalRecord, CanonicalTable, DateRange, RawBatch, RawDate, RawDecision, TaxonomyEntry,
    TaxonomyFields, TaxonomyTable,
};
pub use errors::MonitorError;
pub use export::ExportView;
pub use frame::{Cell, ColumnKind, ColumnSpec, Dataset};
pub use metrics::{DecisionSummary, JurisdictionShare, format_count, format_date};
pub use normalize::{NormalizationReport, Normalizer};
pub use pipeline::{Pipeline, RefreshReport};
pub use reference::{Category, Jurisdiction, ReferenceTable};
pub use snapshot::{GenerationManifest, SnapshotEntry, SnapshotFile, SnapshotStore};
pub use source::{BatchSource, DecisionSource, InMemorySource, load_taxonomy};
pub use synthetic::SyntheticBatch;
pub use types::{
    ColumnName, DecisionId, GenerationId, Label, PublicationFlags, RawCode, SnapshotName,
    TaxonomyCode,
};
