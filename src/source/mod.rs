//! Raw decision and taxonomy inputs.
//!
//! Ownership model:
//! - `DecisionSource` is the pipeline-facing interface that yields one raw batch.
//! - `BatchSource` reads a batch file or a directory of batch files from disk.
//! - `InMemorySource` serves prebuilt rows for tests and demos.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::data::{RawBatch, RawDecision};
use crate::errors::MonitorError;
use crate::transport::fs::list_batch_files;

/// Raw batch file readers and writers.
pub mod batch;
/// Raw date parsing.
pub mod dates;
/// Taxonomy reference loader.
pub mod taxonomy;

pub use batch::{read_batch_file, write_jsonl_batch};
pub use dates::{parse_date_text, parse_raw_date};
pub use taxonomy::load_taxonomy;

/// Pipeline-facing source of raw decisions.
///
/// For a fixed input state, `load` returns the same rows in the same order;
/// the order defines which row "comes first" for deduplication.
pub trait DecisionSource: Send + Sync {
    /// Stable source identifier used in logs.
    fn id(&self) -> &str;
    /// Load the complete raw batch.
    fn load(&self) -> Result<RawBatch, MonitorError>;
}

/// On-disk raw batch: a single file or a directory of batch files.
///
/// Directory batches are concatenated in lexicographic path order.
pub struct BatchSource {
    id: String,
    root: PathBuf,
}

impl BatchSource {
    /// Source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: root.display().to_string(),
            root,
        }
    }

    /// Batch file or directory this source reads.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DecisionSource for BatchSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<RawBatch, MonitorError> {
        let started = Instant::now();
        let files = list_batch_files(&self.root)?;
        let mut batch = RawBatch::default();
        for file in &files {
            batch.extend(read_batch_file(file)?);
        }
        info!(
            "[judilibre:source] loaded {} raw row(s) from {} file(s) under {} in {:.2}s",
            batch.len(),
            files.len(),
            self.root.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(batch)
    }
}

/// In-memory source for tests and small datasets.
pub struct InMemorySource {
    id: String,
    decisions: Arc<Vec<RawDecision>>,
}

impl InMemorySource {
    /// Create an in-memory source from prebuilt rows.
    pub fn new(id: impl Into<String>, decisions: Vec<RawDecision>) -> Self {
        Self {
            id: id.into(),
            decisions: Arc::new(decisions),
        }
    }
}

impl DecisionSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn load(&self) -> Result<RawBatch, MonitorError> {
        Ok(RawBatch::from_decisions(self.decisions.as_ref().clone()))
    }
}
