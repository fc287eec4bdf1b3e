use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tracing::debug;

use crate::constants::snapshot::CACHE_LOAD_ATTEMPTS;
use crate::errors::MonitorError;
use crate::frame::Dataset;
use crate::snapshot::SnapshotStore;
use crate::types::{GenerationId, SnapshotName};

/// Cache key: snapshot name plus the generation it was read from.
pub type CacheKey = (SnapshotName, GenerationId);

/// Thread-safe in-memory cache of decoded snapshots keyed by (name, generation).
///
/// Entries are only inserted when the file's generation stamp matches the
/// manifest generation observed before and after the read, so a refresh that
/// lands mid-load is never cached under the wrong generation.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<IndexMap<CacheKey, Arc<Dataset>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, IndexMap<CacheKey, Arc<Dataset>>>, MonitorError> {
        self.inner
            .read()
            .map_err(|_| MonitorError::Cache("snapshot cache poisoned".to_string()))
    }

    fn write_guard(
        &self,
    ) -> Result<RwLockWriteGuard<'_, IndexMap<CacheKey, Arc<Dataset>>>, MonitorError> {
        self.inner
            .write()
            .map_err(|_| MonitorError::Cache("snapshot cache poisoned".to_string()))
    }

    /// Cached entry for exactly (`name`, `generation`).
    pub fn get(&self, name: &str, generation: GenerationId) -> Result<Option<Arc<Dataset>>, MonitorError> {
        let guard = self.read_guard()?;
        Ok(guard.get(&(name.to_string(), generation)).cloned())
    }

    /// Snapshot `name` of the store's current generation, loading on miss.
    ///
    /// Entries of other generations are dropped first. If the generation
    /// changes while loading, the load is retried; after the last attempt the
    /// freshly read dataset is returned without being cached.
    pub fn get_or_load(&self, store: &SnapshotStore, name: &str) -> Result<Arc<Dataset>, MonitorError> {
        let mut last = None;
        for attempt in 1..=CACHE_LOAD_ATTEMPTS {
            let generation = store.current_generation()?;
            self.retain_generation(generation)?;
            if let Some(hit) = self.get(name, generation)? {
                return Ok(hit);
            }

            let file = store.read_file(name)?;
            let dataset = Arc::new(file.dataset);
            let settled = store.current_generation()?;
            if file.generation == Some(generation) && settled == generation {
                self.write_guard()?
                    .insert((name.to_string(), generation), Arc::clone(&dataset));
                return Ok(dataset);
            }
            debug!(
                "[judilibre:cache] '{}' read during generation change (attempt {}/{}, manifest {} -> {}, file {:?})",
                name, attempt, CACHE_LOAD_ATTEMPTS, generation, settled, file.generation
            );
            last = Some(dataset);
        }
        last.ok_or_else(|| MonitorError::Cache(format!("no load attempt made for '{name}'")))
    }

    /// Drop every entry not belonging to `generation`.
    pub fn retain_generation(&self, generation: GenerationId) -> Result<(), MonitorError> {
        let needs_purge = self
            .read_guard()?
            .keys()
            .any(|(_, cached)| *cached != generation);
        if needs_purge {
            self.write_guard()?
                .retain(|(_, cached), _| *cached == generation);
        }
        Ok(())
    }

    /// Remove all cached snapshots.
    pub fn invalidate(&self) -> Result<(), MonitorError> {
        self.write_guard()?.clear();
        Ok(())
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> Result<usize, MonitorError> {
        Ok(self.read_guard()?.len())
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> Result<bool, MonitorError> {
        Ok(self.read_guard()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Cell, ColumnSpec};
    use tempfile::tempdir;

    fn single(n: i64) -> IndexMap<SnapshotName, Dataset> {
        let dataset = Dataset::from_parts(
            vec![ColumnSpec::integer("n_decisions")],
            vec![vec![Cell::Integer(n)]],
        )
        .unwrap();
        let mut datasets = IndexMap::new();
        datasets.insert("source".to_string(), dataset);
        datasets
    }

    #[test]
    fn loads_once_per_generation() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        store.write_generation(&single(1)).unwrap();
        let cache = SnapshotCache::new();

        let first = cache.get_or_load(&store, "source").unwrap();
        let second = cache.get_or_load(&store, "source").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.get("source", 1).unwrap().is_some());
    }

    #[test]
    fn new_generation_replaces_cached_entries() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        store.write_generation(&single(1)).unwrap();
        let cache = SnapshotCache::new();
        cache.get_or_load(&store, "source").unwrap();

        store.write_generation(&single(2)).unwrap();
        let reloaded = cache.get_or_load(&store, "source").unwrap();
        assert_eq!(reloaded.total("n_decisions").unwrap(), 2);
        assert!(cache.get("source", 1).unwrap().is_none());
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn unstamped_snapshots_are_served_but_not_cached() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        store.write("source", &single(5)["source"]).unwrap();
        let cache = SnapshotCache::new();
        let dataset = cache.get_or_load(&store, "source").unwrap();
        assert_eq!(dataset.total("n_decisions").unwrap(), 5);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn invalidate_clears_everything() {
        let temp = tempdir().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        store.write_generation(&single(1)).unwrap();
        let cache = SnapshotCache::new();
        cache.get_or_load(&store, "source").unwrap();
        cache.invalidate().unwrap();
        assert!(cache.is_empty().unwrap());
    }
}
