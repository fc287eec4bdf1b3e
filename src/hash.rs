use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::frame::Dataset;

pub fn stable_hash_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        value.hash(hasher);
    })
}

/// Content fingerprint over column specs and every cell, in row order.
pub fn dataset_fingerprint(dataset: &Dataset) -> u64 {
    stable_hash_with(|hasher| {
        for column in dataset.columns() {
            column.name.hash(hasher);
            column.kind.hash(hasher);
        }
        dataset.len().hash(hasher);
        for row in dataset.rows() {
            for cell in row {
                cell.hash(hasher);
            }
        }
    })
}
