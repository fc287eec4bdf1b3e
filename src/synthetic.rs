//! Deterministic fake raw batches for demos and tests.

use std::path::Path;

use chrono::NaiveDate;
use rand::seq::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::aggregation::PUBLICATION_FLAGS;
use crate::data::{RawBatch, RawDate, RawDecision, TaxonomyEntry};
use crate::errors::MonitorError;
use crate::hash::stable_hash_str;
use crate::reference::{CHAMBERS_CA, CHAMBERS_CC, DECISION_TYPES, FORMATIONS_CC, LOCATIONS_CA};
use crate::source::write_jsonl_batch;

/// Taxonomy codes whose first digit is below this get a synthetic taxonomy entry.
const COVERED_LEVEL1_DIGITS: u32 = 5;

/// Shape of a synthetic raw batch.
#[derive(Clone, Debug)]
pub struct SyntheticBatch {
    /// Appeal-court rows.
    pub appeal_rows: usize,
    /// Highest-court rows.
    pub cassation_rows: usize,
    /// Extra rows re-emitting earlier identifiers, appended at the end.
    pub duplicate_rows: usize,
    pub seed: u64,
}

impl Default for SyntheticBatch {
    fn default() -> Self {
        Self {
            appeal_rows: 1_000,
            cassation_rows: 1_000,
            duplicate_rows: 0,
            seed: 7,
        }
    }
}

impl SyntheticBatch {
    /// Generate the rows: appeal rows, then highest-court rows, then duplicates.
    pub fn generate(&self) -> Vec<RawDecision> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut decisions = Vec::with_capacity(self.appeal_rows + self.cassation_rows + self.duplicate_rows);
        for index in 0..self.appeal_rows {
            decisions.push(self.appeal_row(&mut rng, index));
        }
        for index in 0..self.cassation_rows {
            decisions.push(self.cassation_row(&mut rng, index));
        }
        let originals = decisions.len();
        if originals > 0 {
            for index in 0..self.duplicate_rows {
                let mut duplicate = decisions[index % originals].clone();
                duplicate.decision_type = Some(random_code(&mut rng, DECISION_TYPES.entries()));
                decisions.push(duplicate);
            }
        }
        decisions
    }

    /// Generate the rows wrapped as a batch.
    pub fn batch(&self) -> RawBatch {
        RawBatch::from_decisions(self.generate())
    }

    /// Generate the rows and write them as a JSONL batch file.
    pub fn write_jsonl(&self, path: &Path) -> Result<Vec<RawDecision>, MonitorError> {
        let decisions = self.generate();
        write_jsonl_batch(path, &decisions)?;
        Ok(decisions)
    }

    /// Taxonomy entries for every code this generator can emit under digit 5.
    pub fn taxonomy(&self) -> Vec<TaxonomyEntry> {
        let mut entries = Vec::new();
        for first in 0..COVERED_LEVEL1_DIGITS {
            for second in 0..10 {
                for letter in 'A'..='Z' {
                    entries.push(TaxonomyEntry {
                        code: format!("{first}{second}{letter}"),
                        level1_code: Some(first.to_string()),
                        level1_label: Some(format!("Famille {first}")),
                        level2_label: Some(format!("Sous-famille {first}{second}")),
                        title: Some(format!("Intitulé {first}{second}{letter}")),
                    });
                }
            }
        }
        entries
    }

    fn identifier(&self, prefix: &str, index: usize) -> String {
        format!("{:016x}", stable_hash_str(self.seed, &format!("{prefix}-{index}")))
    }

    fn appeal_row(&self, rng: &mut StdRng, index: usize) -> RawDecision {
        let (decision_date, update_date) = date_pair(rng);
        let source = if rng.random_bool(0.2) { "dila" } else { "jurica" };
        let nac = format!(
            "{}{}{}",
            rng.random_range(0..10),
            rng.random_range(0..10),
            char::from(b'A' + rng.random_range(0..26u8))
        );
        RawDecision {
            id: Some(self.identifier("ca", index)),
            source: Some(source.to_string()),
            jurisdiction: Some("ca".to_string()),
            chamber: Some(random_code(rng, CHAMBERS_CA.entries())),
            formation: None,
            number: Some(self.identifier("ca-number", index)),
            location: Some(random_code(rng, LOCATIONS_CA.entries())),
            decision_date: Some(decision_date),
            update_date: Some(update_date),
            decision_type: Some(random_code(rng, DECISION_TYPES.entries())),
            nac: Some(nac),
            publication: None,
        }
    }

    fn cassation_row(&self, rng: &mut StdRng, index: usize) -> RawDecision {
        let (decision_date, update_date) = date_pair(rng);
        let source = if rng.random_bool(0.2) { "dila" } else { "jurinet" };
        let formation = if rng.random_bool(0.9) {
            Some(random_code(rng, FORMATIONS_CC.entries()))
        } else {
            None
        };
        let flag_count = rng.random_range(0..=2);
        let publication: String = (0..flag_count)
            .filter_map(|_| PUBLICATION_FLAGS.choose(rng).copied())
            .collect();
        RawDecision {
            id: Some(self.identifier("cc", index)),
            source: Some(source.to_string()),
            jurisdiction: Some("cc".to_string()),
            chamber: Some(random_code(rng, CHAMBERS_CC.entries())),
            formation,
            number: Some(self.identifier("cc-number", index)),
            location: None,
            decision_date: Some(decision_date),
            update_date: Some(update_date),
            decision_type: Some(random_code(rng, DECISION_TYPES.entries())),
            nac: None,
            publication: Some(publication),
        }
    }
}

fn random_code(rng: &mut StdRng, entries: &[(&str, &str)]) -> String {
    entries
        .choose(rng)
        .map(|(code, _)| code.to_string())
        .unwrap_or_default()
}

fn random_date(rng: &mut StdRng) -> NaiveDate {
    let year = 1970 + rng.random_range(0..50);
    let month = rng.random_range(1..=12);
    let day = rng.random_range(1..=28);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Two draws: the earlier is the decision date, the later the update date.
fn date_pair(rng: &mut StdRng) -> (RawDate, RawDate) {
    let first = random_date(rng);
    let second = random_date(rng);
    let (decision, update) = if first <= second { (first, second) } else { (second, first) };
    (
        RawDate::Text(decision.format("%Y-%m-%d").to_string()),
        RawDate::Text(update.format("%Y-%m-%d").to_string()),
    )
}
