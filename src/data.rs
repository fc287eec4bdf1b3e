use std::collections::HashMap;

use chrono::NaiveDate;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::columns::{
    CHAMBER, COURT, DECISION_DATE, FORMATION, JURISDICTION, LOCATION, N_DECISIONS, NAC,
    NAC_LEVEL1_CODE, NAC_LEVEL1_LABEL, NAC_LEVEL2_LABEL, NAC_TITLE, PUBLICATION, SOURCE, TYPE,
};
use crate::errors::MonitorError;
use crate::frame::{Cell, ColumnKind, ColumnSpec, Dataset};
use crate::reference::{Category, highest_court};
use crate::utils::normalize_taxonomy_code;

pub use crate::types::{DecisionId, PublicationFlags, RawCode, TaxonomyCode};

/// Raw date as delivered upstream: a date/datetime string or epoch milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    /// Epoch milliseconds.
    Epoch(i64),
    /// Date or datetime text (`2020-01-01`, RFC 3339, ...).
    Text(String),
}

/// One decision as ingested, before any normalization.
///
/// Field decoding is lenient: scalars of any type become strings, and list
/// publication values are concatenated into a flag string.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<DecisionId>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub source: Option<RawCode>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub jurisdiction: Option<RawCode>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub chamber: Option<RawCode>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub formation: Option<RawCode>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub location: Option<RawCode>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub decision_date: Option<RawDate>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub update_date: Option<RawDate>,
    #[serde(default, rename = "type", deserialize_with = "lenient::string")]
    pub decision_type: Option<RawCode>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub nac: Option<TaxonomyCode>,
    #[serde(default, deserialize_with = "lenient::flags")]
    pub publication: Option<PublicationFlags>,
}

/// Raw decisions loaded from one or more batch files.
#[derive(Clone, Debug, Default)]
pub struct RawBatch {
    /// Decoded rows in batch order.
    pub decisions: Vec<RawDecision>,
    /// Rows that could not be decoded at all and were skipped.
    pub malformed_rows: usize,
}

impl RawBatch {
    /// Wrap already-decoded rows.
    pub fn from_decisions(decisions: Vec<RawDecision>) -> Self {
        Self {
            decisions,
            malformed_rows: 0,
        }
    }

    /// Append another batch, preserving order.
    pub fn extend(&mut self, other: RawBatch) {
        self.decisions.extend(other.decisions);
        self.malformed_rows += other.malformed_rows;
    }

    /// Number of decoded rows.
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// True when no row was decoded.
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// One row of the taxonomy reference table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    /// Taxonomy code (upper-case).
    pub code: TaxonomyCode,
    /// Level-1 family code.
    pub level1_code: Option<String>,
    /// Level-1 family label.
    pub level1_label: Option<String>,
    /// Level-2 label.
    pub level2_label: Option<String>,
    /// Long human-readable title.
    pub title: Option<String>,
}

/// Taxonomy lookup keyed by upper-cased code.
#[derive(Clone, Debug, Default)]
pub struct TaxonomyTable {
    entries: HashMap<TaxonomyCode, TaxonomyEntry>,
}

impl TaxonomyTable {
    /// Build from entries; the first entry wins for a repeated code.
    ///
    /// Returns the table and the number of ignored duplicates.
    pub fn from_entries(entries: impl IntoIterator<Item = TaxonomyEntry>) -> (Self, usize) {
        let mut map = HashMap::new();
        let mut duplicates = 0usize;
        for mut entry in entries {
            let Some(code) = normalize_taxonomy_code(Some(&entry.code)) else {
                continue;
            };
            entry.code = code.clone();
            if map.contains_key(&code) {
                duplicates += 1;
                continue;
            }
            map.insert(code, entry);
        }
        (Self { entries: map }, duplicates)
    }

    /// Entry for `code` (matched trimmed and upper-cased).
    pub fn get(&self, code: &str) -> Option<&TaxonomyEntry> {
        let code = normalize_taxonomy_code(Some(code))?;
        self.entries.get(&code)
    }

    /// Number of distinct codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table holds no code.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hierarchy fields joined from the taxonomy table; all absent when unmatched.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxonomyFields {
    pub level1_code: Option<String>,
    pub level1_label: Option<String>,
    pub level2_label: Option<String>,
    pub title: Option<String>,
}

impl TaxonomyFields {
    /// Copy the hierarchy out of a matched entry.
    pub fn from_entry(entry: &TaxonomyEntry) -> Self {
        Self {
            level1_code: entry.level1_code.clone(),
            level1_label: entry.level1_label.clone(),
            level2_label: entry.level2_label.clone(),
            title: entry.title.clone(),
        }
    }

    /// True when no hierarchy field is present.
    pub fn is_empty(&self) -> bool {
        self.level1_code.is_none()
            && self.level1_label.is_none()
            && self.level2_label.is_none()
            && self.title.is_none()
    }
}

/// One row of the canonical table: a unique combination of normalized fields
/// and the number of deduplicated raw decisions collapsing onto it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub source: Category,
    pub jurisdiction: Category,
    /// Full resolved court name.
    pub court: Category,
    /// Short display name of the court seat.
    pub location: Category,
    pub nac: Category,
    pub chamber: Category,
    pub formation: Category,
    pub decision_type: Category,
    pub decision_date: NaiveDate,
    /// Lower-cased publication flags, empty when absent.
    pub publication: PublicationFlags,
    pub taxonomy: TaxonomyFields,
    pub n_decisions: u64,
}

impl CanonicalRecord {
    /// True for rows of the single-seat highest court.
    pub fn is_highest_court(&self) -> bool {
        self.jurisdiction == highest_court()
    }
}

/// Inclusive date bounds; a missing bound is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    /// First included date.
    pub start: Option<NaiveDate>,
    /// Last included date.
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Bounded on both sides.
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Unbounded range.
    pub fn all() -> Self {
        Self::default()
    }

    /// True when `date` falls within the bounds.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// The deduplicated, relabeled, taxonomy-joined table all aggregates derive from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CanonicalTable {
    records: Vec<CanonicalRecord>,
}

impl CanonicalTable {
    /// Wrap records produced by the normalization stage.
    pub fn new(records: Vec<CanonicalRecord>) -> Self {
        Self { records }
    }

    /// Canonical rows in key order.
    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    /// Consume into rows.
    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.records
    }

    /// Number of canonical rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of `n_decisions` across all rows.
    pub fn total_decisions(&self) -> u64 {
        self.records.iter().map(|record| record.n_decisions).sum()
    }

    /// Rows matching `keep`, as a new table.
    pub fn filtered(&self, mut keep: impl FnMut(&CanonicalRecord) -> bool) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|record| keep(record))
                .cloned()
                .collect(),
        }
    }

    /// Rows whose decision date falls within `range`.
    pub fn slice(&self, range: DateRange) -> Self {
        self.filtered(|record| range.contains(record.decision_date))
    }

    /// Rows of the highest court only.
    pub fn highest_court(&self) -> Self {
        self.filtered(CanonicalRecord::is_highest_court)
    }

    /// Rows of every court below the highest court.
    pub fn lower_courts(&self) -> Self {
        self.filtered(|record| !record.is_highest_court())
    }

    /// Most recent decision date.
    pub fn latest_decision_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|record| record.decision_date).max()
    }

    /// Columns of the persisted canonical table.
    pub fn columns() -> Vec<ColumnSpec> {
        let mut columns: Vec<ColumnSpec> = [
            SOURCE,
            JURISDICTION,
            COURT,
            LOCATION,
            NAC,
            CHAMBER,
            FORMATION,
            TYPE,
        ]
        .into_iter()
        .map(ColumnSpec::text)
        .collect();
        columns.push(ColumnSpec::date(DECISION_DATE));
        columns.push(ColumnSpec::text(PUBLICATION));
        for name in [NAC_LEVEL1_CODE, NAC_LEVEL1_LABEL, NAC_LEVEL2_LABEL, NAC_TITLE] {
            columns.push(ColumnSpec::new(name, ColumnKind::OptionalText));
        }
        columns.push(ColumnSpec::integer(N_DECISIONS));
        columns
    }

    /// Columnar form, one row per canonical record.
    pub fn to_dataset(&self) -> Result<Dataset, MonitorError> {
        let mut dataset = Dataset::new(Self::columns());
        for record in &self.records {
            let taxonomy = &record.taxonomy;
            dataset.push_row(vec![
                Cell::from(&record.source),
                Cell::from(&record.jurisdiction),
                Cell::from(&record.court),
                Cell::from(&record.location),
                Cell::from(&record.nac),
                Cell::from(&record.chamber),
                Cell::from(&record.formation),
                Cell::from(&record.decision_type),
                Cell::Date(record.decision_date),
                Cell::Text(record.publication.clone()),
                Cell::from(taxonomy.level1_code.clone()),
                Cell::from(taxonomy.level1_label.clone()),
                Cell::from(taxonomy.level2_label.clone()),
                Cell::from(taxonomy.title.clone()),
                Cell::Integer(i64::try_from(record.n_decisions).unwrap_or(i64::MAX)),
            ])?;
        }
        Ok(dataset)
    }

    /// Rebuild the table from its columnar form (e.g. the `canonical` snapshot).
    pub fn from_dataset(dataset: &Dataset) -> Result<Self, MonitorError> {
        let expected = Self::columns();
        if dataset.columns() != expected.as_slice() {
            return Err(MonitorError::Schema(format!(
                "canonical columns {:?} do not match {:?}",
                dataset.column_names(),
                expected.iter().map(|column| column.name.as_str()).collect::<Vec<_>>()
            )));
        }
        let text = |cell: &Cell| Category::from_label(cell.as_text().unwrap_or_default());
        let optional = |cell: &Cell| cell.as_text().map(str::to_string);
        let records = dataset
            .rows()
            .iter()
            .map(|row| {
                let decision_date = row[8].as_date().ok_or_else(|| {
                    MonitorError::Schema("canonical row without decision date".to_string())
                })?;
                let n_decisions = row[14]
                    .as_integer()
                    .and_then(|value| u64::try_from(value).ok())
                    .ok_or_else(|| {
                        MonitorError::Schema("canonical row with invalid count".to_string())
                    })?;
                Ok(CanonicalRecord {
                    source: text(&row[0]),
                    jurisdiction: text(&row[1]),
                    court: text(&row[2]),
                    location: text(&row[3]),
                    nac: text(&row[4]),
                    chamber: text(&row[5]),
                    formation: text(&row[6]),
                    decision_type: text(&row[7]),
                    decision_date,
                    publication: row[9].as_text().unwrap_or_default().to_string(),
                    taxonomy: TaxonomyFields {
                        level1_code: optional(&row[10]),
                        level1_label: optional(&row[11]),
                        level2_label: optional(&row[12]),
                        title: optional(&row[13]),
                    },
                    n_decisions,
                })
            })
            .collect::<Result<Vec<_>, MonitorError>>()?;
        Ok(Self { records })
    }
}

mod lenient {
    use super::*;

    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(scalar_to_string))
    }

    pub fn flags<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => {
                let joined: String = items.into_iter().filter_map(scalar_to_string).collect();
                Some(joined)
            }
            Some(other) => scalar_to_string(other),
            None => None,
        })
    }

    pub fn date<'de, D>(deserializer: D) -> Result<Option<RawDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64))
                .map(RawDate::Epoch),
            Some(Value::String(text)) if !text.trim().is_empty() => Some(RawDate::Text(text)),
            _ => None,
        })
    }

    fn scalar_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}
