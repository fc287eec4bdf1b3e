//! Typed columnar tables shared by the aggregation, snapshot, and export layers.
//!
//! A [`Dataset`] is a small row-major table with a fixed column list. Every
//! row is checked against the column kinds on insertion, so a dataset that
//! exists is always well-formed and can be encoded without further checks.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::DateRange;
use crate::errors::MonitorError;
use crate::reference::Category;
use crate::types::ColumnName;

/// Storage type of one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Required UTF-8 text.
    Text,
    /// UTF-8 text or null.
    OptionalText,
    /// Calendar date.
    Date,
    /// Required 64-bit integer.
    Integer,
    /// 64-bit float or null.
    OptionalFloat,
}

impl ColumnKind {
    /// True when `cell` may be stored in a column of this kind.
    pub fn accepts(self, cell: &Cell) -> bool {
        matches!(
            (self, cell),
            (Self::Text, Cell::Text(_))
                | (Self::OptionalText, Cell::Text(_) | Cell::Null)
                | (Self::Date, Cell::Date(_))
                | (Self::Integer, Cell::Integer(_))
                | (Self::OptionalFloat, Cell::Float(_) | Cell::Null)
        )
    }
}

/// Name and kind of one column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: ColumnName,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<ColumnName>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<ColumnName>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn date(name: impl Into<ColumnName>) -> Self {
        Self::new(name, ColumnKind::Date)
    }

    pub fn integer(name: impl Into<ColumnName>) -> Self {
        Self::new(name, ColumnKind::Integer)
    }
}

/// One value of a [`Dataset`].
#[derive(Clone, Debug)]
pub enum Cell {
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Float(f64),
    Null,
}

impl Cell {
    fn rank(&self) -> u8 {
        match self {
            Self::Text(_) => 0,
            Self::Date(_) => 1,
            Self::Integer(_) => 2,
            Self::Float(_) => 3,
            Self::Null => 4,
        }
    }

    /// Text content, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Date content, if this is a date cell.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    /// Integer content, if this is an integer cell.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Float content, if this is a float cell.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// True for [`Cell::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Text(text) => text.hash(state),
            Self::Date(date) => date.hash(state),
            Self::Integer(value) => value.hash(state),
            Self::Float(value) => value.to_bits().hash(state),
            Self::Null => {}
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<&Category> for Cell {
    fn from(category: &Category) -> Self {
        Self::Text(category.label().to_string())
    }
}

impl From<Category> for Cell {
    fn from(category: Category) -> Self {
        Self::from(&category)
    }
}

impl From<NaiveDate> for Cell {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map(Self::Float).unwrap_or(Self::Null)
    }
}

impl From<Option<String>> for Cell {
    fn from(value: Option<String>) -> Self {
        value.map(Self::Text).unwrap_or(Self::Null)
    }
}

/// Ordered accumulator summing counts per grouping key.
#[derive(Clone, Debug)]
pub struct GroupSum<K: Ord> {
    groups: BTreeMap<K, i64>,
}

impl<K: Ord> Default for GroupSum<K> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord> GroupSum<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to the group `key`.
    pub fn add(&mut self, key: K, count: i64) {
        *self.groups.entry(key).or_insert(0) += count;
    }

    /// Number of distinct groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in ascending key order.
    pub fn into_groups(self) -> impl Iterator<Item = (K, i64)> {
        self.groups.into_iter()
    }
}

/// Row-major table with a fixed, typed column list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Empty dataset with the given columns.
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from columns and rows, validating every row.
    pub fn from_parts(columns: Vec<ColumnSpec>, rows: Vec<Vec<Cell>>) -> Result<Self, MonitorError> {
        let mut dataset = Self::new(columns);
        dataset.rows.reserve(rows.len());
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Append one row after checking its width and cell kinds.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), MonitorError> {
        if row.len() != self.columns.len() {
            return Err(MonitorError::Schema(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        for (column, cell) in self.columns.iter().zip(&row) {
            if !column.kind.accepts(cell) {
                return Err(MonitorError::Schema(format!(
                    "column '{}' of kind {:?} cannot hold {cell:?}",
                    column.name, column.kind
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stack datasets sharing one column list.
    pub fn concat(parts: &[Dataset]) -> Result<Dataset, MonitorError> {
        let Some(first) = parts.first() else {
            return Ok(Dataset::default());
        };
        let mut combined = Dataset::new(first.columns.clone());
        for part in parts {
            if part.columns != combined.columns {
                return Err(MonitorError::Schema(format!(
                    "cannot concatenate columns {:?} onto {:?}",
                    part.column_names(),
                    combined.column_names()
                )));
            }
            combined.rows.extend(part.rows.iter().cloned());
        }
        Ok(combined)
    }

    /// Position of `name`, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    fn require_column(&self, name: &str) -> Result<usize, MonitorError> {
        self.column_index(name)
            .ok_or_else(|| MonitorError::Schema(format!("unknown column '{name}'")))
    }

    fn require_kind(&self, name: &str, kinds: &[ColumnKind]) -> Result<usize, MonitorError> {
        let index = self.require_column(name)?;
        let kind = self.columns[index].kind;
        if !kinds.contains(&kind) {
            return Err(MonitorError::Schema(format!(
                "column '{name}' has kind {kind:?}, expected one of {kinds:?}"
            )));
        }
        Ok(index)
    }

    /// Cells of one column, in row order.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Cell> + '_, MonitorError> {
        let index = self.require_column(name)?;
        Ok(self.rows.iter().map(move |row| &row[index]))
    }

    /// Sum of an integer column.
    pub fn total(&self, column: &str) -> Result<i64, MonitorError> {
        let index = self.require_kind(column, &[ColumnKind::Integer])?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row[index].as_integer())
            .sum())
    }

    /// Re-group by `keys`, summing the integer column `value`.
    ///
    /// Output columns are `keys` followed by `value`, rows in ascending key order.
    pub fn rollup(&self, keys: &[&str], value: &str) -> Result<Dataset, MonitorError> {
        let key_indices = keys
            .iter()
            .map(|key| self.require_column(key))
            .collect::<Result<Vec<_>, _>>()?;
        let value_index = self.require_kind(value, &[ColumnKind::Integer])?;

        let mut groups = GroupSum::new();
        for row in &self.rows {
            let key: Vec<Cell> = key_indices.iter().map(|index| row[*index].clone()).collect();
            groups.add(key, row[value_index].as_integer().unwrap_or(0));
        }

        let mut columns: Vec<ColumnSpec> = key_indices
            .iter()
            .map(|index| self.columns[*index].clone())
            .collect();
        columns.push(self.columns[value_index].clone());
        let rows = groups
            .into_groups()
            .map(|(mut key, count)| {
                key.push(Cell::Integer(count));
                key
            })
            .collect();
        Ok(Dataset { columns, rows })
    }

    /// Rows whose date column falls within `range`.
    pub fn filter_date_range(&self, column: &str, range: DateRange) -> Result<Dataset, MonitorError> {
        let index = self.require_kind(column, &[ColumnKind::Date])?;
        Ok(self.filter_rows(|row| row[index].as_date().is_some_and(|date| range.contains(date))))
    }

    /// Rows whose text column holds one of `values`.
    pub fn retain_text_in(&self, column: &str, values: &[&str]) -> Result<Dataset, MonitorError> {
        let index = self.require_kind(column, &[ColumnKind::Text, ColumnKind::OptionalText])?;
        Ok(self.filter_rows(|row| {
            row[index]
                .as_text()
                .is_some_and(|text| values.contains(&text))
        }))
    }

    fn filter_rows(&self, mut keep: impl FnMut(&[Cell]) -> bool) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Stable sort by the given columns, ascending, nulls last.
    pub fn sort_by_columns(&mut self, columns: &[&str]) -> Result<(), MonitorError> {
        let indices = columns
            .iter()
            .map(|column| self.require_column(column))
            .collect::<Result<Vec<_>, _>>()?;
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|index| a[*index].cmp(&b[*index]))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(())
    }

    /// Write as CSV with a header row; nulls become empty fields.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), MonitorError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(self.columns.iter().map(|column| column.name.as_str()))
            .map_err(csv_error)?;
        for row in &self.rows {
            csv_writer
                .write_record(row.iter().map(ToString::to_string))
                .map_err(csv_error)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn csv_error(err: csv::Error) -> MonitorError {
    MonitorError::Codec(format!("failed writing csv: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> Dataset {
        Dataset::from_parts(
            vec![
                ColumnSpec::text("location"),
                ColumnSpec::date("decision_date"),
                ColumnSpec::integer("n_decisions"),
            ],
            vec![
                vec![Cell::Text("Paris".into()), Cell::Date(date(2020, 1, 2)), Cell::Integer(3)],
                vec![Cell::Text("Lyon".into()), Cell::Date(date(2020, 1, 2)), Cell::Integer(1)],
                vec![Cell::Text("Paris".into()), Cell::Date(date(2021, 5, 1)), Cell::Integer(2)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn push_row_rejects_wrong_width_and_kind() {
        let mut dataset = Dataset::new(vec![ColumnSpec::text("a"), ColumnSpec::integer("n")]);
        assert!(matches!(
            dataset.push_row(vec![Cell::Text("x".into())]),
            Err(MonitorError::Schema(_))
        ));
        assert!(matches!(
            dataset.push_row(vec![Cell::Null, Cell::Integer(1)]),
            Err(MonitorError::Schema(_))
        ));
        dataset
            .push_row(vec![Cell::Text("x".into()), Cell::Integer(1)])
            .unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn rollup_sums_per_key_in_order() {
        let rolled = sample().rollup(&["location"], "n_decisions").unwrap();
        assert_eq!(rolled.column_names(), vec!["location", "n_decisions"]);
        assert_eq!(
            rolled.rows(),
            &[
                vec![Cell::Text("Lyon".into()), Cell::Integer(1)],
                vec![Cell::Text("Paris".into()), Cell::Integer(5)],
            ]
        );
        assert_eq!(rolled.total("n_decisions").unwrap(), 6);
    }

    #[test]
    fn filters_by_date_and_text() {
        let dataset = sample();
        let range = DateRange::between(date(2020, 1, 1), date(2020, 12, 31));
        assert_eq!(dataset.filter_date_range("decision_date", range).unwrap().len(), 2);
        assert_eq!(dataset.retain_text_in("location", &["Paris"]).unwrap().len(), 2);
        assert!(dataset.filter_date_range("location", range).is_err());
        assert!(dataset.total("missing").is_err());
    }

    #[test]
    fn sort_places_nulls_last() {
        let mut dataset = Dataset::from_parts(
            vec![ColumnSpec::new("smoothed", ColumnKind::OptionalFloat)],
            vec![vec![Cell::Null], vec![Cell::Float(2.0)], vec![Cell::Float(1.5)]],
        )
        .unwrap();
        dataset.sort_by_columns(&["smoothed"]).unwrap();
        assert_eq!(
            dataset.rows(),
            &[vec![Cell::Float(1.5)], vec![Cell::Float(2.0)], vec![Cell::Null]]
        );
    }

    #[test]
    fn csv_output_has_header_and_rows() {
        let mut buffer = Vec::new();
        sample().write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("location,decision_date,n_decisions"));
        assert_eq!(lines.next(), Some("Paris,2020-01-02,3"));
    }
}
