//! Aggregation stage: canonical table -> one grouped-and-summed dataset per chart family.
//!
//! Every aggregate is a plain sum of `n_decisions` over its grouping key,
//! computed from the canonical table alone. Sums over disjoint date slices
//! therefore add up to the sum over their union. The one exception is the
//! smoothing column of the monthly series, which is derived after the sum.

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use tracing::debug;

use crate::constants::aggregation::{PUBLICATION_FLAGS, SMOOTHING_WINDOW};
use crate::constants::columns::*;
use crate::data::{CanonicalRecord, CanonicalTable, DateRange};
use crate::errors::MonitorError;
use crate::frame::{Cell, ColumnKind, ColumnSpec, Dataset, GroupSum};
use crate::reference::Category;
use crate::source::dates::month_start;
use crate::types::SnapshotName;

/// How the dashboard loads a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotGroup {
    /// Loaded once at startup.
    Static,
    /// Loaded for the general charts.
    General,
    /// Loaded for the selected-location charts.
    Selected,
}

/// Subset of canonical rows an aggregate reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Every jurisdiction.
    All,
    /// The highest court only.
    HighestCourt,
    /// Every court below the highest court.
    LowerCourts,
}

impl Scope {
    /// True when `record` belongs to this scope.
    pub fn includes(self, record: &CanonicalRecord) -> bool {
        match self {
            Self::All => true,
            Self::HighestCourt => record.is_highest_court(),
            Self::LowerCourts => !record.is_highest_court(),
        }
    }
}

/// Every precomputed aggregate, one per chart family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Source,
    TimeByYear,
    TimeByMonthCc,
    ChamberCc,
    TypeCc,
    FormationCc,
    PublicationCc,
    LocationCa,
    NacLevel,
    NacCa,
    TimeSelectedLocationCa,
    NacLevelSelectedLocationCa,
    NacSelectedLocationCa,
}

impl AggregateKind {
    /// Every aggregate, in snapshot-writing order.
    pub const ALL: [AggregateKind; 13] = [
        Self::Source,
        Self::TimeByYear,
        Self::TimeByMonthCc,
        Self::ChamberCc,
        Self::TypeCc,
        Self::FormationCc,
        Self::PublicationCc,
        Self::LocationCa,
        Self::NacLevel,
        Self::NacCa,
        Self::TimeSelectedLocationCa,
        Self::NacLevelSelectedLocationCa,
        Self::NacSelectedLocationCa,
    ];

    /// Deterministic snapshot name.
    pub fn snapshot_name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::TimeByYear => "time_by_year",
            Self::TimeByMonthCc => "time_by_month_cc",
            Self::ChamberCc => "chamber_cc",
            Self::TypeCc => "type_cc",
            Self::FormationCc => "formation_cc",
            Self::PublicationCc => "publication_cc",
            Self::LocationCa => "location_ca",
            Self::NacLevel => "nac_level",
            Self::NacCa => "nac_ca",
            Self::TimeSelectedLocationCa => "time_selected_location_ca",
            Self::NacLevelSelectedLocationCa => "nac_level_selected_location_ca",
            Self::NacSelectedLocationCa => "nac_selected_location_ca",
        }
    }

    /// Reverse of [`AggregateKind::snapshot_name`].
    pub fn from_snapshot_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.snapshot_name() == name)
    }

    pub fn group(self) -> SnapshotGroup {
        match self {
            Self::Source | Self::TimeByYear => SnapshotGroup::Static,
            Self::TimeSelectedLocationCa
            | Self::NacLevelSelectedLocationCa
            | Self::NacSelectedLocationCa => SnapshotGroup::Selected,
            _ => SnapshotGroup::General,
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            Self::TimeByMonthCc
            | Self::ChamberCc
            | Self::TypeCc
            | Self::FormationCc
            | Self::PublicationCc => Scope::HighestCourt,
            Self::LocationCa | Self::NacCa => Scope::LowerCourts,
            _ => Scope::All,
        }
    }

    /// Grouping key columns, in output order (without the count columns).
    pub fn key_columns(self) -> Vec<ColumnSpec> {
        let names: &[&str] = match self {
            Self::Source => &[SOURCE, JURISDICTION, DECISION_DATE],
            Self::TimeByYear => &[DECISION_YEAR, JURISDICTION, DECISION_DATE],
            Self::TimeByMonthCc => &[DECISION_MONTH],
            Self::ChamberCc => &[CHAMBER, DECISION_DATE],
            Self::TypeCc => &[TYPE, DECISION_DATE],
            Self::FormationCc => &[FORMATION, DECISION_DATE],
            Self::PublicationCc => &[PUBLICATION, DECISION_DATE],
            Self::LocationCa => &[LOCATION, DECISION_DATE],
            Self::NacLevel => &[NAC_LEVEL2_LABEL, NAC_LEVEL1_CODE, NAC_LEVEL1_LABEL, DECISION_DATE],
            Self::NacCa => &[NAC, NAC_LEVEL1_LABEL, NAC_LEVEL1_CODE, NAC_TITLE, DECISION_DATE],
            Self::TimeSelectedLocationCa => &[DECISION_MONTH, DECISION_DATE, LOCATION, COURT],
            Self::NacLevelSelectedLocationCa => {
                &[NAC_LEVEL1_CODE, NAC_LEVEL1_LABEL, LOCATION, DECISION_DATE]
            }
            Self::NacSelectedLocationCa => &[NAC, NAC_TITLE, LOCATION, DECISION_DATE],
        };
        names.iter().map(|name| ColumnSpec::new(*name, key_kind(name))).collect()
    }

    /// Full output column list.
    pub fn columns(self) -> Vec<ColumnSpec> {
        let mut columns = self.key_columns();
        columns.push(ColumnSpec::integer(N_DECISIONS));
        if self == Self::TimeByMonthCc {
            columns.push(ColumnSpec::new(N_DECISIONS_SMOOTHED, ColumnKind::OptionalFloat));
        }
        columns
    }

    /// Key columns the output is explicitly re-sorted by, if any.
    fn presentation_order(self) -> Option<&'static [&'static str]> {
        match self {
            Self::TimeSelectedLocationCa => Some(&[LOCATION, DECISION_DATE]),
            Self::NacLevelSelectedLocationCa => Some(&[LOCATION, NAC_LEVEL1_CODE]),
            Self::NacSelectedLocationCa => Some(&[LOCATION, NAC]),
            _ => None,
        }
    }

    /// Grouping key of one canonical row; `None` drops the row from this aggregate.
    fn key_of(self, record: &CanonicalRecord) -> Option<Vec<KeyPart>> {
        let date = KeyPart::Date(record.decision_date);
        let category = |value: &Category| KeyPart::Category(value.clone());
        let key = match self {
            Self::Source => vec![category(&record.source), category(&record.jurisdiction), date],
            Self::TimeByYear => vec![
                KeyPart::Year(record.decision_date.year()),
                category(&record.jurisdiction),
                date,
            ],
            Self::TimeByMonthCc => vec![KeyPart::Date(month_start(record.decision_date))],
            Self::ChamberCc => vec![category(&record.chamber), date],
            Self::TypeCc => vec![category(&record.decision_type), date],
            Self::FormationCc => vec![category(&record.formation), date],
            Self::PublicationCc => return None,
            Self::LocationCa => vec![category(&record.location), date],
            Self::NacLevel => vec![
                level(&record.taxonomy.level2_label)?,
                level(&record.taxonomy.level1_code)?,
                level(&record.taxonomy.level1_label)?,
                date,
            ],
            Self::NacCa => vec![
                category(&record.nac),
                optional(&record.taxonomy.level1_label),
                optional(&record.taxonomy.level1_code),
                optional(&record.taxonomy.title),
                date,
            ],
            Self::TimeSelectedLocationCa => vec![
                KeyPart::Date(month_start(record.decision_date)),
                date,
                category(&record.location),
                category(&record.court),
            ],
            Self::NacLevelSelectedLocationCa => vec![
                level(&record.taxonomy.level1_code)?,
                level(&record.taxonomy.level1_label)?,
                category(&record.location),
                date,
            ],
            Self::NacSelectedLocationCa => vec![
                category(&record.nac),
                optional(&record.taxonomy.title),
                category(&record.location),
                date,
            ],
        };
        Some(key)
    }

    /// Publication fan-out: one key per recognized flag character.
    fn publication_keys(record: &CanonicalRecord) -> Vec<Vec<KeyPart>> {
        record
            .publication
            .chars()
            .filter(|flag| PUBLICATION_FLAGS.contains(flag))
            .map(|flag| {
                vec![
                    KeyPart::Category(Category::Known(flag.to_uppercase().collect())),
                    KeyPart::Date(record.decision_date),
                ]
            })
            .collect()
    }

    /// Compute this aggregate over the whole canonical table.
    pub fn compute(self, table: &CanonicalTable) -> Result<Dataset, MonitorError> {
        let mut groups = GroupSum::new();
        for record in table.records().iter().filter(|record| self.scope().includes(record)) {
            let count = i64::try_from(record.n_decisions).unwrap_or(i64::MAX);
            if self == Self::PublicationCc {
                for key in Self::publication_keys(record) {
                    groups.add(key, count);
                }
            } else if let Some(key) = self.key_of(record) {
                groups.add(key, count);
            }
        }
        let mut grouped: Vec<(Vec<KeyPart>, i64)> = groups.into_groups().collect();

        if let Some(order) = self.presentation_order() {
            let key_columns = self.key_columns();
            let positions: Vec<usize> = order
                .iter()
                .filter_map(|name| key_columns.iter().position(|column| column.name == *name))
                .collect();
            grouped.sort_by(|(a, _), (b, _)| {
                positions
                    .iter()
                    .map(|position| a[*position].cmp(&b[*position]))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let smoothed = if self == Self::TimeByMonthCc {
            let counts: Vec<i64> = grouped.iter().map(|(_, count)| *count).collect();
            Some(centered_rolling_mean(&counts, SMOOTHING_WINDOW))
        } else {
            None
        };

        let mut dataset = Dataset::new(self.columns());
        for (position, (key, count)) in grouped.into_iter().enumerate() {
            let mut row: Vec<Cell> = key.into_iter().map(KeyPart::into_cell).collect();
            row.push(Cell::Integer(count));
            if let Some(smoothed) = &smoothed {
                row.push(Cell::from(smoothed[position]));
            }
            dataset.push_row(row)?;
        }
        debug!(
            "[judilibre:aggregate] {} -> {} row(s)",
            self.snapshot_name(),
            dataset.len()
        );
        Ok(dataset)
    }

    /// Compute this aggregate over the canonical rows within `range`.
    pub fn compute_in_range(
        self,
        table: &CanonicalTable,
        range: DateRange,
    ) -> Result<Dataset, MonitorError> {
        self.compute(&table.slice(range))
    }
}

/// Compute every aggregate, keyed by snapshot name in [`AggregateKind::ALL`] order.
pub fn compute_all(table: &CanonicalTable) -> Result<IndexMap<SnapshotName, Dataset>, MonitorError> {
    AggregateKind::ALL
        .into_iter()
        .map(|kind| Ok((kind.snapshot_name().to_string(), kind.compute(table)?)))
        .collect()
}

/// Centered rolling mean over `values`.
///
/// Position `i` averages `values[i - before ..= i + after]` with
/// `before = (window - 1) / 2` and `after = window - 1 - before`; positions
/// whose window does not fit are `None`. For a window of 12 that is 5 leading
/// and 6 trailing `None`s.
///
/// Positions are series positions, not calendar months: months absent from
/// `values` are not filled with zeros, so a gap widens the span a window covers.
pub fn centered_rolling_mean(values: &[i64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let before = (window - 1) / 2;
    let after = window - 1 - before;
    (0..values.len())
        .map(|index| {
            if index < before || index + after >= values.len() {
                return None;
            }
            let slice = &values[index - before..=index + after];
            let sum: i64 = slice.iter().sum();
            Some(sum as f64 / window as f64)
        })
        .collect()
}

/// Typed grouping key component; `Category` keeps `NotSpecified` last.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Category(Category),
    Year(i32),
    Date(NaiveDate),
}

impl KeyPart {
    fn into_cell(self) -> Cell {
        match self {
            Self::Category(category) => Cell::from(category),
            Self::Year(year) => Cell::Integer(i64::from(year)),
            Self::Date(date) => Cell::Date(date),
        }
    }
}

fn key_kind(name: &str) -> ColumnKind {
    match name {
        DECISION_DATE | DECISION_MONTH => ColumnKind::Date,
        DECISION_YEAR => ColumnKind::Integer,
        _ => ColumnKind::Text,
    }
}

/// Hierarchy level that must be present for the row to count.
fn level(value: &Option<String>) -> Option<KeyPart> {
    value
        .as_ref()
        .map(|label| KeyPart::Category(Category::Known(label.clone())))
}

/// Hierarchy field bucketed as `NotSpecified` when absent.
fn optional(value: &Option<String>) -> KeyPart {
    KeyPart::Category(Category::from(value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TaxonomyFields;
    use crate::reference::{Jurisdiction, highest_court_location};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn known(label: &str) -> Category {
        Category::Known(label.to_string())
    }

    fn cassation(day: NaiveDate, n: u64) -> CanonicalRecord {
        CanonicalRecord {
            source: known("Jurinet"),
            jurisdiction: Jurisdiction::Cassation.category(),
            court: highest_court_location(),
            location: highest_court_location(),
            nac: Category::NotSpecified,
            chamber: known("Chambre sociale"),
            formation: Category::NotSpecified,
            decision_type: known("Arrêt"),
            decision_date: day,
            publication: "bnx".to_string(),
            taxonomy: TaxonomyFields::default(),
            n_decisions: n,
        }
    }

    fn appeal(location: &str, day: NaiveDate, n: u64, level1: Option<&str>) -> CanonicalRecord {
        CanonicalRecord {
            source: known("Jurica"),
            jurisdiction: Jurisdiction::Appeal.category(),
            court: known(&format!("Cour d'appel de {location}")),
            location: known(location),
            nac: known("4AA"),
            chamber: Category::NotSpecified,
            formation: Category::NotSpecified,
            decision_type: known("Arrêt"),
            decision_date: day,
            publication: String::new(),
            taxonomy: TaxonomyFields {
                level1_code: level1.map(|_| "4".to_string()),
                level1_label: level1.map(str::to_string),
                level2_label: level1.map(|_| "Vente".to_string()),
                title: None,
            },
            n_decisions: n,
        }
    }

    #[test]
    fn snapshot_names_round_trip_and_are_unique() {
        for kind in AggregateKind::ALL {
            assert_eq!(AggregateKind::from_snapshot_name(kind.snapshot_name()), Some(kind));
        }
        let mut names: Vec<_> = AggregateKind::ALL.iter().map(|kind| kind.snapshot_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), AggregateKind::ALL.len());
    }

    #[test]
    fn rolling_mean_has_five_leading_and_six_trailing_gaps() {
        let values: Vec<i64> = (1..=20).collect();
        let smoothed = centered_rolling_mean(&values, 12);
        assert!(smoothed[..5].iter().all(Option::is_none));
        assert!(smoothed[14..].iter().all(Option::is_none));
        assert_eq!(smoothed.iter().filter(|value| value.is_none()).count(), 11);
        // values[0..12] are 1..=12, mean 6.5, centered on index 5.
        assert_eq!(smoothed[5], Some(6.5));
        assert_eq!(smoothed[13], Some(14.5));
    }

    #[test]
    fn rolling_mean_on_short_series_is_all_undefined() {
        assert_eq!(centered_rolling_mean(&[1, 2, 3], 12), vec![None, None, None]);
        assert!(centered_rolling_mean(&[], 12).is_empty());
    }

    #[test]
    fn publication_flags_fan_out_filter_and_uppercase() {
        let table = CanonicalTable::new(vec![cassation(date(2020, 1, 1), 3)]);
        let dataset = AggregateKind::PublicationCc.compute(&table).unwrap();
        let flags: Vec<_> = dataset
            .column(PUBLICATION)
            .unwrap()
            .filter_map(Cell::as_text)
            .collect();
        assert_eq!(flags, vec!["B", "N"]);
        assert_eq!(dataset.total(N_DECISIONS).unwrap(), 6);
    }

    #[test]
    fn highest_court_and_lower_court_scopes_do_not_overlap() {
        let table = CanonicalTable::new(vec![
            cassation(date(2020, 1, 1), 2),
            appeal("Paris", date(2020, 1, 2), 5, Some("Contrats")),
        ]);
        assert_eq!(AggregateKind::TypeCc.compute(&table).unwrap().total(N_DECISIONS).unwrap(), 2);
        assert_eq!(AggregateKind::LocationCa.compute(&table).unwrap().total(N_DECISIONS).unwrap(), 5);
        assert_eq!(AggregateKind::Source.compute(&table).unwrap().total(N_DECISIONS).unwrap(), 7);
    }

    #[test]
    fn taxonomy_levels_drop_absent_hierarchy_but_codes_keep_it() {
        let table = CanonicalTable::new(vec![
            appeal("Paris", date(2020, 1, 2), 5, Some("Contrats")),
            appeal("Lyon", date(2020, 1, 3), 4, None),
        ]);
        let levels = AggregateKind::NacLevel.compute(&table).unwrap();
        assert_eq!(levels.total(N_DECISIONS).unwrap(), 5);
        let codes = AggregateKind::NacCa.compute(&table).unwrap();
        assert_eq!(codes.total(N_DECISIONS).unwrap(), 9);
        let titles: Vec<_> = codes.column(NAC_TITLE).unwrap().filter_map(Cell::as_text).collect();
        assert!(titles.iter().all(|title| *title == "Non renseigné"));
    }

    fn location_and_key(dataset: &Dataset, key: &str) -> Vec<(String, String)> {
        let key = dataset.column_index(key).unwrap();
        let location = dataset.column_index(LOCATION).unwrap();
        dataset
            .rows()
            .iter()
            .map(|row| {
                (
                    row[location].as_text().unwrap().to_string(),
                    row[key].as_text().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn selected_code_rows_are_sorted_by_location_then_code() {
        let with_nac = |location: &str, nac: Category| {
            let mut record = appeal(location, date(2020, 1, 1), 1, None);
            record.nac = nac;
            record
        };
        let table = CanonicalTable::new(vec![
            with_nac("Paris", known("4AA")),
            with_nac("Lyon", Category::NotSpecified),
            with_nac("Paris", known("1AB")),
            with_nac("Lyon", known("97E")),
        ]);
        let dataset = AggregateKind::NacSelectedLocationCa.compute(&table).unwrap();
        let pairs = |items: &[(&str, &str)]| -> Vec<(String, String)> {
            items.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
        };
        assert_eq!(
            location_and_key(&dataset, NAC),
            pairs(&[
                ("Lyon", "97E"),
                ("Lyon", "Non renseigné"),
                ("Paris", "1AB"),
                ("Paris", "4AA"),
            ])
        );
    }

    #[test]
    fn selected_level_rows_are_sorted_by_location_then_level1_code() {
        let with_level1 = |location: &str, code: &str| {
            let mut record = appeal(location, date(2020, 1, 1), 1, Some("Famille"));
            record.taxonomy.level1_code = Some(code.to_string());
            record
        };
        let table = CanonicalTable::new(vec![
            with_level1("Paris", "7"),
            with_level1("Lyon", "4"),
            with_level1("Paris", "2"),
            with_level1("Lyon", "1"),
        ]);
        let dataset = AggregateKind::NacLevelSelectedLocationCa.compute(&table).unwrap();
        let expected: Vec<(String, String)> = [("Lyon", "1"), ("Lyon", "4"), ("Paris", "2"), ("Paris", "7")]
            .iter()
            .map(|(location, code)| (location.to_string(), code.to_string()))
            .collect();
        assert_eq!(location_and_key(&dataset, NAC_LEVEL1_CODE), expected);
    }

    #[test]
    fn selected_location_rows_are_sorted_by_location_then_date() {
        let table = CanonicalTable::new(vec![
            appeal("Paris", date(2020, 1, 1), 1, None),
            appeal("Lyon", date(2020, 3, 1), 1, None),
            appeal("Lyon", date(2020, 2, 1), 1, None),
        ]);
        let dataset = AggregateKind::TimeSelectedLocationCa.compute(&table).unwrap();
        let order: Vec<(String, NaiveDate)> = dataset
            .rows()
            .iter()
            .map(|row| (row[2].as_text().unwrap().to_string(), row[1].as_date().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Lyon".to_string(), date(2020, 2, 1)),
                ("Lyon".to_string(), date(2020, 3, 1)),
                ("Paris".to_string(), date(2020, 1, 1)),
            ]
        );
    }

    #[test]
    fn monthly_series_buckets_to_first_of_month() {
        let table = CanonicalTable::new(vec![
            cassation(date(2020, 1, 5), 1),
            cassation(date(2020, 1, 25), 2),
            cassation(date(2020, 2, 3), 4),
        ]);
        let dataset = AggregateKind::TimeByMonthCc.compute(&table).unwrap();
        assert_eq!(dataset.column_names(), vec![DECISION_MONTH, N_DECISIONS, N_DECISIONS_SMOOTHED]);
        assert_eq!(
            dataset.rows()[0],
            vec![Cell::Date(date(2020, 1, 1)), Cell::Integer(3), Cell::Null]
        );
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn not_specified_bucket_sorts_last() {
        let mut unknown = cassation(date(2020, 1, 1), 1);
        unknown.chamber = Category::NotSpecified;
        let mut known_chamber = cassation(date(2020, 1, 1), 1);
        known_chamber.chamber = known("Première chambre civile");
        let table = CanonicalTable::new(vec![unknown, known_chamber]);
        let dataset = AggregateKind::ChamberCc.compute(&table).unwrap();
        let chambers: Vec<_> = dataset.column(CHAMBER).unwrap().filter_map(Cell::as_text).collect();
        assert_eq!(chambers, vec!["Première chambre civile", "Non renseigné"]);
    }

    #[test]
    fn compute_all_covers_every_kind() {
        let table = CanonicalTable::new(vec![cassation(date(2020, 1, 1), 1)]);
        let all = compute_all(&table).unwrap();
        assert_eq!(all.len(), AggregateKind::ALL.len());
        assert_eq!(all.get_index(0).map(|(name, _)| name.as_str()), Some("source"));
    }
}
