//! Download projections re-derived from the canonical table on demand.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::columns::{LOCATION, N_DECISIONS, NAC, NAC_TITLE};
use crate::data::{CanonicalRecord, CanonicalTable, DateRange};
use crate::errors::MonitorError;
use crate::frame::{Cell, ColumnSpec, Dataset, GroupSum};
use crate::reference::Category;
use crate::transport::fs::{commit_staged, discard_staged, write_staged};

/// User-facing export views.
///
/// The three grouped views cover courts below the highest court; `Full` is
/// the whole canonical table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExportView {
    ByLocation,
    ByTaxonomyCode,
    ByLocationAndTaxonomyCode,
    Full,
}

impl ExportView {
    pub const ALL: [ExportView; 4] = [
        Self::ByLocation,
        Self::ByTaxonomyCode,
        Self::ByLocationAndTaxonomyCode,
        Self::Full,
    ];

    /// Stable name, also the default download file stem.
    pub fn name(self) -> &'static str {
        match self {
            Self::ByLocation => "by_location",
            Self::ByTaxonomyCode => "by_taxonomy_code",
            Self::ByLocationAndTaxonomyCode => "by_location_and_taxonomy_code",
            Self::Full => "full",
        }
    }

    fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::ByLocation => &[LOCATION],
            Self::ByTaxonomyCode => &[NAC, NAC_TITLE],
            Self::ByLocationAndTaxonomyCode => &[LOCATION, NAC, NAC_TITLE],
            Self::Full => &[],
        }
    }

    fn key_of(self, record: &CanonicalRecord) -> Vec<Category> {
        let title = || Category::from(record.taxonomy.title.clone());
        match self {
            Self::ByLocation => vec![record.location.clone()],
            Self::ByTaxonomyCode => vec![record.nac.clone(), title()],
            Self::ByLocationAndTaxonomyCode => {
                vec![record.location.clone(), record.nac.clone(), title()]
            }
            Self::Full => Vec::new(),
        }
    }

    /// Build the view, optionally restricted to decisions within `range`.
    pub fn compute(
        self,
        table: &CanonicalTable,
        range: Option<DateRange>,
    ) -> Result<Dataset, MonitorError> {
        let sliced = table.slice(range.unwrap_or_default());
        if self == Self::Full {
            return sliced.to_dataset();
        }

        let mut groups = GroupSum::new();
        for record in sliced.records().iter().filter(|record| !record.is_highest_court()) {
            groups.add(
                self.key_of(record),
                i64::try_from(record.n_decisions).unwrap_or(i64::MAX),
            );
        }
        let mut columns: Vec<ColumnSpec> =
            self.key_columns().iter().map(|name| ColumnSpec::text(*name)).collect();
        columns.push(ColumnSpec::integer(N_DECISIONS));
        let mut dataset = Dataset::new(columns);
        for (key, count) in groups.into_groups() {
            let mut row: Vec<Cell> = key.iter().map(Cell::from).collect();
            row.push(Cell::Integer(count));
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Build the view and write it as CSV to `path`, atomically.
    pub fn write_csv(
        self,
        table: &CanonicalTable,
        range: Option<DateRange>,
        path: &Path,
    ) -> Result<Dataset, MonitorError> {
        let dataset = self.compute(table, range)?;
        let staging = write_staged(path, |file| {
            let mut writer = BufWriter::new(file);
            dataset.write_csv(&mut writer)?;
            writer.flush()?;
            Ok(())
        })?;
        if let Err(err) = commit_staged(&staging, path) {
            discard_staged([staging.as_path()]);
            return Err(err);
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TaxonomyFields;
    use crate::reference::{Jurisdiction, highest_court_location};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn record(jurisdiction: Jurisdiction, location: &str, nac: &str, day: u32, n: u64) -> CanonicalRecord {
        let location = match jurisdiction {
            Jurisdiction::Cassation => highest_court_location(),
            _ => Category::Known(location.to_string()),
        };
        CanonicalRecord {
            source: Category::Known("Jurica".into()),
            jurisdiction: jurisdiction.category(),
            court: location.clone(),
            location,
            nac: Category::Known(nac.to_string()),
            chamber: Category::NotSpecified,
            formation: Category::NotSpecified,
            decision_type: Category::Known("Arrêt".into()),
            decision_date: NaiveDate::from_ymd_opt(2020, 1, day).unwrap(),
            publication: String::new(),
            taxonomy: TaxonomyFields {
                title: (nac == "4AA").then(|| "Vente".to_string()),
                ..TaxonomyFields::default()
            },
            n_decisions: n,
        }
    }

    fn table() -> CanonicalTable {
        CanonicalTable::new(vec![
            record(Jurisdiction::Appeal, "Paris", "4AA", 1, 2),
            record(Jurisdiction::Appeal, "Paris", "00A", 2, 1),
            record(Jurisdiction::Appeal, "Lyon", "4AA", 3, 4),
            record(Jurisdiction::Cassation, "", "4AA", 3, 10),
        ])
    }

    #[test]
    fn by_location_excludes_highest_court() {
        let dataset = ExportView::ByLocation.compute(&table(), None).unwrap();
        assert_eq!(
            dataset.rows(),
            &[
                vec![Cell::Text("Lyon".into()), Cell::Integer(4)],
                vec![Cell::Text("Paris".into()), Cell::Integer(3)],
            ]
        );
    }

    #[test]
    fn taxonomy_view_buckets_missing_titles() {
        let dataset = ExportView::ByTaxonomyCode.compute(&table(), None).unwrap();
        assert_eq!(
            dataset.rows(),
            &[
                vec![
                    Cell::Text("00A".into()),
                    Cell::Text("Non renseigné".into()),
                    Cell::Integer(1)
                ],
                vec![Cell::Text("4AA".into()), Cell::Text("Vente".into()), Cell::Integer(6)],
            ]
        );
    }

    #[test]
    fn date_range_restricts_every_view() {
        let range = DateRange::between(
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
        );
        let combined = ExportView::ByLocationAndTaxonomyCode
            .compute(&table(), Some(range))
            .unwrap();
        assert_eq!(combined.total(N_DECISIONS).unwrap(), 5);
        let full = ExportView::Full.compute(&table(), Some(range)).unwrap();
        assert_eq!(full.total(N_DECISIONS).unwrap(), 15);
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("by_location.csv");
        ExportView::ByLocation.write_csv(&table(), None, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "location,n_decisions\nLyon,4\nParis,3\n");
    }
}
