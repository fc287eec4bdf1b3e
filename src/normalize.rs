//! Normalization stage: raw batch -> canonical table.
//!
//! Steps run in a fixed order, each exposed on its own for testing:
//! deduplication by identifier, categorical rewriting through the reference
//! tables, location/court derivation, date parsing, count collapse over the
//! full normalized key, and finally the taxonomy left join.
//!
//! No step fails on a single row. Unknown codes degrade to their table
//! fallback and are tallied; rows whose decision date cannot be parsed are
//! the only ones dropped, and they are tallied too.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DuplicatePolicy;
use crate::data::{
    CanonicalRecord, CanonicalTable, RawBatch, RawDecision, TaxonomyFields, TaxonomyTable,
};
use crate::reference::{
    Category, DECISION_TYPES, JURISDICTIONS, Jurisdiction, LookupOutcome, ReferenceTable, SOURCES,
    highest_court_location, strip_court_prefix,
};
use crate::source::dates::parse_raw_date;
use crate::types::PublicationFlags;
use crate::utils::{normalize_code, normalize_taxonomy_code};

/// Data-quality counters collected while normalizing one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationReport {
    /// Decoded raw rows handed to the stage.
    pub raw_rows: usize,
    /// Rows the loader could not decode at all.
    pub malformed_rows: usize,
    /// Rows dropped because their identifier was already kept.
    pub duplicates_dropped: usize,
    /// Rows without identifier (never deduplicated).
    pub rows_without_id: usize,
    /// Rows dropped because the decision date was missing or unparseable.
    pub invalid_decision_dates: usize,
    /// Kept rows whose update date was present but unparseable.
    pub invalid_update_dates: usize,
    /// Unmapped raw codes per reference table: table -> code -> occurrences.
    pub unmapped_codes: BTreeMap<String, BTreeMap<String, usize>>,
    /// Taxonomy codes with no taxonomy entry: code -> decisions.
    pub unmatched_taxonomy_codes: BTreeMap<String, u64>,
    /// Rows in the canonical table.
    pub canonical_rows: usize,
    /// Sum of decision counts in the canonical table.
    pub total_decisions: u64,
    /// Most recent parsed update date among kept rows.
    pub latest_update_date: Option<NaiveDate>,
}

impl NormalizationReport {
    fn record_resolution(&mut self, table: &ReferenceTable, code: Option<&str>, outcome: LookupOutcome) {
        if outcome != LookupOutcome::Unmapped {
            return;
        }
        let Some(code) = normalize_code(code) else {
            return;
        };
        *self
            .unmapped_codes
            .entry(table.name().to_string())
            .or_default()
            .entry(code)
            .or_insert(0) += 1;
    }

    /// Total unmapped code occurrences across tables.
    pub fn unmapped_total(&self) -> usize {
        self.unmapped_codes.values().flat_map(|codes| codes.values()).sum()
    }

    /// Log every non-zero data-quality signal.
    pub fn log(&self) {
        if self.malformed_rows > 0 {
            warn!("[judilibre:normalize] {} malformed raw row(s) skipped", self.malformed_rows);
        }
        if self.duplicates_dropped > 0 {
            warn!(
                "[judilibre:normalize] dropped {} duplicate identifier row(s)",
                self.duplicates_dropped
            );
        }
        if self.invalid_decision_dates > 0 {
            warn!(
                "[judilibre:normalize] dropped {} row(s) with a missing or unparseable decision date",
                self.invalid_decision_dates
            );
        }
        if self.invalid_update_dates > 0 {
            warn!(
                "[judilibre:normalize] {} row(s) with an unparseable update date",
                self.invalid_update_dates
            );
        }
        for (table, codes) in &self.unmapped_codes {
            let occurrences: usize = codes.values().sum();
            warn!(
                "[judilibre:normalize] table '{}' fell back for {} row(s) across {} unknown code(s)",
                table,
                occurrences,
                codes.len()
            );
        }
        if !self.unmatched_taxonomy_codes.is_empty() {
            warn!(
                "[judilibre:normalize] {} taxonomy code(s) not found in the reference table",
                self.unmatched_taxonomy_codes.len()
            );
        }
    }
}

/// Fully normalized categorical + date key of one decision.
///
/// Field order defines canonical table order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalKey {
    pub source: Category,
    pub jurisdiction: Category,
    pub court: Category,
    pub location: Category,
    pub nac: Category,
    pub chamber: Category,
    pub formation: Category,
    pub decision_type: Category,
    pub decision_date: NaiveDate,
    pub publication: PublicationFlags,
}

/// Keep one row per identifier according to `policy`.
///
/// Output preserves the position of each identifier's first occurrence.
/// Rows without identifier are always kept.
pub fn deduplicate<'a>(
    decisions: &'a [RawDecision],
    policy: DuplicatePolicy,
    report: &mut NormalizationReport,
) -> Vec<&'a RawDecision> {
    let mut kept: Vec<&RawDecision> = Vec::with_capacity(decisions.len());
    let mut slot_by_id: HashMap<&str, usize> = HashMap::new();
    for decision in decisions {
        let Some(id) = decision.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
            report.rows_without_id += 1;
            kept.push(decision);
            continue;
        };
        match slot_by_id.get(id) {
            None => {
                slot_by_id.insert(id, kept.len());
                kept.push(decision);
            }
            Some(&slot) => {
                report.duplicates_dropped += 1;
                if policy == DuplicatePolicy::LatestUpdate && is_newer(decision, kept[slot]) {
                    kept[slot] = decision;
                }
            }
        }
    }
    kept
}

/// Strictly newer update date; an absent or unparseable date is the oldest.
fn is_newer(candidate: &RawDecision, current: &RawDecision) -> bool {
    let parse = |decision: &RawDecision| decision.update_date.as_ref().and_then(parse_raw_date);
    match (parse(candidate), parse(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Resolve court (full name) and location (short name) for one row.
pub fn derive_location(
    jurisdiction: Option<Jurisdiction>,
    raw_location: Option<&str>,
    report: &mut NormalizationReport,
) -> (Category, Category) {
    let Some(jurisdiction) = jurisdiction else {
        return (Category::NotSpecified, Category::NotSpecified);
    };
    let Some(table) = jurisdiction.locations() else {
        return (highest_court_location(), highest_court_location());
    };
    let resolution = table.resolve(raw_location);
    report.record_resolution(table, raw_location, resolution.outcome);
    let location = match &resolution.category {
        Category::Known(court) => Category::Known(strip_court_prefix(court).to_string()),
        Category::NotSpecified => Category::NotSpecified,
    };
    (resolution.category, location)
}

fn resolve_with(
    table: &ReferenceTable,
    code: Option<&str>,
    report: &mut NormalizationReport,
) -> Category {
    let resolution = table.resolve(code);
    report.record_resolution(table, code, resolution.outcome);
    resolution.category
}

/// Normalize one raw row into its canonical key.
///
/// Returns `None` (and counts the row) when the decision date is missing or
/// unparseable.
pub fn normalize_decision(
    decision: &RawDecision,
    report: &mut NormalizationReport,
) -> Option<CanonicalKey> {
    let Some(decision_date) = decision.decision_date.as_ref().and_then(parse_raw_date) else {
        report.invalid_decision_dates += 1;
        return None;
    };

    if let Some(raw) = &decision.update_date {
        match parse_raw_date(raw) {
            Some(date) => {
                report.latest_update_date = report.latest_update_date.max(Some(date));
            }
            None => report.invalid_update_dates += 1,
        }
    }

    let raw_jurisdiction = decision.jurisdiction.as_deref();
    let jurisdiction = Jurisdiction::from_code(raw_jurisdiction);
    let jurisdiction_label = resolve_with(&JURISDICTIONS, raw_jurisdiction, report);
    let source = resolve_with(&SOURCES, decision.source.as_deref(), report);
    let decision_type = resolve_with(&DECISION_TYPES, decision.decision_type.as_deref(), report);
    let (court, location) = derive_location(jurisdiction, decision.location.as_deref(), report);

    let chamber = match jurisdiction {
        Some(jurisdiction) => resolve_with(jurisdiction.chambers(), decision.chamber.as_deref(), report),
        None => Category::NotSpecified,
    };
    let formation = match jurisdiction.and_then(Jurisdiction::formations) {
        Some(table) => resolve_with(table, decision.formation.as_deref(), report),
        None => Category::NotSpecified,
    };

    let nac = normalize_taxonomy_code(decision.nac.as_deref())
        .map(Category::Known)
        .unwrap_or(Category::NotSpecified);
    let publication = decision
        .publication
        .as_deref()
        .map(|flags| flags.trim().to_lowercase())
        .unwrap_or_default();

    Some(CanonicalKey {
        source,
        jurisdiction: jurisdiction_label,
        court,
        location,
        nac,
        chamber,
        formation,
        decision_type,
        decision_date,
        publication,
    })
}

/// Sum one count per row over identical keys, in key order.
pub fn collapse(keys: impl IntoIterator<Item = CanonicalKey>) -> BTreeMap<CanonicalKey, u64> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Left join collapsed counts onto the taxonomy table.
///
/// Unmatched and `NotSpecified` codes keep empty hierarchy fields.
pub fn join_taxonomy(
    counts: BTreeMap<CanonicalKey, u64>,
    taxonomy: &TaxonomyTable,
    report: &mut NormalizationReport,
) -> Vec<CanonicalRecord> {
    counts
        .into_iter()
        .map(|(key, n_decisions)| {
            let taxonomy_fields = match &key.nac {
                Category::Known(code) => match taxonomy.get(code) {
                    Some(entry) => TaxonomyFields::from_entry(entry),
                    None => {
                        *report.unmatched_taxonomy_codes.entry(code.clone()).or_insert(0) +=
                            n_decisions;
                        TaxonomyFields::default()
                    }
                },
                Category::NotSpecified => TaxonomyFields::default(),
            };
            CanonicalRecord {
                source: key.source,
                jurisdiction: key.jurisdiction,
                court: key.court,
                location: key.location,
                nac: key.nac,
                chamber: key.chamber,
                formation: key.formation,
                decision_type: key.decision_type,
                decision_date: key.decision_date,
                publication: key.publication,
                taxonomy: taxonomy_fields,
                n_decisions,
            }
        })
        .collect()
}

/// Runs every normalization step against one taxonomy table.
pub struct Normalizer<'a> {
    taxonomy: &'a TaxonomyTable,
    policy: DuplicatePolicy,
}

impl<'a> Normalizer<'a> {
    pub fn new(taxonomy: &'a TaxonomyTable, policy: DuplicatePolicy) -> Self {
        Self { taxonomy, policy }
    }

    /// Build the canonical table and its data-quality report.
    pub fn normalize(&self, batch: &RawBatch) -> (CanonicalTable, NormalizationReport) {
        let started = Instant::now();
        let mut report = NormalizationReport {
            raw_rows: batch.len(),
            malformed_rows: batch.malformed_rows,
            ..NormalizationReport::default()
        };

        let kept = deduplicate(&batch.decisions, self.policy, &mut report);
        let keys: Vec<CanonicalKey> = kept
            .into_iter()
            .filter_map(|decision| normalize_decision(decision, &mut report))
            .collect();
        let counts = collapse(keys);
        let records = join_taxonomy(counts, self.taxonomy, &mut report);

        let table = CanonicalTable::new(records);
        report.canonical_rows = table.len();
        report.total_decisions = table.total_decisions();
        report.log();
        info!(
            "[judilibre:normalize] {} raw row(s) -> {} canonical row(s), {} decision(s) in {:.2}s",
            report.raw_rows,
            report.canonical_rows,
            report.total_decisions,
            started.elapsed().as_secs_f64()
        );
        (table, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RawDate, TaxonomyEntry};

    fn raw(id: &str, jurisdiction: &str, date: &str) -> RawDecision {
        RawDecision {
            id: Some(id.to_string()),
            jurisdiction: Some(jurisdiction.to_string()),
            decision_date: Some(RawDate::Text(date.to_string())),
            ..RawDecision::default()
        }
    }

    fn taxonomy() -> TaxonomyTable {
        TaxonomyTable::from_entries(vec![TaxonomyEntry {
            code: "4AA".to_string(),
            level1_code: Some("4".to_string()),
            level1_label: Some("Contrats".to_string()),
            level2_label: Some("Vente".to_string()),
            title: Some("Demande en paiement du prix".to_string()),
        }])
        .0
    }

    fn known(label: &str) -> Category {
        Category::Known(label.to_string())
    }

    #[test]
    fn first_seen_keeps_first_row_per_identifier() {
        let mut first = raw("A", "cc", "2020-01-01");
        first.decision_type = Some("arret".into());
        let mut second = raw("A", "cc", "2020-01-01");
        second.decision_type = Some("avis".into());
        let rows = vec![first.clone(), raw("B", "ca", "2020-01-02"), second];
        let mut report = NormalizationReport::default();

        let kept = deduplicate(&rows, DuplicatePolicy::FirstSeen, &mut report);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], &first);
        assert_eq!(report.duplicates_dropped, 1);
    }

    #[test]
    fn latest_update_prefers_newer_row_and_keeps_earlier_on_tie() {
        let mut old = raw("A", "cc", "2020-01-01");
        old.update_date = Some(RawDate::Text("2020-02-01".into()));
        let mut new = raw("A", "cc", "2020-01-01");
        new.update_date = Some(RawDate::Text("2021-02-01".into()));
        new.decision_type = Some("avis".into());
        let mut tie = new.clone();
        tie.decision_type = Some("qpc".into());
        let mut garbage = raw("A", "cc", "2020-01-01");
        garbage.update_date = Some(RawDate::Text("soon".into()));
        let rows = vec![old, new.clone(), tie, garbage];

        let mut report = NormalizationReport::default();
        let kept = deduplicate(&rows, DuplicatePolicy::LatestUpdate, &mut report);
        assert_eq!(kept, vec![&new]);
        assert_eq!(report.duplicates_dropped, 3);
    }

    #[test]
    fn rows_without_identifier_are_never_duplicates() {
        let mut anonymous = raw("", "cc", "2020-01-01");
        anonymous.id = None;
        let rows = vec![anonymous.clone(), anonymous, raw(" ", "cc", "2020-01-01")];
        let mut report = NormalizationReport::default();
        assert_eq!(deduplicate(&rows, DuplicatePolicy::FirstSeen, &mut report).len(), 3);
        assert_eq!(report.rows_without_id, 3);
    }

    #[test]
    fn highest_court_rows_get_sentinel_location() {
        let mut decision = raw("A", "cc", "2020-01-01");
        decision.location = Some("ca_paris".into());
        decision.chamber = Some("civ1".into());
        decision.formation = Some("fs".into());
        let mut report = NormalizationReport::default();
        let key = normalize_decision(&decision, &mut report).unwrap();
        assert_eq!(key.location, known("Cour de cassation"));
        assert_eq!(key.court, known("Cour de cassation"));
        assert_eq!(key.jurisdiction, known("Cour de cassation"));
        assert!(key.chamber.is_specified());
        assert!(key.formation.is_specified());
        assert_eq!(key.nac, Category::NotSpecified);
    }

    #[test]
    fn appeal_rows_resolve_and_strip_location() {
        let mut decision = raw("B", "ca", "2020-01-02");
        decision.location = Some("CA_Paris".into());
        decision.formation = Some("fs".into());
        decision.nac = Some(" 4aa ".into());
        decision.publication = Some("BR".into());
        let mut report = NormalizationReport::default();
        let key = normalize_decision(&decision, &mut report).unwrap();
        assert_eq!(key.court, known("Cour d'appel de Paris"));
        assert_eq!(key.location, known("Paris"));
        assert_eq!(key.formation, Category::NotSpecified);
        assert_eq!(key.nac, known("4AA"));
        assert_eq!(key.publication, "br");
    }

    #[test]
    fn unknown_codes_fall_back_and_are_reported() {
        let mut decision = raw("C", "xx", "2020-01-03");
        decision.source = Some("mystery".into());
        decision.decision_type = Some("decree".into());
        decision.location = Some("ca_atlantis".into());
        let mut report = NormalizationReport::default();
        let key = normalize_decision(&decision, &mut report).unwrap();
        assert_eq!(key.jurisdiction, Category::NotSpecified);
        assert_eq!(key.source, known("Autre"));
        assert_eq!(key.decision_type, known("Autre"));
        assert_eq!(key.location, Category::NotSpecified);
        assert_eq!(key.chamber, Category::NotSpecified);
        assert_eq!(report.unmapped_codes["source"]["mystery"], 1);
        assert_eq!(report.unmapped_codes["jurisdiction"]["xx"], 1);
        assert_eq!(report.unmapped_total(), 3);
    }

    #[test]
    fn bad_decision_dates_drop_rows_and_are_counted() {
        let mut missing = raw("A", "cc", "2020-01-01");
        missing.decision_date = None;
        let invalid = raw("B", "cc", "31/12/2020");
        let mut report = NormalizationReport::default();
        assert!(normalize_decision(&missing, &mut report).is_none());
        assert!(normalize_decision(&invalid, &mut report).is_none());
        assert_eq!(report.invalid_decision_dates, 2);
    }

    #[test]
    fn normalizer_collapses_counts_and_joins_taxonomy() {
        let mut joined = raw("A", "ca", "2020-01-01");
        joined.location = Some("ca_lyon".into());
        joined.nac = Some("4AA".into());
        let mut twin = joined.clone();
        twin.id = Some("B".into());
        let mut unmatched = joined.clone();
        unmatched.id = Some("C".into());
        unmatched.nac = Some("99Z".into());
        let mut bad_update = raw("D", "cc", "2020-01-01");
        bad_update.update_date = Some(RawDate::Text("never".into()));
        let batch = RawBatch::from_decisions(vec![joined, twin, unmatched, bad_update]);

        let table_ref = taxonomy();
        let (table, report) = Normalizer::new(&table_ref, DuplicatePolicy::FirstSeen).normalize(&batch);
        assert_eq!(table.len(), 3);
        assert_eq!(table.total_decisions(), 4);
        assert_eq!(report.invalid_update_dates, 1);
        assert_eq!(report.unmatched_taxonomy_codes.get("99Z"), Some(&1));

        let matched = table
            .records()
            .iter()
            .find(|record| record.nac == known("4AA"))
            .unwrap();
        assert_eq!(matched.n_decisions, 2);
        assert_eq!(matched.taxonomy.level1_code.as_deref(), Some("4"));
        let missing = table
            .records()
            .iter()
            .find(|record| record.nac == known("99Z"))
            .unwrap();
        assert!(missing.taxonomy.is_empty());
    }
}
