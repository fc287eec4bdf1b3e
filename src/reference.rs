//! Reference tables mapping raw upstream codes to display labels.
//!
//! Every table is a closed, insertion-ordered set of `(code, label)` pairs with
//! a documented fallback, so lookups are total: an unknown or missing code
//! degrades to the fallback instead of failing. Callers that want to surface
//! drift use [`ReferenceTable::resolve`], which also reports whether the code
//! was mapped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::labels::{HIGHEST_COURT_LOCATION, NOT_SPECIFIED, OTHER};
use crate::types::Label;
use crate::utils::normalize_code;

/// A categorical value after normalization.
///
/// `NotSpecified` is the single representation of an absent or unresolvable
/// category. It renders as `Non renseigné` and sorts after every known label.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// A resolved display label.
    Known(Label),
    /// No usable value.
    NotSpecified,
}

impl Category {
    /// Build a category from a display label; the sentinel label maps back to `NotSpecified`.
    pub fn from_label(label: impl Into<Label>) -> Self {
        let label = label.into();
        if label == NOT_SPECIFIED {
            Self::NotSpecified
        } else {
            Self::Known(label)
        }
    }

    /// Display label, with `NotSpecified` rendered as its sentinel text.
    pub fn label(&self) -> &str {
        match self {
            Self::Known(label) => label,
            Self::NotSpecified => NOT_SPECIFIED,
        }
    }

    /// True unless this is `NotSpecified`.
    pub fn is_specified(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Option<String>> for Category {
    fn from(value: Option<String>) -> Self {
        value.map(Self::from_label).unwrap_or(Self::NotSpecified)
    }
}

/// Value produced when a lookup misses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fallback {
    /// Resolve to `Category::NotSpecified`.
    NotSpecified,
    /// Resolve to the `Autre` label.
    Other,
}

impl Fallback {
    /// The category this fallback stands for.
    pub fn category(self) -> Category {
        match self {
            Self::NotSpecified => Category::NotSpecified,
            Self::Other => Category::Known(OTHER.to_string()),
        }
    }
}

/// How a lookup was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The code is part of the table.
    Mapped,
    /// No code was provided.
    Missing,
    /// A code was provided but the table does not know it.
    Unmapped,
}

/// Result of [`ReferenceTable::resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved (or fallback) category.
    pub category: Category,
    /// How the category was obtained.
    pub outcome: LookupOutcome,
}

/// Closed, insertion-ordered mapping from raw code to display label.
#[derive(Debug)]
pub struct ReferenceTable {
    name: &'static str,
    entries: &'static [(&'static str, &'static str)],
    fallback: Fallback,
}

impl ReferenceTable {
    /// Declare a table; codes must be lower-case.
    pub const fn new(
        name: &'static str,
        entries: &'static [(&'static str, &'static str)],
        fallback: Fallback,
    ) -> Self {
        Self {
            name,
            entries,
            fallback,
        }
    }

    /// Stable table name used in data-quality reports.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fallback applied to unknown and missing codes.
    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    /// Exact lookup of an already-normalized code.
    pub fn lookup(&self, code: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == code)
            .map(|(_, label)| *label)
    }

    /// Total lookup: trims and lower-cases `code`, falling back when unknown.
    pub fn label_for(&self, code: Option<&str>) -> Category {
        self.resolve(code).category
    }

    /// Total lookup that also reports whether the code was mapped.
    pub fn resolve(&self, code: Option<&str>) -> Resolution {
        let Some(code) = normalize_code(code) else {
            return Resolution {
                category: self.fallback.category(),
                outcome: LookupOutcome::Missing,
            };
        };
        match self.lookup(&code) {
            Some(label) => Resolution {
                category: Category::Known(label.to_string()),
                outcome: LookupOutcome::Mapped,
            },
            None => Resolution {
                category: self.fallback.category(),
                outcome: LookupOutcome::Unmapped,
            },
        }
    }

    /// Codes in declaration order.
    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(code, _)| *code)
    }

    /// `(code, label)` pairs in declaration order.
    pub fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }

    /// Number of mapped codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table maps nothing (every lookup falls back).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source systems feeding the upstream API.
pub static SOURCES: ReferenceTable = ReferenceTable::new(
    "source",
    &[
        ("dila", "Dila"),
        ("jurinet", "Jurinet"),
        ("jurica", "Jurica"),
        ("juritj", "Juritj"),
    ],
    Fallback::Other,
);

/// Jurisdiction labels; kept in step with [`Jurisdiction`].
pub static JURISDICTIONS: ReferenceTable = ReferenceTable::new(
    "jurisdiction",
    &[
        ("cc", "Cour de cassation"),
        ("ca", "Cour d'appel"),
        ("tj", "Tribunal judiciaire"),
    ],
    Fallback::NotSpecified,
);

/// Decision types.
pub static DECISION_TYPES: ReferenceTable = ReferenceTable::new(
    "type",
    &[
        ("arret", "Arrêt"),
        ("ordonnance", "Ordonnance"),
        ("avis", "Avis"),
        ("qpc", "Question prioritaire de constitutionnalité"),
        ("saisie", "Saisie"),
        ("other", OTHER),
    ],
    Fallback::Other,
);

/// Chambers of the highest court.
pub static CHAMBERS_CC: ReferenceTable = ReferenceTable::new(
    "chamber_cc",
    &[
        ("pl", "Assemblée plénière"),
        ("mi", "Chambre mixte"),
        ("civ1", "Première chambre civile"),
        ("civ2", "Deuxième chambre civile"),
        ("civ3", "Troisième chambre civile"),
        ("comm", "Chambre commerciale"),
        ("soc", "Chambre sociale"),
        ("cr", "Chambre criminelle"),
        ("creun", "Chambres réunies"),
        ("ordo", "Première présidence (ordonnance)"),
        ("allciv", "Toutes les chambres civiles"),
        ("other", OTHER),
    ],
    Fallback::NotSpecified,
);

/// Chambers of the appeal courts.
pub static CHAMBERS_CA: ReferenceTable = ReferenceTable::new(
    "chamber_ca",
    &[("inconnue", "Chambre inconnue")],
    Fallback::NotSpecified,
);

/// Chambers of the first-instance courts (no curated codes yet).
pub static CHAMBERS_TJ: ReferenceTable =
    ReferenceTable::new("chamber_tj", &[], Fallback::NotSpecified);

/// Formations of the highest court.
pub static FORMATIONS_CC: ReferenceTable = ReferenceTable::new(
    "formation_cc",
    &[
        ("fp", "Formation plénière de chambre"),
        ("fm", "Formation mixte"),
        ("fs", "Formation de section"),
        ("f", "Formation restreinte"),
        ("frh", "Formation restreinte hors RNSM/NA"),
        ("frr", "Formation restreinte RNSM/NA"),
    ],
    Fallback::NotSpecified,
);

/// Appeal-court seats.
pub static LOCATIONS_CA: ReferenceTable = ReferenceTable::new(
    "location_ca",
    &[
        ("ca_toulouse", "Cour d'appel de Toulouse"),
        ("ca_poitiers", "Cour d'appel de Poitiers"),
        ("ca_caen", "Cour d'appel de Caen"),
        ("ca_basse_terre", "Cour d'appel de Basse-Terre"),
        ("ca_papeete", "Cour d'appel de Papeete"),
        ("ca_douai", "Cour d'appel de Douai"),
        ("ca_aix_provence", "Cour d'appel d'Aix-en-Provence"),
        ("ca_angers", "Cour d'appel d'Angers"),
        ("ca_versailles", "Cour d'appel de Versailles"),
        ("ca_besancon", "Cour d'appel de Besançon"),
        ("ca_limoges", "Cour d'appel de Limoges"),
        ("ca_chambery", "Cour d'appel de Chambéry"),
        ("ca_pau", "Cour d'appel de Pau"),
        ("ca_paris", "Cour d'appel de Paris"),
        ("ca_lyon", "Cour d'appel de Lyon"),
        ("ca_rennes", "Cour d'appel de Rennes"),
        ("ca_colmar", "Cour d'appel de Colmar"),
        ("ca_montpellier", "Cour d'appel de Montpellier"),
        ("ca_bastia", "Cour d'appel de Bastia"),
        ("ca_bordeaux", "Cour d'appel de Bordeaux"),
        ("ca_rouen", "Cour d'appel de Rouen"),
        ("ca_nimes", "Cour d'appel de Nîmes"),
        ("ca_amiens", "Cour d'appel d'Amiens"),
        ("ca_st_denis_reunion", "Cour d'appel de Saint-Denis de la Réunion"),
        ("ca_dijon", "Cour d'appel de Dijon"),
        ("ca_nancy", "Cour d'appel de Nancy"),
        ("ca_orleans", "Cour d'appel d'Orléans"),
        ("ca_grenoble", "Cour d'appel de Grenoble"),
        ("ca_riom", "Cour d'appel de Riom"),
        ("ca_fort_de_france", "Cour d'appel de Fort-de-France"),
        ("ca_noumea", "Cour d'appel de Nouméa"),
        ("ca_metz", "Cour d'appel de Metz"),
        ("ca_bourges", "Cour d'appel de Bourges"),
        ("ca_reims", "Cour d'appel de Reims"),
        ("ca_agen", "Cour d'appel d'Agen"),
        ("ca_cayenne", "Cour d'appel de Cayenne"),
    ],
    Fallback::NotSpecified,
);

/// First-instance court seats (no curated codes yet).
pub static LOCATIONS_TJ: ReferenceTable =
    ReferenceTable::new("location_tj", &[], Fallback::NotSpecified);

/// Court-name prefixes removed to build short location names.
///
/// Order matters: `Cour d'appel de ` is a prefix of `Cour d'appel des `.
const COURT_NAME_PREFIXES: [&str; 10] = [
    "Cour d'appel des ",
    "Cour d'appel du ",
    "Cour d'appel de ",
    "Cour d'appel d'",
    "Cour d\u{2019}appel des ",
    "Cour d\u{2019}appel du ",
    "Cour d\u{2019}appel de ",
    "Cour d\u{2019}appel d\u{2019}",
    "Tribunal judiciaire de ",
    "Tribunal judiciaire d'",
];

/// Strip known court-name prefixes (`Cour d'appel de Paris` -> `Paris`).
///
/// Prefixes are removed until none matches, so applying this twice is the
/// same as applying it once. Names without a known prefix come back unchanged.
pub fn strip_court_prefix(name: &str) -> &str {
    let mut current = name;
    'outer: loop {
        for prefix in COURT_NAME_PREFIXES {
            if let Some(rest) = current.strip_prefix(prefix) {
                current = rest;
                continue 'outer;
            }
        }
        return current;
    }
}

/// Court families served by the upstream API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    /// Cour de cassation: the highest court, single seat.
    Cassation,
    /// Cours d'appel.
    Appeal,
    /// Tribunaux judiciaires.
    Judicial,
}

impl Jurisdiction {
    /// Every jurisdiction, in reference-table order.
    pub const ALL: [Jurisdiction; 3] = [Self::Cassation, Self::Appeal, Self::Judicial];

    /// Parse a raw jurisdiction code (`cc`, `ca`, `tj`), case-insensitively.
    pub fn from_code(code: Option<&str>) -> Option<Self> {
        match normalize_code(code)?.as_str() {
            "cc" => Some(Self::Cassation),
            "ca" => Some(Self::Appeal),
            "tj" => Some(Self::Judicial),
            _ => None,
        }
    }

    /// Raw upstream code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Cassation => "cc",
            Self::Appeal => "ca",
            Self::Judicial => "tj",
        }
    }

    /// Display label (matches [`JURISDICTIONS`]).
    pub fn label(self) -> &'static str {
        match self {
            Self::Cassation => "Cour de cassation",
            Self::Appeal => "Cour d'appel",
            Self::Judicial => "Tribunal judiciaire",
        }
    }

    /// Label wrapped as a category.
    pub fn category(self) -> Category {
        Category::Known(self.label().to_string())
    }

    /// True for the single-seat highest court.
    pub fn is_highest_court(self) -> bool {
        matches!(self, Self::Cassation)
    }

    /// Chamber table that applies to rows of this jurisdiction.
    pub fn chambers(self) -> &'static ReferenceTable {
        match self {
            Self::Cassation => &CHAMBERS_CC,
            Self::Appeal => &CHAMBERS_CA,
            Self::Judicial => &CHAMBERS_TJ,
        }
    }

    /// Formation table, when formations are meaningful for this jurisdiction.
    pub fn formations(self) -> Option<&'static ReferenceTable> {
        match self {
            Self::Cassation => Some(&FORMATIONS_CC),
            Self::Appeal | Self::Judicial => None,
        }
    }

    /// Location table; `None` for the highest court, whose location is fixed.
    pub fn locations(self) -> Option<&'static ReferenceTable> {
        match self {
            Self::Cassation => None,
            Self::Appeal => Some(&LOCATIONS_CA),
            Self::Judicial => Some(&LOCATIONS_TJ),
        }
    }
}

/// Category used as both court and location for the highest court.
pub fn highest_court_location() -> Category {
    Category::Known(HIGHEST_COURT_LOCATION.to_string())
}

/// Category of the highest court's jurisdiction label.
pub fn highest_court() -> Category {
    Jurisdiction::Cassation.category()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tables() -> [&'static ReferenceTable; 9] {
        [
            &SOURCES,
            &JURISDICTIONS,
            &DECISION_TYPES,
            &CHAMBERS_CC,
            &CHAMBERS_CA,
            &CHAMBERS_TJ,
            &FORMATIONS_CC,
            &LOCATIONS_CA,
            &LOCATIONS_TJ,
        ]
    }

    #[test]
    fn unknown_codes_resolve_to_documented_fallbacks() {
        let unknown = [
            Some("zz"),
            Some("CA_ATLANTIS"),
            Some("civ9"),
            Some("  "),
            Some("arret "),
            None,
        ];
        for table in all_tables() {
            for code in unknown {
                let resolution = table.resolve(code);
                if resolution.outcome == LookupOutcome::Mapped {
                    continue;
                }
                assert_eq!(
                    resolution.category,
                    table.fallback().category(),
                    "table {} code {:?}",
                    table.name(),
                    code
                );
            }
        }
        assert_eq!(SOURCES.label_for(Some("unknown")), Category::Known("Autre".into()));
        assert_eq!(JURISDICTIONS.label_for(Some("xx")), Category::NotSpecified);
        assert_eq!(DECISION_TYPES.label_for(None), Category::Known("Autre".into()));
    }

    #[test]
    fn resolve_reports_missing_and_unmapped_codes() {
        assert_eq!(DECISION_TYPES.resolve(None).outcome, LookupOutcome::Missing);
        assert_eq!(DECISION_TYPES.resolve(Some("")).outcome, LookupOutcome::Missing);
        assert_eq!(
            DECISION_TYPES.resolve(Some("decree")).outcome,
            LookupOutcome::Unmapped
        );
        let mapped = DECISION_TYPES.resolve(Some(" ARRET"));
        assert_eq!(mapped.outcome, LookupOutcome::Mapped);
        assert_eq!(mapped.category, Category::Known("Arrêt".into()));
    }

    #[test]
    fn tables_have_unique_lowercase_codes() {
        for table in all_tables() {
            let mut seen = std::collections::HashSet::new();
            for code in table.codes() {
                assert_eq!(code, code.to_ascii_lowercase(), "table {}", table.name());
                assert!(seen.insert(code), "duplicate code {code} in {}", table.name());
            }
        }
    }

    #[test]
    fn jurisdiction_enum_matches_reference_table() {
        assert_eq!(Jurisdiction::ALL.len(), JURISDICTIONS.len());
        for jurisdiction in Jurisdiction::ALL {
            assert_eq!(
                JURISDICTIONS.lookup(jurisdiction.code()),
                Some(jurisdiction.label())
            );
            assert_eq!(
                Jurisdiction::from_code(Some(jurisdiction.code())),
                Some(jurisdiction)
            );
        }
        assert_eq!(Jurisdiction::from_code(Some(" CC ")), Some(Jurisdiction::Cassation));
        assert_eq!(Jurisdiction::from_code(Some("ta")), None);
        assert!(Jurisdiction::Cassation.is_highest_court());
        assert!(Jurisdiction::Cassation.locations().is_none());
    }

    #[test]
    fn strip_court_prefix_handles_both_elisions() {
        assert_eq!(strip_court_prefix("Cour d'appel de Paris"), "Paris");
        assert_eq!(strip_court_prefix("Cour d'appel d'Aix-en-Provence"), "Aix-en-Provence");
        assert_eq!(strip_court_prefix("Cour d\u{2019}appel d\u{2019}Agen"), "Agen");
        assert_eq!(
            strip_court_prefix("Cour d'appel de Saint-Denis de la Réunion"),
            "Saint-Denis de la Réunion"
        );
    }

    #[test]
    fn strip_court_prefix_prefers_longer_prefixes() {
        assert_eq!(strip_court_prefix("Cour d'appel des Antilles"), "Antilles");
        assert_eq!(strip_court_prefix("Cour d'appel du Nord"), "Nord");
    }

    #[test]
    fn strip_court_prefix_is_idempotent() {
        let names = [
            "Cour d'appel de Paris",
            "Cour d'appel de Cour d'appel de Lyon",
            "Cour de cassation",
            "Non renseigné",
            "",
            "Paris",
        ];
        for name in names {
            let once = strip_court_prefix(name);
            assert_eq!(strip_court_prefix(once), once, "name {name:?}");
        }
        assert_eq!(strip_court_prefix("Cour de cassation"), "Cour de cassation");
        assert_eq!(strip_court_prefix("Paris"), "Paris");
    }

    #[test]
    fn every_appeal_location_has_a_short_name() {
        for (code, label) in LOCATIONS_CA.entries() {
            let short = strip_court_prefix(label);
            assert_ne!(short, *label, "location {code} kept its prefix");
            assert!(!short.is_empty());
        }
    }

    #[test]
    fn category_round_trips_through_labels() {
        assert_eq!(Category::from_label("Non renseigné"), Category::NotSpecified);
        assert_eq!(Category::NotSpecified.label(), "Non renseigné");
        assert_eq!(Category::from_label("Paris").label(), "Paris");
        assert!(Category::Known("Z".into()) < Category::NotSpecified);
        assert_eq!(Category::from(None::<String>), Category::NotSpecified);
    }
}
