/// Upstream decision identifier (unique within the canonical table).
/// Example: `61fb0c2e64e9a0f3ad2f5b1c`
pub type DecisionId = String;
/// Raw categorical code as delivered by the upstream feed.
/// Examples: `cc`, `ca_paris`, `civ1`, `arret`
pub type RawCode = String;
/// Human-readable display label resolved from a raw code.
/// Examples: `Cour de cassation`, `Paris`, `Arrêt`
pub type Label = String;
/// Taxonomy ("NAC") code for the subject matter of a civil case.
/// Examples: `00A`, `4AA`, `97E`
pub type TaxonomyCode = String;
/// Deterministic snapshot identity used for file names and cache keys.
/// Examples: `source`, `time_by_month_cc`, `nac_selected_location_ca`
pub type SnapshotName = String;
/// Column name inside a dataset.
/// Examples: `location`, `decision_date`, `n_decisions`
pub type ColumnName = String;
/// Monotonic identifier of one complete snapshot generation.
/// Example: `7`
pub type GenerationId = u64;
/// Publication flag string, one independent flag per character.
/// Examples: `b`, `br`, `bnclr`
pub type PublicationFlags = String;
