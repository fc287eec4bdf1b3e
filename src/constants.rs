/// Constants used by reference-table fallbacks and sentinel labels.
pub mod labels {
    /// Literal rendering of `Category::NotSpecified`.
    pub const NOT_SPECIFIED: &str = "Non renseigné";
    /// Label produced by the `Other` fallback.
    pub const OTHER: &str = "Autre";
    /// Location and court label forced onto every highest-court decision.
    pub const HIGHEST_COURT_LOCATION: &str = "Cour de cassation";
}

/// Constants used by input discovery and default file layout.
pub mod files {
    /// Default data directory holding inputs and snapshots.
    pub const DEFAULT_DATA_DIR: &str = "data";
    /// Default raw batch file name.
    pub const DEFAULT_RAW_BATCH: &str = "full_data.parquet";
    /// Default taxonomy reference file name.
    pub const DEFAULT_TAXONOMY_FILE: &str = "nac_reference.csv";
    /// File extensions accepted as raw batch files.
    pub const RAW_BATCH_EXTENSIONS: [&str; 3] = ["parquet", "jsonl", "ndjson"];
}

/// Environment variables read by `PipelineConfig::from_env`.
pub mod env {
    /// Overrides `PipelineConfig::data_dir`.
    pub const DATA_DIR: &str = "JUDILIBRE_DATA_DIR";
    /// Overrides `PipelineConfig::raw_batch`.
    pub const RAW_BATCH: &str = "JUDILIBRE_RAW_BATCH";
    /// Overrides `PipelineConfig::taxonomy_file`.
    pub const TAXONOMY_FILE: &str = "JUDILIBRE_TAXONOMY_FILE";
    /// Overrides `PipelineConfig::snapshot_dir`.
    pub const SNAPSHOT_DIR: &str = "JUDILIBRE_SNAPSHOT_DIR";
    /// Overrides `PipelineConfig::duplicate_policy` (`first_seen` or `latest_update`).
    pub const DUPLICATE_POLICY: &str = "JUDILIBRE_DUPLICATE_POLICY";
}

/// Column names shared by the canonical table and every aggregate.
pub mod columns {
    pub const SOURCE: &str = "source";
    pub const JURISDICTION: &str = "jurisdiction";
    pub const COURT: &str = "court";
    pub const LOCATION: &str = "location";
    pub const NAC: &str = "nac";
    pub const NAC_TITLE: &str = "nac_title";
    pub const NAC_LEVEL1_CODE: &str = "nac_level1_code";
    pub const NAC_LEVEL1_LABEL: &str = "nac_level1_label";
    pub const NAC_LEVEL2_LABEL: &str = "nac_level2_label";
    pub const CHAMBER: &str = "chamber";
    pub const FORMATION: &str = "formation";
    pub const TYPE: &str = "type";
    pub const PUBLICATION: &str = "publication";
    pub const DECISION_YEAR: &str = "decision_year";
    pub const DECISION_MONTH: &str = "decision_month";
    pub const DECISION_DATE: &str = "decision_date";
    pub const N_DECISIONS: &str = "n_decisions";
    pub const N_DECISIONS_SMOOTHED: &str = "n_decisions_smoothed";
}

/// Constants used by the aggregation stage.
pub mod aggregation {
    /// Window of the centered rolling mean applied to the monthly series.
    pub const SMOOTHING_WINDOW: usize = 12;
    /// Publication flag characters kept after exploding the flag string.
    pub const PUBLICATION_FLAGS: [char; 5] = ['b', 'n', 'c', 'l', 'r'];
}

/// Constants used by snapshot persistence.
pub mod snapshot {
    /// Extension of snapshot files.
    pub const EXTENSION: &str = "parquet";
    /// Generation manifest file name, written last in every refresh.
    pub const MANIFEST_FILENAME: &str = "snapshots.json";
    /// Snapshot name under which the canonical table is persisted.
    pub const CANONICAL_SNAPSHOT: &str = "canonical";
    /// Parquet key-value metadata entry holding the JSON column list.
    pub const SCHEMA_METADATA_KEY: &str = "judilibre.columns";
    /// Parquet key-value metadata entry holding the generation id.
    pub const GENERATION_METADATA_KEY: &str = "judilibre.generation";
    /// Suffix appended to staging files before they are renamed into place.
    pub const STAGING_SUFFIX: &str = "tmp";
    /// Parquet message name used for every snapshot schema.
    pub const MESSAGE_NAME: &str = "snapshot";
    /// Days between 0001-01-01 (CE day 1) and the Unix epoch.
    pub const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;
    /// Prefix of per-generation snapshot directories (`gen-7`).
    pub const GENERATION_DIR_PREFIX: &str = "gen-";
    /// Generation directories kept on disk: the current one and its predecessor.
    pub const RETAINED_GENERATIONS: u64 = 2;
    /// Attempts made by the cache when a refresh lands mid-load.
    pub const CACHE_LOAD_ATTEMPTS: usize = 3;
}
