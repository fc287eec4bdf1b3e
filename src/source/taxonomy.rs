//! Taxonomy reference table loader (`.csv` or `.jsonl`).

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::data::{TaxonomyEntry, TaxonomyTable};
use crate::errors::MonitorError;
use crate::transport::fs::{has_extension, read_lines_lossy};
use crate::utils::{normalize_label, normalize_taxonomy_code};

/// Accepted header names per taxonomy field (English, then French).
const CODE_HEADERS: [&str; 2] = ["code", "Code NAC"];
const LEVEL1_CODE_HEADERS: [&str; 2] = ["level1_code", "N1"];
const LEVEL1_LABEL_HEADERS: [&str; 2] = ["level1_label", "Niveau 1"];
const LEVEL2_LABEL_HEADERS: [&str; 2] = ["level2_label", "Niveau 2"];
const TITLE_HEADERS: [&str; 2] = ["title", "Intitulé NAC"];

#[derive(Deserialize)]
struct TaxonomyLine {
    code: Option<String>,
    level1_code: Option<String>,
    level1_label: Option<String>,
    level2_label: Option<String>,
    title: Option<String>,
}

/// Load the taxonomy table wholesale.
///
/// Duplicate codes keep their first entry; rows without a code are skipped.
pub fn load_taxonomy(path: &Path) -> Result<TaxonomyTable, MonitorError> {
    if !path.is_file() {
        return Err(MonitorError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let entries = if has_extension(path, &["jsonl", "ndjson"]) {
        read_jsonl_entries(path)?
    } else {
        read_csv_entries(path)?
    };
    let (table, duplicates) = TaxonomyTable::from_entries(entries);
    if duplicates > 0 {
        warn!(
            "[judilibre:source] taxonomy {} repeats {} code(s); first entry kept",
            path.display(),
            duplicates
        );
    }
    info!(
        "[judilibre:source] taxonomy loaded from {} ({} codes)",
        path.display(),
        table.len()
    );
    Ok(table)
}

fn entry_from_fields(
    code: Option<&str>,
    level1_code: Option<&str>,
    level1_label: Option<&str>,
    level2_label: Option<&str>,
    title: Option<&str>,
) -> Option<TaxonomyEntry> {
    Some(TaxonomyEntry {
        code: normalize_taxonomy_code(code)?,
        level1_code: normalize_label(level1_code),
        level1_label: normalize_label(level1_label),
        level2_label: normalize_label(level2_label),
        title: normalize_label(title),
    })
}

fn read_csv_entries(path: &Path) -> Result<Vec<TaxonomyEntry>, MonitorError> {
    let format_error = |reason: String| MonitorError::InputFormat {
        path: path.to_path_buf(),
        reason,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| format_error(format!("failed opening csv: {err}")))?;
    let headers = reader
        .headers()
        .map_err(|err| format_error(format!("failed reading csv header: {err}")))?
        .clone();
    let find = |aliases: &[&str]| {
        headers.iter().position(|header| {
            let header = header.trim_start_matches('\u{feff}');
            aliases.iter().any(|alias| header.eq_ignore_ascii_case(alias))
        })
    };
    let code_index = find(&CODE_HEADERS)
        .ok_or_else(|| format_error("taxonomy csv has no code column".to_string()))?;
    let level1_code_index = find(&LEVEL1_CODE_HEADERS);
    let level1_label_index = find(&LEVEL1_LABEL_HEADERS);
    let level2_label_index = find(&LEVEL2_LABEL_HEADERS);
    let title_index = find(&TITLE_HEADERS);

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => {
                return Err(format_error(format!("failed reading csv row {}: {err}", line + 1)));
            }
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let field = |index: Option<usize>| index.and_then(|index| record.get(index));
        if let Some(entry) = entry_from_fields(
            record.get(code_index),
            field(level1_code_index),
            field(level1_label_index),
            field(level2_label_index),
            field(title_index),
        ) {
            entries.push(entry);
        }
    }
    if skipped > 0 {
        warn!(
            "[judilibre:source] taxonomy {} has {} undecodable row(s); skipped",
            path.display(),
            skipped
        );
    }
    Ok(entries)
}

fn read_jsonl_entries(path: &Path) -> Result<Vec<TaxonomyEntry>, MonitorError> {
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for line in read_lines_lossy(path)? {
        if line.as_deref().is_some_and(|text| text.trim().is_empty()) {
            continue;
        }
        let Some(parsed) = line.and_then(|text| serde_json::from_str::<TaxonomyLine>(&text).ok())
        else {
            skipped += 1;
            continue;
        };
        if let Some(entry) = entry_from_fields(
            parsed.code.as_deref(),
            parsed.level1_code.as_deref(),
            parsed.level1_label.as_deref(),
            parsed.level2_label.as_deref(),
            parsed.title.as_deref(),
        ) {
            entries.push(entry);
        }
    }
    if skipped > 0 {
        warn!(
            "[judilibre:source] taxonomy {} has {} undecodable line(s); skipped",
            path.display(),
            skipped
        );
    }
    Ok(entries)
}
