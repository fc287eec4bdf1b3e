//! Raw batch file readers and writers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use serde_json::Value;
use tracing::{debug, warn};

use crate::data::{RawBatch, RawDecision};
use crate::errors::MonitorError;
use crate::transport::fs::{
    commit_staged, discard_staged, has_extension, read_lines_lossy, write_staged,
};

/// Decode one batch file, picking the reader from its extension.
pub fn read_batch_file(path: &Path) -> Result<RawBatch, MonitorError> {
    if !path.is_file() {
        return Err(MonitorError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let batch = if has_extension(path, &["parquet"]) {
        read_parquet_batch(path)?
    } else if has_extension(path, &["jsonl", "ndjson"]) {
        read_jsonl_batch(path)?
    } else {
        return Err(MonitorError::InputFormat {
            path: path.to_path_buf(),
            reason: "unsupported batch extension (expected parquet, jsonl, or ndjson)".to_string(),
        });
    };
    if batch.malformed_rows > 0 {
        warn!(
            "[judilibre:source] skipped {} malformed row(s) in {}",
            batch.malformed_rows,
            path.display()
        );
    }
    debug!(
        "[judilibre:source] decoded {} row(s) from {}",
        batch.len(),
        path.display()
    );
    Ok(batch)
}

fn decode_row(value: Value) -> Option<RawDecision> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Read parquet rows through their JSON view.
pub fn read_parquet_batch(path: &Path) -> Result<RawBatch, MonitorError> {
    let format_error = |reason: String| MonitorError::InputFormat {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|err| format_error(format!("failed opening parquet: {err}")))?;
    let rows = reader
        .get_row_iter(None)
        .map_err(|err| format_error(format!("failed iterating parquet rows: {err}")))?;

    let mut batch = RawBatch::default();
    for (position, row) in rows.enumerate() {
        let row = row.map_err(|err| format_error(format!("failed reading parquet row {position}: {err}")))?;
        match decode_row(row.to_json_value()) {
            Some(decision) => batch.decisions.push(decision),
            None => batch.malformed_rows += 1,
        }
    }
    Ok(batch)
}

/// Read one JSON object per line; blank lines are ignored.
///
/// Lines that are not valid UTF-8 or not a JSON object count as malformed.
pub fn read_jsonl_batch(path: &Path) -> Result<RawBatch, MonitorError> {
    let mut batch = RawBatch::default();
    for (line_number, line) in read_lines_lossy(path)?.into_iter().enumerate() {
        if line.as_deref().is_some_and(|text| text.trim().is_empty()) {
            continue;
        }
        let decoded = line
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .and_then(decode_row);
        match decoded {
            Some(decision) => batch.decisions.push(decision),
            None => {
                debug!(
                    "[judilibre:source] malformed row at {}:{}",
                    path.display(),
                    line_number + 1
                );
                batch.malformed_rows += 1;
            }
        }
    }
    Ok(batch)
}

/// Write decisions as a JSONL batch file, atomically replacing `path`.
pub fn write_jsonl_batch(path: &Path, decisions: &[RawDecision]) -> Result<(), MonitorError> {
    let staging = write_staged(path, |file| {
        let mut writer = BufWriter::new(file);
        for decision in decisions {
            serde_json::to_writer(&mut writer, decision)
                .map_err(|err| MonitorError::Codec(format!("failed encoding decision: {err}")))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    })?;
    if let Err(err) = commit_staged(&staging, path) {
        discard_staged([staging.as_path()]);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawDate;
    use parquet::data_type::{ByteArray, ByteArrayType, Int32Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_parquet_fixture(path: &Path, rows: &[(&str, &str, i32)]) {
        let schema = Arc::new(
            parse_message_type(
                "message raw_schema {
                    REQUIRED BINARY id (UTF8);
                    REQUIRED BINARY jurisdiction (UTF8);
                    REQUIRED INT32 decision_date (DATE);
                }",
            )
            .unwrap(),
        );
        let props = Arc::new(WriterProperties::builder().build());
        let file = File::create(path).unwrap();
        let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();
        let mut row_group = writer.next_row_group().unwrap();

        for column in 0..2 {
            let mut col_writer = row_group.next_column().unwrap().unwrap();
            let values = rows
                .iter()
                .map(|row| ByteArray::from(if column == 0 { row.0 } else { row.1 }))
                .collect::<Vec<_>>();
            col_writer
                .typed::<ByteArrayType>()
                .write_batch(&values, None, None)
                .unwrap();
            col_writer.close().unwrap();
        }

        let mut col_writer = row_group.next_column().unwrap().unwrap();
        let days = rows.iter().map(|row| row.2).collect::<Vec<_>>();
        col_writer
            .typed::<Int32Type>()
            .write_batch(&days, None, None)
            .unwrap();
        col_writer.close().unwrap();

        assert!(row_group.next_column().unwrap().is_none());
        row_group.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn parquet_rows_decode_through_json_view() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("full_data.parquet");
        // 18262 days after the epoch is 2020-01-01.
        write_parquet_fixture(&path, &[("A", "cc", 18_262), ("B", "ca", 18_263)]);

        let batch = read_batch_file(&path).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.malformed_rows, 0);
        assert_eq!(batch.decisions[0].id.as_deref(), Some("A"));
        assert_eq!(
            batch.decisions[1].decision_date,
            Some(RawDate::Text("2020-01-02".to_string()))
        );
    }

    #[test]
    fn jsonl_counts_malformed_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("batch.jsonl");
        fs::write(
            &path,
            "{\"id\":\"A\",\"jurisdiction\":\"cc\"}\n\nnot json\n[1,2]\n{\"id\":\"B\"}\n",
        )
        .unwrap();
        let batch = read_batch_file(&path).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.malformed_rows, 2);
    }

    #[test]
    fn invalid_utf8_line_is_skipped_as_malformed() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("batch.jsonl");
        fs::write(&path, b"{\"id\":\"A\"}\n\xff\xfe\n{\"id\":\"B\"}\n").unwrap();
        let batch = read_batch_file(&path).unwrap();
        let ids: Vec<_> = batch
            .decisions
            .iter()
            .filter_map(|decision| decision.id.as_deref())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(batch.malformed_rows, 1);
    }

    #[test]
    fn jsonl_writer_output_reads_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("batch.jsonl");
        let decisions = vec![RawDecision {
            id: Some("A".into()),
            jurisdiction: Some("cc".into()),
            decision_date: Some(RawDate::Epoch(1_577_836_800_000)),
            publication: Some("br".into()),
            ..RawDecision::default()
        }];
        write_jsonl_batch(&path, &decisions).unwrap();
        assert_eq!(read_batch_file(&path).unwrap().decisions, decisions);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("batch.csv");
        fs::write(&path, "id\nA\n").unwrap();
        assert!(matches!(
            read_batch_file(&path),
            Err(MonitorError::InputFormat { .. })
        ));
    }
}
