//! Parquet encoding of [`Dataset`] values.
//!
//! The column list with kinds travels in the file key-value metadata, so a
//! decode restores the exact column kinds even where parquet's own types are
//! ambiguous (required vs optional text, integer vs year).

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int32Type, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::format::KeyValue;
use parquet::record::Field;
use parquet::schema::parser::parse_message_type;

use crate::constants::snapshot::{
    GENERATION_METADATA_KEY, MESSAGE_NAME, SCHEMA_METADATA_KEY, UNIX_EPOCH_DAYS_FROM_CE,
};
use crate::errors::MonitorError;
use crate::frame::{Cell, ColumnKind, ColumnSpec, Dataset};
use crate::types::GenerationId;

/// A decoded snapshot file.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotFile {
    pub dataset: Dataset,
    /// Generation stamped at write time, if any.
    pub generation: Option<GenerationId>,
}

fn codec_error(context: &str, err: impl std::fmt::Display) -> MonitorError {
    MonitorError::Codec(format!("{context}: {err}"))
}

fn is_valid_column_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn message_type(columns: &[ColumnSpec]) -> Result<String, MonitorError> {
    let mut message = format!("message {MESSAGE_NAME} {{\n");
    for column in columns {
        if !is_valid_column_name(&column.name) {
            return Err(MonitorError::Schema(format!(
                "column name '{}' cannot be stored",
                column.name
            )));
        }
        let line = match column.kind {
            ColumnKind::Text => format!("REQUIRED BINARY {} (UTF8);", column.name),
            ColumnKind::OptionalText => format!("OPTIONAL BINARY {} (UTF8);", column.name),
            ColumnKind::Date => format!("REQUIRED INT32 {} (DATE);", column.name),
            ColumnKind::Integer => format!("REQUIRED INT64 {};", column.name),
            ColumnKind::OptionalFloat => format!("OPTIONAL DOUBLE {};", column.name),
        };
        message.push_str(&line);
        message.push('\n');
    }
    message.push('}');
    Ok(message)
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Encode `dataset` as one parquet file into `writer`.
pub fn encode<W: Write + Send>(
    writer: W,
    dataset: &Dataset,
    generation: Option<GenerationId>,
) -> Result<(), MonitorError> {
    let schema = Arc::new(
        parse_message_type(&message_type(dataset.columns())?)
            .map_err(|err| codec_error("invalid snapshot schema", err))?,
    );
    let columns_json = serde_json::to_string(dataset.columns())
        .map_err(|err| codec_error("failed encoding column metadata", err))?;
    let mut metadata = vec![KeyValue {
        key: SCHEMA_METADATA_KEY.to_string(),
        value: Some(columns_json),
    }];
    if let Some(generation) = generation {
        metadata.push(KeyValue {
            key: GENERATION_METADATA_KEY.to_string(),
            value: Some(generation.to_string()),
        });
    }
    let props = Arc::new(
        WriterProperties::builder()
            .set_key_value_metadata(Some(metadata))
            .build(),
    );
    let mut file_writer = SerializedFileWriter::new(writer, schema, props)
        .map_err(|err| codec_error("failed creating parquet writer", err))?;

    if !dataset.is_empty() {
        let mut row_group = file_writer
            .next_row_group()
            .map_err(|err| codec_error("failed opening row group", err))?;
        let mut index = 0usize;
        while let Some(mut col_writer) = row_group
            .next_column()
            .map_err(|err| codec_error("failed opening column", err))?
        {
            let column = &dataset.columns()[index];
            let cells: Vec<&Cell> = dataset.rows().iter().map(|row| &row[index]).collect();
            let definition: Vec<i16> = cells.iter().map(|cell| i16::from(!cell.is_null())).collect();
            let written = match column.kind {
                ColumnKind::Text | ColumnKind::OptionalText => {
                    let values: Vec<ByteArray> = cells
                        .iter()
                        .filter_map(|cell| cell.as_text())
                        .map(ByteArray::from)
                        .collect();
                    let levels = (column.kind == ColumnKind::OptionalText).then_some(&definition[..]);
                    col_writer
                        .typed::<ByteArrayType>()
                        .write_batch(&values, levels, None)
                }
                ColumnKind::Date => {
                    let values: Vec<i32> = cells
                        .iter()
                        .filter_map(|cell| cell.as_date())
                        .map(days_since_epoch)
                        .collect();
                    col_writer.typed::<Int32Type>().write_batch(&values, None, None)
                }
                ColumnKind::Integer => {
                    let values: Vec<i64> = cells.iter().filter_map(|cell| cell.as_integer()).collect();
                    col_writer.typed::<Int64Type>().write_batch(&values, None, None)
                }
                ColumnKind::OptionalFloat => {
                    let values: Vec<f64> = cells.iter().filter_map(|cell| cell.as_float()).collect();
                    col_writer
                        .typed::<DoubleType>()
                        .write_batch(&values, Some(&definition), None)
                }
            };
            written.map_err(|err| codec_error(&format!("failed writing column '{}'", column.name), err))?;
            col_writer
                .close()
                .map_err(|err| codec_error("failed closing column", err))?;
            index += 1;
        }
        row_group
            .close()
            .map_err(|err| codec_error("failed closing row group", err))?;
    }
    file_writer
        .close()
        .map_err(|err| codec_error("failed finishing parquet file", err))?;
    Ok(())
}

fn cell_from_field(field: &Field) -> Result<Cell, MonitorError> {
    Ok(match field {
        Field::Null => Cell::Null,
        Field::Str(text) => Cell::Text(text.clone()),
        Field::Date(days) => Cell::Date(
            date_from_days(*days)
                .ok_or_else(|| MonitorError::Codec(format!("date out of range: {days} days")))?,
        ),
        Field::Long(value) => Cell::Integer(*value),
        Field::Double(value) => Cell::Float(*value),
        other => {
            return Err(MonitorError::Codec(format!(
                "unsupported parquet value {other:?}"
            )));
        }
    })
}

/// Decode a snapshot file written by [`encode`].
pub fn decode(path: &Path) -> Result<SnapshotFile, MonitorError> {
    let context = path.display().to_string();
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|err| codec_error(&format!("failed opening {context}"), err))?;

    let key_values = reader
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .cloned()
        .unwrap_or_default();
    let lookup = |key: &str| {
        key_values
            .iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.clone())
    };
    let columns_json = lookup(SCHEMA_METADATA_KEY).ok_or_else(|| {
        MonitorError::Schema(format!("{context} carries no snapshot column metadata"))
    })?;
    let columns: Vec<ColumnSpec> = serde_json::from_str(&columns_json)
        .map_err(|err| codec_error(&format!("invalid column metadata in {context}"), err))?;
    let generation = match lookup(GENERATION_METADATA_KEY) {
        Some(value) => Some(value.parse::<GenerationId>().map_err(|err| {
            codec_error(&format!("invalid generation metadata in {context}"), err)
        })?),
        None => None,
    };

    let mut dataset = Dataset::new(columns);
    let rows = reader
        .get_row_iter(None)
        .map_err(|err| codec_error(&format!("failed iterating {context}"), err))?;
    for row in rows {
        let row = row.map_err(|err| codec_error(&format!("failed reading row of {context}"), err))?;
        let cells = row
            .get_column_iter()
            .map(|(_, field)| cell_from_field(field))
            .collect::<Result<Vec<_>, _>>()?;
        dataset.push_row(cells)?;
    }
    Ok(SnapshotFile {
        dataset,
        generation,
    })
}
