//! Parquet encoding/decoding of table rows.
//!
//! Every table is persisted as a single Parquet file whose Arrow schema is
//! derived from the table's column projection: one non-nullable column per
//! field, typed after [`ColumnType`].

use crate::error::{Result, StoreError};
use crate::gateway::Row;
use arrow::array::{Array, ArrayRef, AsArray, Float32Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Float32Type, Int32Type, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use pl_common::{ColumnType, Field, TableSchema, Value};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

fn data_type(column: ColumnType) -> DataType {
    match column {
        ColumnType::Int => DataType::Int32,
        ColumnType::Float => DataType::Float32,
        ColumnType::Text => DataType::Utf8,
    }
}

/// Arrow schema of an ordered column projection.
pub fn columns_schema(columns: &[Field]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|f| ArrowField::new(f.column_name(), data_type(f.column_type()), false))
            .collect::<Vec<_>>(),
    ))
}

/// Arrow schema of a table.
pub fn arrow_schema(schema: &TableSchema) -> SchemaRef {
    columns_schema(&schema.columns)
}

/// Build a record batch from value tuples laid out as `columns`.
pub fn values_to_batch<'a>(
    columns: &[Field],
    rows: impl IntoIterator<Item = &'a [Value]>,
) -> std::result::Result<RecordBatch, ArrowError> {
    let rows: Vec<&[Value]> = rows.into_iter().collect();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for (idx, field) in columns.iter().enumerate() {
        let cells = rows.iter().map(|r| r.get(idx));
        let array: ArrayRef = match field.column_type() {
            ColumnType::Int => Arc::new(Int32Array::from(
                cells.map(|v| v.and_then(Value::as_int)).collect::<Vec<_>>(),
            )),
            ColumnType::Float => Arc::new(Float32Array::from(
                cells.map(|v| v.and_then(Value::as_float)).collect::<Vec<_>>(),
            )),
            ColumnType::Text => Arc::new(StringArray::from(
                cells.map(|v| v.and_then(Value::as_text)).collect::<Vec<_>>(),
            )),
        };
        arrays.push(array);
    }

    RecordBatch::try_new(columns_schema(columns), arrays)
}

/// Build a record batch from stored rows.
pub fn rows_to_batch<'a>(
    schema: &TableSchema,
    rows: impl IntoIterator<Item = &'a Row>,
) -> Result<RecordBatch> {
    values_to_batch(&schema.columns, rows.into_iter().map(|r| r.values.as_slice()))
        .map_err(|e| StoreError::unavailable(format!("encode {}", schema.name), e))
}

/// Decode a record batch back into rows.
pub fn batch_to_rows(schema: &TableSchema, batch: &RecordBatch) -> Result<Vec<Row>> {
    let context = || format!("decode {}", schema.name);
    if batch.num_columns() != schema.columns.len() {
        return Err(StoreError::unavailable(
            context(),
            format!(
                "snapshot has {} columns, table has {}",
                batch.num_columns(),
                schema.columns.len()
            ),
        ));
    }

    let mut rows: Vec<Vec<Value>> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(schema.columns.len()))
        .collect();

    for (idx, field) in schema.columns.iter().enumerate() {
        let column = batch.column(idx);
        if column.null_count() > 0 {
            return Err(StoreError::unavailable(
                context(),
                format!("column {field} contains nulls"),
            ));
        }
        let mismatch = || {
            StoreError::unavailable(
                context(),
                format!("column {field} has type {}", column.data_type()),
            )
        };
        match field.column_type() {
            ColumnType::Int => {
                let values = column.as_primitive_opt::<Int32Type>().ok_or_else(mismatch)?;
                for (row, v) in rows.iter_mut().zip(values.values().iter()) {
                    row.push(Value::Int(*v));
                }
            }
            ColumnType::Float => {
                let values = column
                    .as_primitive_opt::<Float32Type>()
                    .ok_or_else(mismatch)?;
                for (row, v) in rows.iter_mut().zip(values.values().iter()) {
                    row.push(Value::Float(*v));
                }
            }
            ColumnType::Text => {
                let values = column.as_string_opt::<i32>().ok_or_else(mismatch)?;
                for (row, v) in rows.iter_mut().zip(values.iter()) {
                    row.push(Value::Text(v.unwrap_or_default().to_string()));
                }
            }
        }
    }

    Ok(rows.into_iter().map(Row::new).collect())
}

fn writer_properties(table: &str) -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("playlog".to_string()),
    };
    let table_name = KeyValue {
        key: "playlog.table".to_string(),
        value: Some(table.to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_key_value_metadata(Some(vec![created_by, table_name]))
        .build()
}

/// Write all rows of a table to `path`.
///
/// The file is written next to its destination and renamed into place so a
/// failed flush never leaves a truncated snapshot behind.
pub fn write_table<'a>(
    path: &Path,
    schema: &TableSchema,
    rows: impl IntoIterator<Item = &'a Row>,
) -> Result<()> {
    let context = || format!("write {}", path.display());
    let batch = rows_to_batch(schema, rows)?;
    let tmp = path.with_extension("parquet.tmp");

    let file = File::create(&tmp).map_err(|e| StoreError::unavailable(context(), e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties(&schema.name)))
        .map_err(|e| StoreError::unavailable(context(), e))?;
    writer
        .write(&batch)
        .map_err(|e| StoreError::unavailable(context(), e))?;
    writer
        .close()
        .map_err(|e| StoreError::unavailable(context(), e))?;

    std::fs::rename(&tmp, path).map_err(|e| StoreError::unavailable(context(), e))?;
    Ok(())
}

/// Read all rows of a table from `path`.
pub fn read_table(path: &Path, schema: &TableSchema) -> Result<Vec<Row>> {
    let context = || format!("read {}", path.display());
    let file = File::open(path).map_err(|e| StoreError::unavailable(context(), e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| StoreError::unavailable(context(), e))?
        .build()
        .map_err(|e| StoreError::unavailable(context(), e))?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| StoreError::unavailable(context(), e))?;
        rows.extend(batch_to_rows(schema, &batch)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_items() -> TableSchema {
        TableSchema::new(
            "songs_per_session_and_item",
            &[Field::SessionId, Field::ItemInSession],
            &[],
            &[
                Field::SessionId,
                Field::ItemInSession,
                Field::Artist,
                Field::SongTitle,
                Field::SongLength,
            ],
        )
    }

    fn faithless() -> Row {
        Row::new(vec![
            Value::Int(338),
            Value::Int(4),
            Value::from("Faithless"),
            Value::from("Music Matters (Mark Knight Dub)"),
            Value::Float(495.3073),
        ])
    }

    #[test]
    fn arrow_schema_follows_column_types() {
        let schema = arrow_schema(&session_items());
        assert_eq!(schema.fields().len(), 5);
        assert_eq!(schema.field(0).name(), "session_id");
        assert_eq!(schema.field(0).data_type(), &DataType::Int32);
        assert_eq!(schema.field(4).data_type(), &DataType::Float32);
        assert!(!schema.field(2).is_nullable());
    }

    #[test]
    fn parquet_file_preserves_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("songs_per_session_and_item.parquet");
        let rows = vec![faithless()];

        write_table(&path, &session_items(), &rows).unwrap();
        assert!(!path.with_extension("parquet.tmp").exists());

        let back = read_table(&path, &session_items()).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn empty_table_writes_readable_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.parquet");
        write_table(&path, &session_items(), &[]).unwrap();
        assert!(read_table(&path, &session_items()).unwrap().is_empty());
    }

    #[test]
    fn column_count_mismatch_is_unavailable() {
        let mut narrow = session_items();
        narrow.columns.pop();
        let batch = rows_to_batch(&session_items(), &[faithless()]).unwrap();
        let err = batch_to_rows(&narrow, &batch).unwrap_err();
        assert!(err.is_unavailable());
    }
}
