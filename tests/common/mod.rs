//! Test fixtures: write event files, original files, and delta directories
//! the way the table writer lays them out.
#![allow(dead_code)]

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow_array::{ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::{
    arrow::arrow_writer::ArrowWriter, file::properties::WriterProperties, format::KeyValue,
};
use strata::{
    Event, Operation, RecordId,
    layout,
    ondisk::metadata::{ACID_STATS_META, AcidStats, KEY_INDEX_META, encode_key_index},
    record::event_schema,
};

/// One event destined for an event file.
#[derive(Clone, Debug)]
pub struct EventRow {
    pub op: Operation,
    pub original_txn: i64,
    pub bucket: i32,
    pub row_id: i64,
    pub current_txn: i64,
    pub v: String,
    pub n: i64,
}

/// Shorthand for an event whose numeric payload mirrors its row id.
pub fn ev(
    op: Operation,
    original_txn: i64,
    bucket: i32,
    row_id: i64,
    current_txn: i64,
    v: &str,
) -> EventRow {
    EventRow {
        op,
        original_txn,
        bucket,
        row_id,
        current_txn,
        v: v.to_string(),
        n: row_id,
    }
}

/// The payload schema every fixture uses: a string and an i64.
pub fn user_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("v", DataType::Utf8, false),
        Field::new("n", DataType::Int64, false),
    ]))
}

/// Write an event file with `group_size` rows per stripe, a key index, and
/// ACID stats derived from the events.
pub fn write_event_file(path: &Path, rows: &[EventRow], group_size: usize) {
    let schema = event_schema(&user_schema());
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int32Array::from_iter_values(
                rows.iter().map(|r| r.op as i32),
            )) as ArrayRef,
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.original_txn),
            )),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.bucket))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.row_id))),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.current_txn),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.v.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.n))),
        ],
    )
    .expect("event batch");

    let key_index: Vec<RecordId> = rows
        .chunks(group_size)
        .map(|chunk| {
            let last = chunk.last().expect("non-empty stripe");
            RecordId::new(last.original_txn, last.bucket, last.row_id)
        })
        .collect();
    let mut stats = AcidStats::default();
    for row in rows {
        match row.op {
            Operation::Insert => stats.inserts += 1,
            Operation::Update => stats.updates += 1,
            Operation::Delete => stats.deletes += 1,
        }
    }

    let props = WriterProperties::builder()
        .set_max_row_group_size(group_size)
        .set_key_value_metadata(Some(vec![
            KeyValue {
                key: KEY_INDEX_META.to_string(),
                value: Some(encode_key_index(&key_index)),
            },
            KeyValue {
                key: ACID_STATS_META.to_string(),
                value: Some(stats.serialize()),
            },
        ]))
        .build();
    let file = File::create(path).expect("create event file");
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).expect("writer");
    writer.write(&batch).expect("write");
    writer.close().expect("close");
}

/// Write a pre-acid file holding bare payload rows.
pub fn write_original_file(path: &Path, values: &[(&str, i64)], group_size: usize) {
    let schema = user_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(values.iter().map(|(v, _)| *v))) as ArrayRef,
            Arc::new(Int64Array::from_iter_values(values.iter().map(|(_, n)| *n))),
        ],
    )
    .expect("original batch");

    let props = WriterProperties::builder()
        .set_max_row_group_size(group_size)
        .build();
    let file = File::create(path).expect("create original file");
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).expect("writer");
    writer.write(&batch).expect("write");
    writer.close().expect("close");
}

/// Create a delta directory under `root` and write its bucket file.
/// Returns the directory path.
pub fn write_delta(
    root: &Path,
    bucket: i32,
    min_txn: i64,
    max_txn: i64,
    statement_id: Option<i32>,
    rows: &[EventRow],
) -> PathBuf {
    let dir = root.join(layout::delta_dir_name(min_txn, max_txn, statement_id));
    std::fs::create_dir_all(&dir).expect("delta dir");
    write_event_file(&layout::bucket_file(&dir, bucket), rows, 1024);
    dir
}

/// The string payload of an emitted event.
pub fn value_of(event: &Event) -> String {
    event
        .row
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("string payload")
        .value(event.row.row_index())
        .to_string()
}
