//! Row-at-a-time streams over the Parquet batch reader.

use std::sync::Arc;

use arrow_array::{Int32Array, Int64Array, RecordBatch};
use futures::StreamExt;
use parquet::arrow::async_reader::ParquetRecordBatchStream;

use super::ScanProgress;
use crate::{
    error::MergeError,
    record::{
        BUCKET_COL, CURRENT_TXN_COL, ENVELOPE_FIELDS, Event, OPERATION_COL, ORIGINAL_TXN_COL,
        Operation, ROW_ID_COL, RowRef,
    },
};

type BatchStream = ParquetRecordBatchStream<tokio::fs::File>;

/// Sequential reader over an event file: decodes the envelope of every row
/// and yields owned [`Event`]s backed by the shared batch.
pub struct EventStream {
    stream: BatchStream,
    current: Option<EventBatch>,
    payload_columns: usize,
    progress: ScanProgress,
}

impl EventStream {
    pub(crate) fn new(stream: BatchStream, progress: ScanProgress) -> Result<Self, MergeError> {
        let fields = stream.schema().fields().len();
        if fields < ENVELOPE_FIELDS {
            return Err(MergeError::Metadata(format!(
                "event file has {fields} columns, fewer than the envelope"
            )));
        }
        Ok(Self {
            stream,
            current: None,
            payload_columns: fields - ENVELOPE_FIELDS,
            progress,
        })
    }

    /// Number of payload columns behind the envelope.
    pub fn payload_columns(&self) -> usize {
        self.payload_columns
    }

    /// Shared progress handle for this scan.
    pub fn progress(&self) -> ScanProgress {
        self.progress.clone()
    }

    /// The next event, or `None` once the selection is exhausted.
    pub async fn next(&mut self) -> Result<Option<Event>, MergeError> {
        loop {
            if let Some(current) = self.current.as_mut() {
                if current.next_row < current.batch.num_rows() {
                    let row = current.next_row;
                    current.next_row += 1;
                    self.progress.add(1);
                    return Ok(Some(current.event(row)?));
                }
            }
            match self.stream.next().await.transpose()? {
                Some(batch) => self.current = Some(EventBatch::decode(batch)?),
                None => return Ok(None),
            }
        }
    }
}

/// One batch of an event file with its envelope columns downcast once.
struct EventBatch {
    batch: Arc<RecordBatch>,
    operation: Int32Array,
    original_txn: Int64Array,
    bucket: Int32Array,
    row_id: Int64Array,
    current_txn: Int64Array,
    next_row: usize,
}

impl EventBatch {
    fn decode(batch: RecordBatch) -> Result<Self, MergeError> {
        let operation = int32_column(&batch, 0, OPERATION_COL)?;
        let original_txn = int64_column(&batch, 1, ORIGINAL_TXN_COL)?;
        let bucket = int32_column(&batch, 2, BUCKET_COL)?;
        let row_id = int64_column(&batch, 3, ROW_ID_COL)?;
        let current_txn = int64_column(&batch, 4, CURRENT_TXN_COL)?;
        Ok(Self {
            batch: Arc::new(batch),
            operation,
            original_txn,
            bucket,
            row_id,
            current_txn,
            next_row: 0,
        })
    }

    fn event(&self, row: usize) -> Result<Event, MergeError> {
        Ok(Event {
            operation: Operation::try_from(self.operation.value(row))?,
            original_txn: self.original_txn.value(row),
            bucket: self.bucket.value(row),
            row_id: self.row_id.value(row),
            current_txn: self.current_txn.value(row),
            row: RowRef::new(Arc::clone(&self.batch), row, ENVELOPE_FIELDS),
        })
    }
}

fn int32_column(batch: &RecordBatch, index: usize, name: &str) -> Result<Int32Array, MergeError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Int32Array>()
        .cloned()
        .ok_or_else(|| MergeError::Metadata(format!("envelope column {name} is not Int32")))
}

fn int64_column(batch: &RecordBatch, index: usize, name: &str) -> Result<Int64Array, MergeError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| MergeError::Metadata(format!("envelope column {name} is not Int64")))
}

/// Sequential reader over an original file: yields raw payload rows with
/// their file-global row numbers.
pub struct RowStream {
    stream: BatchStream,
    current: Option<(Arc<RecordBatch>, usize)>,
    next_row_number: u64,
    columns: usize,
    progress: ScanProgress,
}

impl RowStream {
    pub(crate) fn new(stream: BatchStream, start_row: u64, progress: ScanProgress) -> Self {
        let columns = stream.schema().fields().len();
        Self {
            stream,
            current: None,
            next_row_number: start_row,
            columns,
            progress,
        }
    }

    /// Number of columns in the file (all payload).
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Shared progress handle for this scan.
    pub fn progress(&self) -> ScanProgress {
        self.progress.clone()
    }

    /// The next `(file_row_number, row)`, or `None` at the end of the
    /// selection.
    pub async fn next(&mut self) -> Result<Option<(i64, RowRef)>, MergeError> {
        loop {
            if let Some((batch, next_row)) = self.current.as_mut() {
                if *next_row < batch.num_rows() {
                    let row = *next_row;
                    *next_row += 1;
                    let row_number = self.next_row_number as i64;
                    self.next_row_number += 1;
                    self.progress.add(1);
                    return Ok(Some((row_number, RowRef::new(Arc::clone(batch), row, 0))));
                }
            }
            match self.stream.next().await.transpose()? {
                Some(batch) => self.current = Some((Arc::new(batch), 0)),
                None => return Ok(None),
            }
        }
    }
}
