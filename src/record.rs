//! ACID event envelopes and zero-copy payload rows.

use std::{fmt, sync::Arc};

use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use crate::error::MergeError;

/// Number of fixed envelope columns ahead of the user payload.
pub const ENVELOPE_FIELDS: usize = 5;

/// Envelope column holding the operation code.
pub const OPERATION_COL: &str = "_op";
/// Envelope column holding the transaction that first wrote the row.
pub const ORIGINAL_TXN_COL: &str = "_original_txn";
/// Envelope column holding the bucket.
pub const BUCKET_COL: &str = "_bucket";
/// Envelope column holding the row number.
pub const ROW_ID_COL: &str = "_row_id";
/// Envelope column holding the mutating transaction.
pub const CURRENT_TXN_COL: &str = "_current_txn";

/// Mutation kind carried by an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// A new row.
    Insert = 0,
    /// A replacement of an existing row.
    Update = 1,
    /// A tombstone for an existing row.
    Delete = 2,
}

impl TryFrom<i32> for Operation {
    type Error = MergeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Operation::Insert),
            1 => Ok(Operation::Update),
            2 => Ok(Operation::Delete),
            other => Err(MergeError::UnknownOperation(other)),
        }
    }
}

/// A reference to one payload row that keeps the underlying batch alive.
///
/// The batch stays shared through the merge pipeline; consumers materialize
/// cells on demand. Payload columns start at `first_column` so that the same
/// handle serves event files (five envelope columns first) and original files
/// (payload only).
#[derive(Clone)]
pub struct RowRef {
    batch: Arc<RecordBatch>,
    row: usize,
    first_column: usize,
}

impl RowRef {
    pub(crate) fn new(batch: Arc<RecordBatch>, row: usize, first_column: usize) -> Self {
        Self {
            batch,
            row,
            first_column,
        }
    }

    /// Number of payload columns.
    pub fn columns(&self) -> usize {
        self.batch.num_columns() - self.first_column
    }

    /// Payload column `index` as an Arrow array; the row of interest is
    /// [`Self::row_index`].
    pub fn column(&self, index: usize) -> &ArrayRef {
        self.batch.column(self.first_column + index)
    }

    /// Index of this row within the arrays returned by [`Self::column`].
    pub fn row_index(&self) -> usize {
        self.row
    }
}

impl fmt::Debug for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef")
            .field("row", &self.row)
            .field("columns", &self.columns())
            .finish()
    }
}

/// One ACID event: the envelope fields plus the payload row.
#[derive(Clone, Debug)]
pub struct Event {
    /// Mutation kind.
    pub operation: Operation,
    /// Transaction that first wrote the row.
    pub original_txn: i64,
    /// Bucket the row belongs to.
    pub bucket: i32,
    /// Row number within `(original_txn, bucket)`.
    pub row_id: i64,
    /// Transaction that produced this event.
    pub current_txn: i64,
    /// The user payload.
    pub row: RowRef,
}

impl Event {
    /// Whether this event deletes its row.
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }
}

/// Extend a user schema with the five envelope columns event files carry.
pub fn event_schema(user: &SchemaRef) -> SchemaRef {
    let mut fields = vec![
        Field::new(OPERATION_COL, DataType::Int32, false),
        Field::new(ORIGINAL_TXN_COL, DataType::Int64, false),
        Field::new(BUCKET_COL, DataType::Int32, false),
        Field::new(ROW_ID_COL, DataType::Int64, false),
        Field::new(CURRENT_TXN_COL, DataType::Int64, false),
    ];
    fields.extend(user.fields().iter().map(|f| f.as_ref().clone()));
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use arrow_array::Int64Array;

    use super::*;

    #[test]
    fn operation_round_trips_known_codes() {
        assert_eq!(Operation::try_from(0).unwrap(), Operation::Insert);
        assert_eq!(Operation::try_from(1).unwrap(), Operation::Update);
        assert_eq!(Operation::try_from(2).unwrap(), Operation::Delete);
        assert!(matches!(
            Operation::try_from(3),
            Err(MergeError::UnknownOperation(3))
        ));
    }

    #[test]
    fn event_schema_prefixes_envelope_columns() {
        let user = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        let schema = event_schema(&user);

        assert_eq!(schema.fields().len(), ENVELOPE_FIELDS + 1);
        assert_eq!(schema.field(0).name(), OPERATION_COL);
        assert_eq!(schema.field(ENVELOPE_FIELDS).name(), "v");
    }

    #[test]
    fn row_ref_skips_leading_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
                Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
            ],
        )
        .unwrap();

        let row = RowRef::new(Arc::new(batch), 1, 1);
        assert_eq!(row.columns(), 1);
        let values = row
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(values.value(row.row_index()), 20);
    }
}
