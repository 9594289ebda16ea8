//! Composite sort keys that give heterogeneous event sources one total order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Identity of a logical row across its whole history: the transaction that
/// first wrote it, the bucket it hashes to, and its row number within that
/// transaction/bucket pair. Ordered lexicographically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Transaction that originally inserted the row.
    pub original_txn: i64,
    /// Hash bucket the row belongs to.
    pub bucket: i32,
    /// Row number within `(original_txn, bucket)`.
    pub row_id: i64,
}

impl RecordId {
    /// Build a row identity.
    pub fn new(original_txn: i64, bucket: i32, row_id: i64) -> Self {
        Self {
            original_txn,
            bucket,
            row_id,
        }
    }
}

/// A [`RecordId`] extended with the mutating transaction and statement.
///
/// This is the key of the merge sort: `original_txn`, `bucket`, and `row_id`
/// ascending, then `current_txn` and `statement_id` descending. With several
/// events touching the same row, the latest mutation sorts first, so a
/// collapsing consumer emits the head of each run and skips the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MergeKey {
    /// Row identity shared by every version of the row.
    pub record: RecordId,
    /// Transaction that produced this event.
    pub current_txn: i64,
    /// Ordinal of the statement within `current_txn`. 0 when not applicable.
    pub statement_id: i32,
}

impl MergeKey {
    /// Build a merge key from its five components.
    pub fn new(
        original_txn: i64,
        bucket: i32,
        row_id: i64,
        current_txn: i64,
        statement_id: i32,
    ) -> Self {
        Self {
            record: RecordId::new(original_txn, bucket, row_id),
            current_txn,
            statement_id,
        }
    }

    /// Compare only the row identity, ignoring the mutating transaction.
    pub fn cmp_row(&self, other: &RecordId) -> Ordering {
        self.record.cmp(other)
    }

    /// Whether one transaction touched the same row more than once. Only
    /// multi-statement transactions can make this true for distinct events.
    pub fn same_row(&self, other: &MergeKey) -> bool {
        self.record == other.record && self.current_txn == other.current_txn
    }
}

impl Ord for MergeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .cmp(&other.record)
            .then_with(|| other.current_txn.cmp(&self.current_txn))
            .then_with(|| other.statement_id.cmp(&self.statement_id))
    }
}

impl PartialOrd for MergeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq<RecordId> for MergeKey {
    fn eq(&self, _other: &RecordId) -> bool {
        false
    }
}

/// A bare [`RecordId`] equal on the row identity sorts *after* any
/// [`MergeKey`] with that identity; the merge key always ranks lower.
impl PartialOrd<RecordId> for MergeKey {
    fn partial_cmp(&self, other: &RecordId) -> Option<Ordering> {
        match self.record.cmp(other) {
            Ordering::Equal => Some(Ordering::Less),
            ordering => Some(ordering),
        }
    }
}

/// Key window of one split: an open lower bound and a closed upper bound,
/// both optional, both compared on the row identity alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyInterval {
    /// Exclusive lower bound; `None` means unbounded below.
    pub min: Option<RecordId>,
    /// Inclusive upper bound; `None` means unbounded above.
    pub max: Option<RecordId>,
}

impl KeyInterval {
    /// Build an interval from optional bounds.
    pub fn new(min: Option<RecordId>, max: Option<RecordId>) -> Self {
        Self { min, max }
    }

    /// Whether the row identity falls inside `(min, max]`.
    pub fn contains(&self, record: &RecordId) -> bool {
        self.min.map_or(true, |min| *record > min) && self.max.map_or(true, |max| *record <= max)
    }
}
