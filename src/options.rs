//! Options describing what to read and how the split was produced.

use std::{path::PathBuf, sync::Arc};

use crate::{record::ENVELOPE_FIELDS, txn::TxnVisibility};

/// How to read one file: the byte range of the split, the payload columns to
/// project, and an optional pruning predicate.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    pub(crate) offset: u64,
    pub(crate) max_offset: u64,
    pub(crate) projection: Option<Vec<usize>>,
    pub(crate) predicate: Option<Predicate>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            max_offset: u64::MAX,
            projection: None,
            predicate: None,
        }
    }
}

impl ReadOptions {
    /// Restrict reading to stripes starting within `[offset, max_offset)`.
    pub fn with_range(mut self, offset: u64, max_offset: u64) -> Self {
        self.offset = offset;
        self.max_offset = max_offset;
        self
    }

    /// Project only the given payload columns (indices into the user schema).
    pub fn with_projection(mut self, projection: Vec<usize>) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Prune stripes whose statistics cannot match the predicate.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Start of the byte range.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Exclusive end of the byte range.
    pub fn max_offset(&self) -> u64 {
        self.max_offset
    }

    /// Translate row-level options into event-level options: events are
    /// clipped by key bounds rather than the byte range, so the upper bound
    /// opens up, and payload column indices slide past the envelope.
    pub fn event_options(&self) -> Self {
        Self {
            offset: self.offset,
            max_offset: u64::MAX,
            projection: self
                .projection
                .as_ref()
                .map(|cols| cols.iter().map(|c| c + ENVELOPE_FIELDS).collect()),
            predicate: self.predicate.clone(),
        }
    }
}

/// A min/max bound on one `Int64` payload column. Only used to skip stripes
/// whose column statistics cannot intersect the bound; rows are never
/// filtered here.
#[derive(Clone, Debug)]
pub struct Predicate {
    pub(crate) column: String,
    pub(crate) min: Option<i64>,
    pub(crate) max: Option<i64>,
}

impl Predicate {
    /// Keep stripes whose `column` statistics intersect `[min, max]`.
    pub fn range(column: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            column: column.into(),
            min,
            max,
        }
    }

    /// Whether a stripe with the given column statistics can be skipped.
    pub(crate) fn excludes(&self, stat_min: Option<i64>, stat_max: Option<i64>) -> bool {
        if let (Some(lo), Some(stat_max)) = (self.min, stat_max) {
            if stat_max < lo {
                return true;
            }
        }
        if let (Some(hi), Some(stat_min)) = (self.max, stat_min) {
            if stat_min > hi {
                return true;
            }
        }
        false
    }
}

/// How the split maps onto the physical layout of a pre-acid bucket.
#[derive(Clone, Debug, Default)]
pub struct SplitOptions {
    pub(crate) copy_index: usize,
    pub(crate) compacting: bool,
    pub(crate) bucket_path: Option<PathBuf>,
    pub(crate) root_path: Option<PathBuf>,
}

impl SplitOptions {
    /// Which physical copy of the bucket the split comes from; 0 is the
    /// first file, without a `_copy_N` suffix.
    pub fn with_copy_index(mut self, copy_index: usize) -> Self {
        self.copy_index = copy_index;
        self
    }

    /// Whether this split drives compaction of the whole logical bucket.
    pub fn compacting(mut self, compacting: bool) -> Self {
        self.compacting = compacting;
        self
    }

    /// Full path to the data file the split came from.
    pub fn with_bucket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bucket_path = Some(path.into());
        self
    }

    /// Partition directory (table directory when unpartitioned).
    pub fn with_root_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_path = Some(path.into());
        self
    }
}

/// Everything the merger needs beyond the base reader and delta directories.
#[derive(Clone)]
pub struct MergeOptions {
    pub(crate) collapse: bool,
    pub(crate) is_original: bool,
    pub(crate) bucket: i32,
    pub(crate) visibility: Arc<dyn TxnVisibility + Send + Sync>,
    pub(crate) read: ReadOptions,
    pub(crate) split: SplitOptions,
}

impl MergeOptions {
    /// Build options for one bucket under the given visibility snapshot.
    pub fn new(bucket: i32, visibility: Arc<dyn TxnVisibility + Send + Sync>) -> Self {
        Self {
            collapse: false,
            is_original: false,
            bucket,
            visibility,
            read: ReadOptions::default(),
            split: SplitOptions::default(),
        }
    }

    /// Emit only the latest event of each row.
    pub fn collapse(mut self, collapse: bool) -> Self {
        self.collapse = collapse;
        self
    }

    /// The base is a pre-acid file without event envelopes.
    pub fn original(mut self, is_original: bool) -> Self {
        self.is_original = is_original;
        self
    }

    /// Attach row-level read options.
    pub fn with_read(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self
    }

    /// Attach split layout options.
    pub fn with_split(mut self, split: SplitOptions) -> Self {
        self.split = split;
        self
    }
}
