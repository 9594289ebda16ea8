//! Bounded cursors: one-event lookahead over a single source, clipped to a
//! key window on the row identity.

use std::{cmp::Ordering, collections::VecDeque, path::Path};

use crate::{
    error::MergeError,
    key::{KeyInterval, MergeKey, RecordId},
    layout,
    logging::strata_log,
    ondisk::{EventStream, FileReader, RowStream, ScanProgress},
    options::{ReadOptions, SplitOptions},
    record::{Event, Operation},
};

/// The two cursor kinds share one contract: prime past the minimum key once,
/// then advance one event at a time until the head runs out.
pub(crate) enum Cursor {
    Events(EventCursor),
    Original(OriginalCursor),
}

impl Cursor {
    /// Read until the head is strictly greater than the minimum key. Called
    /// exactly once, before the first [`Self::head`].
    pub(crate) async fn seek_past_min(&mut self) -> Result<(), MergeError> {
        match self {
            Cursor::Events(cursor) => cursor.seek_past_min().await,
            Cursor::Original(cursor) => cursor.seek_past_min().await,
        }
    }

    /// Replace the head with the next in-range event, or exhaust the cursor.
    pub(crate) async fn advance(&mut self) -> Result<(), MergeError> {
        match self {
            Cursor::Events(cursor) => cursor.advance().await,
            Cursor::Original(cursor) => cursor.advance().await,
        }
    }

    pub(crate) fn head(&self) -> Option<&Event> {
        match self {
            Cursor::Events(cursor) => cursor.head.as_ref(),
            Cursor::Original(cursor) => cursor.head.as_ref(),
        }
    }

    pub(crate) fn take_head(&mut self) -> Option<Event> {
        match self {
            Cursor::Events(cursor) => cursor.head.take(),
            Cursor::Original(cursor) => cursor.head.take(),
        }
    }

    /// Key of the most recently read event. Meaningful only while
    /// [`Self::head`] is (or just was) populated.
    pub(crate) fn head_key(&self) -> MergeKey {
        match self {
            Cursor::Events(cursor) => cursor.head_key,
            Cursor::Original(cursor) => cursor.head_key,
        }
    }

    pub(crate) fn min_key(&self) -> Option<RecordId> {
        match self {
            Cursor::Events(cursor) => cursor.min_key,
            Cursor::Original(cursor) => cursor.min_key,
        }
    }

    pub(crate) fn max_key(&self) -> Option<RecordId> {
        match self {
            Cursor::Events(cursor) => cursor.max_key,
            Cursor::Original(cursor) => cursor.max_key,
        }
    }

    /// Number of payload columns this cursor emits.
    pub(crate) fn columns(&self) -> usize {
        match self {
            Cursor::Events(cursor) => cursor.columns,
            Cursor::Original(cursor) => cursor.columns,
        }
    }

    /// Progress of the scan the cursor started with.
    pub(crate) fn progress(&self) -> ScanProgress {
        match self {
            Cursor::Events(cursor) => cursor.progress.clone(),
            Cursor::Original(cursor) => cursor.progress.clone(),
        }
    }

    /// Drop the underlying stream. Safe to call more than once.
    pub(crate) fn close(&mut self) {
        match self {
            Cursor::Events(cursor) => cursor.source = None,
            Cursor::Original(cursor) => cursor.source = None,
        }
    }
}

/// Cursor over one ACID event file (a base split or a whole delta).
pub(crate) struct EventCursor {
    source: Option<EventStream>,
    head: Option<Event>,
    head_key: MergeKey,
    min_key: Option<RecordId>,
    max_key: Option<RecordId>,
    statement_id: i32,
    columns: usize,
    progress: ScanProgress,
}

impl EventCursor {
    /// Bind a cursor to an opened event stream. Nothing is read here; the
    /// first read happens in [`Cursor::seek_past_min`].
    pub(crate) fn new(source: EventStream, interval: KeyInterval, statement_id: i32) -> Self {
        let columns = source.payload_columns();
        let progress = source.progress();
        Self {
            source: Some(source),
            head: None,
            head_key: MergeKey::new(-1, -1, -1, -1, 0),
            min_key: interval.min,
            max_key: interval.max,
            statement_id,
            columns,
            progress,
        }
    }

    async fn advance(&mut self) -> Result<(), MergeError> {
        let Some(source) = self.source.as_mut() else {
            self.head = None;
            return Ok(());
        };
        match source.next().await? {
            Some(event) => {
                self.head_key = MergeKey::new(
                    event.original_txn,
                    event.bucket,
                    event.row_id,
                    event.current_txn,
                    self.statement_id,
                );
                if let Some(max) = self.max_key {
                    if self.head_key.cmp_row(&max) == Ordering::Greater {
                        strata_log!(
                            log::Level::Debug,
                            "cursor_clipped",
                            "key={:?} max={:?}",
                            self.head_key,
                            max
                        );
                        self.head = None;
                        self.source = None;
                        return Ok(());
                    }
                }
                self.head = Some(event);
            }
            None => {
                self.head = None;
                self.source = None;
            }
        }
        Ok(())
    }

    async fn seek_past_min(&mut self) -> Result<(), MergeError> {
        loop {
            self.advance().await?;
            let past_min = match (&self.head, &self.min_key) {
                (None, _) | (_, None) => true,
                (Some(_), Some(min)) => self.head_key.cmp_row(min) == Ordering::Greater,
            };
            if past_min {
                return Ok(());
            }
        }
    }
}

/// Cursor presenting pre-acid files as a stream of INSERT events with
/// transaction 0 and a bucket-global row numbering.
///
/// Several insert statements against the same pre-transactional table leave
/// files `00000_0`, `00000_0_copy_1`, ... behind; together they form one
/// logical bucket, and row ids must run contiguously across them in file
/// order. Compaction walks every file of the bucket in one cursor; a plain
/// read gets a split of a single physical file and only needs the row-count
/// sum of the files before it.
pub(crate) struct OriginalCursor {
    source: Option<RowStream>,
    /// Later files of the logical bucket; populated only by compaction.
    remaining_files: VecDeque<layout::OriginalFile>,
    options: ReadOptions,
    bucket: i32,
    /// Sum of the row counts of every file before the current one.
    row_id_offset: i64,
    rows_in_current: i64,
    head: Option<Event>,
    head_key: MergeKey,
    min_key: Option<RecordId>,
    max_key: Option<RecordId>,
    columns: usize,
    progress: ScanProgress,
}

impl OriginalCursor {
    /// Cursor over the whole logical bucket, for compaction. The caller's
    /// reader may be any physical file of the bucket; it is discarded and
    /// every file is opened in order instead.
    pub(crate) async fn compaction(
        root: &Path,
        bucket: i32,
        interval: KeyInterval,
        options: &ReadOptions,
    ) -> Result<Self, MergeError> {
        if options.offset != 0
            || options.max_offset != u64::MAX
            || interval.min.is_some()
            || interval.max.is_some()
        {
            return Err(MergeError::BoundedCompactionSplit);
        }
        let mut files: VecDeque<_> = layout::original_files(root)
            .await?
            .into_iter()
            .filter(|f| f.bucket == bucket)
            .collect();
        let Some(first) = files.pop_front() else {
            return Err(MergeError::MissingOriginalFiles {
                bucket,
                root: root.to_path_buf(),
            });
        };
        let reader = FileReader::open(&first.path).await?;
        let rows_in_current = reader.num_rows() as i64;
        let source = reader.rows(options).await?;
        let columns = source.columns();
        let progress = source.progress();
        Ok(Self {
            source: Some(source),
            remaining_files: files,
            options: options.clone(),
            bucket,
            row_id_offset: 0,
            rows_in_current,
            head: None,
            head_key: MergeKey::new(-1, -1, -1, -1, 0),
            min_key: None,
            max_key: None,
            columns,
            progress,
        })
    }

    /// Cursor over one split of one physical file, for a plain read.
    ///
    /// For a later copy of the bucket, the discovered key bounds were
    /// computed against this file alone, so they shift up by the rows of
    /// every earlier copy; a missing lower bound is synthesized so the first
    /// emitted row id announces the offset. When the file is not the last of
    /// its bucket and no upper bound exists, one is synthesized so this split
    /// does not claim rows that belong to a later copy. The last file keeps
    /// an open upper bound: delta inserts with row ids past the base count
    /// must still match somewhere.
    pub(crate) async fn split(
        reader: FileReader,
        bucket: i32,
        interval: KeyInterval,
        options: &ReadOptions,
        split: &SplitOptions,
    ) -> Result<Self, MergeError> {
        let root = split
            .root_path
            .as_deref()
            .ok_or(MergeError::IncompleteSplitOptions("a root path"))?;
        let mut min_key = interval.min;
        let mut max_key = interval.max;
        let mut row_id_offset = 0i64;
        let mut is_last_file;

        if split.copy_index > 0 {
            let bucket_path = split
                .bucket_path
                .as_deref()
                .ok_or(MergeError::IncompleteSplitOptions("a bucket path"))?;
            is_last_file = false;
            let mut seen_current = false;
            for file in layout::original_files(root).await? {
                if file.bucket != bucket {
                    continue;
                }
                if seen_current {
                    is_last_file = false;
                    break;
                }
                if file.path == bucket_path {
                    seen_current = true;
                    is_last_file = true;
                    continue;
                }
                let copy = FileReader::open(&file.path).await?;
                row_id_offset += copy.num_rows() as i64;
            }
            if row_id_offset > 0 {
                min_key = match min_key {
                    Some(mut key) => {
                        key.row_id += row_id_offset;
                        Some(key)
                    }
                    None => Some(RecordId::new(0, bucket, row_id_offset - 1)),
                };
                if let Some(key) = max_key.as_mut() {
                    key.row_id += row_id_offset;
                }
            }
        } else {
            let mut files_in_bucket = 0;
            for file in layout::original_files(root).await? {
                if file.bucket == bucket {
                    files_in_bucket += 1;
                    if files_in_bucket > 1 {
                        break;
                    }
                }
            }
            is_last_file = files_in_bucket <= 1;
        }

        if !is_last_file && max_key.is_none() {
            max_key = Some(RecordId::new(
                0,
                bucket,
                row_id_offset + reader.num_rows() as i64 - 1,
            ));
        }

        let rows_in_current = reader.num_rows() as i64;
        let source = reader.rows(options).await?;
        let columns = source.columns();
        let progress = source.progress();
        Ok(Self {
            source: Some(source),
            remaining_files: VecDeque::new(),
            options: options.clone(),
            bucket,
            row_id_offset,
            rows_in_current,
            head: None,
            head_key: MergeKey::new(-1, -1, -1, -1, 0),
            min_key,
            max_key,
            columns,
            progress,
        })
    }

    async fn advance(&mut self) -> Result<(), MergeError> {
        loop {
            let Some(source) = self.source.as_mut() else {
                self.head = None;
                return Ok(());
            };
            if let Some((row_number, row)) = source.next().await? {
                let row_id = row_number + self.row_id_offset;
                self.head_key = MergeKey::new(0, self.bucket, row_id, 0, 0);
                if let Some(max) = self.max_key {
                    if self.head_key.cmp_row(&max) == Ordering::Greater {
                        strata_log!(
                            log::Level::Debug,
                            "cursor_clipped",
                            "key={:?} max={:?}",
                            self.head_key,
                            max
                        );
                        self.head = None;
                        self.source = None;
                        return Ok(());
                    }
                }
                self.head = Some(Event {
                    operation: Operation::Insert,
                    original_txn: 0,
                    bucket: self.bucket,
                    row_id,
                    current_txn: 0,
                    row,
                });
                return Ok(());
            }
            match self.remaining_files.pop_front() {
                Some(file) => {
                    self.row_id_offset += self.rows_in_current;
                    let reader = FileReader::open(&file.path).await?;
                    self.rows_in_current = reader.num_rows() as i64;
                    self.source = Some(reader.rows(&self.options).await?);
                }
                None => {
                    self.head = None;
                    self.source = None;
                    return Ok(());
                }
            }
        }
    }

    async fn seek_past_min(&mut self) -> Result<(), MergeError> {
        loop {
            self.advance().await?;
            let past_min = match (&self.head, &self.min_key) {
                (None, _) | (_, None) => true,
                (Some(_), Some(min)) => self.head_key.cmp_row(min) == Ordering::Greater,
            };
            if past_min {
                return Ok(());
            }
        }
    }
}
