//! Multi-way merge of a base split and its delta files into one ordered
//! stream of ACID events.

pub(crate) mod cursor;

use std::{cmp::Ordering, collections::BTreeMap, path::PathBuf, sync::Arc};

use self::cursor::{Cursor, EventCursor, OriginalCursor};
use crate::{
    bounds,
    error::MergeError,
    key::{KeyInterval, MergeKey, RecordId},
    layout,
    logging::strata_log,
    ondisk::{FileReader, ScanProgress},
    options::MergeOptions,
    record::Event,
    txn::TxnVisibility,
};

/// Merges one bucket's base split with every delta into a stream of events
/// that is strictly ascending in [`MergeKey`] order.
///
/// Each source is already sorted; the merge keeps the least-keyed cursor as
/// `primary` and the rest in a key-ordered registry, swapping whenever the
/// primary's next key falls behind the registry's least key. Events from
/// invisible transactions are skipped silently; events superseded on the
/// same row are skipped according to the collapse rules.
pub struct Merger {
    readers: BTreeMap<MergeKey, Cursor>,
    primary: Option<Cursor>,
    secondary_key: Option<MergeKey>,
    prev_key: Option<MergeKey>,
    collapse: bool,
    visibility: Arc<dyn TxnVisibility + Send + Sync>,
    min_key: Option<RecordId>,
    max_key: Option<RecordId>,
    columns: usize,
    offset: u64,
    length: u64,
    base_progress: Option<ScanProgress>,
}

impl Merger {
    /// Open the merge over an optional base reader and the delta directories
    /// that apply to the split.
    pub async fn open(
        base: Option<FileReader>,
        delta_dirs: &[PathBuf],
        options: MergeOptions,
    ) -> Result<Self, MergeError> {
        let MergeOptions {
            collapse,
            is_original,
            bucket,
            visibility,
            read,
            split,
        } = options;
        let event_options = read.event_options();

        let mut readers: BTreeMap<MergeKey, Cursor> = BTreeMap::new();
        let mut min_key = None;
        let mut max_key = None;
        let mut base_progress = None;
        let mut offset = 0;
        let mut length = 0;

        if let Some(base) = base {
            offset = read.offset;
            length = base.len().min(read.max_offset).saturating_sub(read.offset);

            let interval = if is_original {
                bounds::original_key_bounds(base.stripes(), bucket, read.offset, read.max_offset)
            } else {
                let key_index = base.key_index()?.ok_or_else(|| {
                    MergeError::Metadata("base event file has no key index".into())
                })?;
                bounds::event_key_bounds(base.stripes(), &key_index, read.offset, read.max_offset)?
            };
            strata_log!(
                log::Level::Info,
                "split_bounds",
                "min={:?} max={:?}",
                interval.min,
                interval.max
            );

            let mut cursor = if is_original {
                if split.compacting {
                    let root = split
                        .root_path
                        .as_deref()
                        .ok_or(MergeError::IncompleteSplitOptions("a root path"))?;
                    // The passed-in reader may be any physical file of the
                    // bucket; compaction re-opens them all in order.
                    drop(base);
                    Cursor::Original(
                        OriginalCursor::compaction(root, bucket, interval, &read).await?,
                    )
                } else {
                    Cursor::Original(
                        OriginalCursor::split(base, bucket, interval, &read, &split).await?,
                    )
                }
            } else {
                let stream = base.events(&event_options).await?;
                Cursor::Events(EventCursor::new(stream, interval, 0))
            };

            // The cursor's bounds are authoritative from here on: original
            // splits shift them by the rows of earlier copy files.
            min_key = cursor.min_key();
            max_key = cursor.max_key();
            strata_log!(
                log::Level::Info,
                "cursor_bounds",
                "min={:?} max={:?}",
                min_key,
                max_key
            );

            base_progress = Some(cursor.progress());
            cursor.seek_past_min().await?;
            if cursor.head().is_some() {
                readers.insert(cursor.head_key(), cursor);
            }
        }

        // Deltas are always read whole; the split's byte range only bounds
        // the base. Key bounds do the clipping instead.
        let delta_options = event_options.with_range(0, u64::MAX);
        for dir in delta_dirs {
            let name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| MergeError::InvalidDeltaName(dir.display().to_string()))?;
            let parsed = layout::parse_delta(name)?;
            let delta_file = layout::bucket_file(dir, bucket);
            let flush_length = layout::read_flush_length(&delta_file).await?;
            if flush_length == Some(0) || !tokio::fs::try_exists(&delta_file).await? {
                continue;
            }
            let reader = FileReader::open_capped(&delta_file, flush_length).await?;

            let mut delta_options = delta_options.clone();
            if delta_options.predicate.is_some() {
                // A predicate pushed into a delta holding updates or deletes
                // can hide the latest live version of a row or trip over
                // tombstones; only insert-only deltas keep it.
                let insert_only = reader.acid_stats().is_some_and(|s| !s.has_mutations());
                if !insert_only {
                    delta_options.predicate = None;
                }
            }

            let stream = reader.events(&delta_options).await?;
            let mut cursor = Cursor::Events(EventCursor::new(
                stream,
                KeyInterval::new(min_key, max_key),
                parsed.statement_id.unwrap_or(0),
            ));
            cursor.seek_past_min().await?;
            if cursor.head().is_some() {
                readers.insert(cursor.head_key(), cursor);
            }
        }

        let mut merger = Self {
            readers,
            primary: None,
            secondary_key: None,
            prev_key: None,
            collapse,
            visibility,
            min_key,
            max_key,
            columns: 0,
            offset,
            length,
            base_progress,
        };
        if let Some((_, cursor)) = merger.readers.pop_first() {
            merger.columns = cursor.columns();
            merger.primary = Some(cursor);
            merger.secondary_key = merger.readers.keys().next().copied();
        }
        Ok(merger)
    }

    /// The next visible, non-superseded event, or `None` at end of stream.
    pub async fn next(&mut self) -> Result<Option<(MergeKey, Event)>, MergeError> {
        let mut keys_same = true;
        let mut out = None;
        while keys_same {
            let Some(primary) = self.primary.as_mut() else {
                break;
            };
            let key = primary.head_key();
            let Some(current) = primary.take_head() else {
                break;
            };

            primary.advance().await?;

            // The primary keeps the floor only while its next key does not
            // fall behind the registry's least key.
            let demote = primary.head().is_none()
                || self
                    .secondary_key
                    .is_some_and(|secondary| primary.head_key() > secondary);
            if demote {
                if let Some(prev) = self.primary.take() {
                    if prev.head().is_some() {
                        self.readers.insert(prev.head_key(), prev);
                    }
                }
                match self.readers.pop_first() {
                    Some((_, cursor)) => {
                        self.primary = Some(cursor);
                        self.secondary_key = self.readers.keys().next().copied();
                    }
                    None => {
                        self.primary = None;
                        self.secondary_key = None;
                    }
                }
            }

            if !self.visibility.is_visible(key.current_txn) {
                continue;
            }

            // One transaction mutating the same row more than once happens
            // only with multi-statement transactions; those duplicates are
            // always collapsed, whatever the collapse flag says. Descending
            // statement order puts the final mutation first.
            let is_same_row = self.prev_key.is_some_and(|prev| prev.same_row(&key));
            if self.collapse || is_same_row {
                keys_same = (self.collapse
                    && self
                        .prev_key
                        .is_some_and(|prev| prev.cmp_row(&key.record) == Ordering::Equal))
                    || is_same_row;
            } else {
                keys_same = false;
            }
            if !keys_same {
                self.prev_key = Some(key);
            }
            out = Some((key, current));
        }
        if keys_same { Ok(None) } else { Ok(out) }
    }

    /// Number of payload columns in emitted events; 0 with no base and no
    /// deltas.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Exclusive lower key bound of the stream, if any.
    pub fn min_key(&self) -> Option<RecordId> {
        self.min_key
    }

    /// Inclusive upper key bound of the stream, if any.
    pub fn max_key(&self) -> Option<RecordId> {
        self.max_key
    }

    /// Progress through the base reader; 1.0 when there is no base. Delta
    /// consumption is not reflected.
    pub fn progress(&self) -> f32 {
        self.base_progress.as_ref().map_or(1.0, |p| p.fraction())
    }

    /// Byte position within the split, derived from [`Self::progress`].
    pub fn pos(&self) -> u64 {
        self.offset + (self.progress() as f64 * self.length as f64) as u64
    }

    /// Close the primary and every registered cursor. Calling twice is a
    /// no-op the second time; a closed merger yields no further events.
    pub fn close(&mut self) {
        if let Some(mut primary) = self.primary.take() {
            primary.close();
        }
        for (_, mut cursor) in std::mem::take(&mut self.readers) {
            cursor.close();
        }
        self.secondary_key = None;
    }
}

impl std::fmt::Debug for Merger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger")
            .field("registered", &self.readers.len())
            .field("collapse", &self.collapse)
            .field("min_key", &self.min_key)
            .field("max_key", &self.max_key)
            .finish()
    }
}
