//! Reading transactional columnar files.
//!
//! A file is Parquet; a *stripe* is a row group. Event files carry the five
//! envelope columns ahead of the payload plus a per-stripe key index in the
//! footer; original (pre-acid) files are payload only. Readers hand out
//! one-shot streams over a byte-range selection of stripes.

pub mod metadata;
mod stream;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parquet::{
    arrow::{
        ParquetRecordBatchStreamBuilder, ProjectionMask,
        arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions},
        async_reader::ParquetRecordBatchStream,
    },
    file::statistics::Statistics,
};

pub use self::{
    metadata::AcidStats,
    stream::{EventStream, RowStream},
};
use crate::{
    error::MergeError,
    key::RecordId,
    options::ReadOptions,
    record::ENVELOPE_FIELDS,
};

/// Geometry of one stripe: where it starts, how many bytes it spans, and how
/// many rows it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripeInfo {
    /// Byte offset of the stripe's first column chunk.
    pub offset: u64,
    /// Compressed byte length of the stripe.
    pub length: u64,
    /// Row count of the stripe.
    pub rows: u64,
}

/// Shared row-count progress of one scan. The stream increments it; anyone
/// holding a clone can read the fraction consumed.
#[derive(Clone, Debug)]
pub struct ScanProgress {
    read: Arc<AtomicU64>,
    total: u64,
}

impl ScanProgress {
    fn new(total: u64) -> Self {
        Self {
            read: Arc::new(AtomicU64::new(0)),
            total,
        }
    }

    fn add(&self, rows: u64) {
        self.read.fetch_add(rows, Ordering::Relaxed);
    }

    /// Fraction of the selected rows consumed so far, in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.read.load(Ordering::Relaxed) as f32 / self.total as f32).min(1.0)
    }
}

/// An opened transactional file: footer metadata loaded once, streams opened
/// per scan.
pub struct FileReader {
    path: PathBuf,
    metadata: ArrowReaderMetadata,
    stripes: Vec<StripeInfo>,
    len: u64,
}

impl FileReader {
    /// Open a complete file.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, MergeError> {
        Self::open_capped(path, None).await
    }

    /// Open a file whose durably flushed length may be shorter than its
    /// on-disk length; stripes ending beyond the cap are invisible.
    pub async fn open_capped(
        path: impl Into<PathBuf>,
        cap: Option<u64>,
    ) -> Result<Self, MergeError> {
        let path = path.into();
        let len = tokio::fs::metadata(&path).await?.len();
        let mut file = tokio::fs::File::open(&path).await?;
        let metadata = ArrowReaderMetadata::load_async(&mut file, ArrowReaderOptions::new()).await?;

        let mut stripes = Vec::with_capacity(metadata.metadata().num_row_groups());
        for group in metadata.metadata().row_groups() {
            if group.num_columns() == 0 {
                continue;
            }
            // Dictionary pages, when present, come before the data pages.
            let first = group.column(0);
            let offset = match first.dictionary_page_offset() {
                Some(dict) => dict.min(first.data_page_offset()) as u64,
                None => first.data_page_offset() as u64,
            };
            let stripe = StripeInfo {
                offset,
                length: group.compressed_size() as u64,
                rows: group.num_rows() as u64,
            };
            if let Some(cap) = cap {
                if stripe.offset + stripe.length > cap {
                    break;
                }
            }
            stripes.push(stripe);
        }

        Ok(Self {
            path,
            metadata,
            stripes,
            len,
        })
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On-disk byte length.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the file holds no visible rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Stripe geometry, in file order, restricted to the flushed cap.
    pub fn stripes(&self) -> &[StripeInfo] {
        &self.stripes
    }

    /// Total visible row count.
    pub fn num_rows(&self) -> u64 {
        self.stripes.iter().map(|s| s.rows).sum()
    }

    /// The per-stripe key index of an event file, when present.
    pub fn key_index(&self) -> Result<Option<Vec<RecordId>>, MergeError> {
        match self.footer_value(metadata::KEY_INDEX_META) {
            None => Ok(None),
            Some(raw) => metadata::parse_key_index(raw).map(Some),
        }
    }

    /// The ACID operation counts of a delta file. Absent or unreadable
    /// counts both come back as `None`.
    pub fn acid_stats(&self) -> Option<AcidStats> {
        AcidStats::parse(self.footer_value(metadata::ACID_STATS_META)?).ok()
    }

    fn footer_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .metadata()
            .file_metadata()
            .key_value_metadata()?
            .iter()
            .find(|kv| kv.key == key)?
            .value
            .as_deref()
    }

    /// Stream the events of an ACID file selected by `options`. The envelope
    /// columns ride along regardless of projection.
    pub async fn events(&self, options: &ReadOptions) -> Result<EventStream, MergeError> {
        let (groups, _, total_rows) = self.select_stripes(options, true);
        let projection = options
            .projection
            .as_ref()
            .map(|cols| (0..ENVELOPE_FIELDS).chain(cols.iter().copied()).collect());
        let stream = self.open_stream(groups, projection).await?;
        EventStream::new(stream, ScanProgress::new(total_rows))
    }

    /// Stream the raw rows of an original file selected by `options`,
    /// numbered from the start of the file. Predicates are not applied here:
    /// row numbering must stay contiguous across the selection.
    pub async fn rows(&self, options: &ReadOptions) -> Result<RowStream, MergeError> {
        let (groups, start_row, total_rows) = self.select_stripes(options, false);
        let stream = self.open_stream(groups, options.projection.clone()).await?;
        Ok(RowStream::new(stream, start_row, ScanProgress::new(total_rows)))
    }

    /// Pick the stripes whose start offset falls in the byte range, counting
    /// the rows that precede the selection.
    fn select_stripes(&self, options: &ReadOptions, prune: bool) -> (Vec<usize>, u64, u64) {
        let mut groups = Vec::new();
        let mut start_row = 0;
        let mut total_rows = 0;
        for (index, stripe) in self.stripes.iter().enumerate() {
            if stripe.offset < options.offset {
                start_row += stripe.rows;
                continue;
            }
            if stripe.offset >= options.max_offset {
                break;
            }
            if prune && self.stripe_excluded(index, options) {
                continue;
            }
            groups.push(index);
            total_rows += stripe.rows;
        }
        (groups, start_row, total_rows)
    }

    fn stripe_excluded(&self, index: usize, options: &ReadOptions) -> bool {
        let Some(predicate) = &options.predicate else {
            return false;
        };
        let Ok(column) = self.metadata.schema().index_of(&predicate.column) else {
            return false;
        };
        let group = &self.metadata.metadata().row_groups()[index];
        match group.column(column).statistics() {
            Some(Statistics::Int64(stats)) => predicate.excludes(
                stats.min_opt().copied(),
                stats.max_opt().copied(),
            ),
            _ => false,
        }
    }

    async fn open_stream(
        &self,
        groups: Vec<usize>,
        projection: Option<Vec<usize>>,
    ) -> Result<ParquetRecordBatchStream<tokio::fs::File>, MergeError> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut builder =
            ParquetRecordBatchStreamBuilder::new_with_metadata(file, self.metadata.clone())
                .with_row_groups(groups);
        if let Some(columns) = projection {
            builder = builder
                .with_projection(ProjectionMask::roots(self.metadata.parquet_schema(), columns));
        }
        Ok(builder.build()?)
    }
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("path", &self.path)
            .field("stripes", &self.stripes.len())
            .field("rows", &self.num_rows())
            .finish()
    }
}
