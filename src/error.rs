//! Error surface shared across the merge pipeline.

use std::{io, path::PathBuf};

use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors surfaced while opening files or merging event streams.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Underlying file open, read, or metadata probe failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Parquet decode failure.
    #[error(transparent)]
    Parquet(#[from] ParquetError),
    /// Footer metadata exists but cannot be interpreted.
    #[error("corrupt file metadata: {0}")]
    Metadata(String),
    /// An event carried an operation code outside the known set.
    #[error("unknown operation code {0}")]
    UnknownOperation(i32),
    /// A delta directory name does not follow the expected layout.
    #[error("unrecognized delta directory name: {0}")]
    InvalidDeltaName(String),
    /// A compaction split claimed a bucket that has no pre-acid files.
    #[error("no original files found for bucket {bucket} in {root}")]
    MissingOriginalFiles {
        /// Bucket the split claimed.
        bucket: i32,
        /// Root directory that was searched.
        root: PathBuf,
    },
    /// A compaction split arrived with a byte range or key bounds attached.
    /// Compaction always processes the whole logical bucket.
    #[error("compaction split must cover the whole logical bucket")]
    BoundedCompactionSplit,
    /// Reading a pre-acid bucket needs layout context that was not supplied.
    #[error("original split requires {0}")]
    IncompleteSplitOptions(&'static str),
}
