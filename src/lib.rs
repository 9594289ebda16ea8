#![warn(missing_docs)]
//! Merges a columnar base file and a set of transaction delta files into a
//! single, deterministically ordered stream of ACID events.
//!
//! A transactional table keeps one immutable *base* per bucket plus a
//! time-ordered run of *delta* files, one per committed transaction. Reading
//! a split means merging the base's byte range with every delta, clipped to
//! the split's key window and filtered to the transactions the caller's
//! snapshot may see. The merge key orders rows ascending and, within a row,
//! mutating transactions descending, so a collapsing reader keeps only the
//! latest version of each row by emitting run heads.
//!
//! The crate reads; it never writes table files. Files are Parquet with five
//! envelope columns ahead of the payload (see [`record`]); pre-acid
//! "original" files carry bare payload rows and are adapted into insert
//! events on the fly, with row ids numbered across all physical files of the
//! logical bucket.

mod bounds;
mod logging;

pub mod error;
pub mod key;
pub mod layout;
pub mod merge;
pub mod ondisk;
pub mod options;
pub mod record;
pub mod txn;

pub use crate::{
    error::MergeError,
    key::{KeyInterval, MergeKey, RecordId},
    merge::Merger,
    ondisk::{AcidStats, FileReader, StripeInfo},
    options::{MergeOptions, Predicate, ReadOptions, SplitOptions},
    record::{Event, Operation, RowRef},
    txn::{TxnSnapshot, TxnVisibility},
};
