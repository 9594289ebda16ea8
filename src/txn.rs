//! Transaction visibility: which transaction ids a reader may observe.

use std::{fmt, str::FromStr};

/// Oracle deciding whether a transaction's events are visible to the current
/// read snapshot.
pub trait TxnVisibility {
    /// Whether events written by `txn` may be emitted.
    fn is_visible(&self, txn: i64) -> bool;
}

/// A read snapshot: every transaction at or below the high watermark is
/// visible unless it was still open when the snapshot was taken.
///
/// The wire form is `high_watermark[:open_txn...]`, open transactions sorted
/// ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxnSnapshot {
    high_watermark: i64,
    open: Vec<i64>,
}

impl TxnSnapshot {
    /// Build a snapshot from a high watermark and the transactions open at
    /// snapshot time.
    pub fn new(high_watermark: i64, mut open: Vec<i64>) -> Self {
        open.sort_unstable();
        Self {
            high_watermark,
            open,
        }
    }

    /// A snapshot that sees every transaction. Compaction merges with this:
    /// it must carry all events forward, visible or not yet committed.
    pub fn all_visible() -> Self {
        Self {
            high_watermark: i64::MAX,
            open: Vec::new(),
        }
    }

    /// The highest transaction id covered by this snapshot.
    pub fn high_watermark(&self) -> i64 {
        self.high_watermark
    }
}

impl TxnVisibility for TxnSnapshot {
    fn is_visible(&self, txn: i64) -> bool {
        txn <= self.high_watermark && self.open.binary_search(&txn).is_err()
    }
}

impl fmt::Display for TxnSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.high_watermark)?;
        for txn in &self.open {
            write!(f, ":{txn}")?;
        }
        Ok(())
    }
}

/// Error parsing the `high_watermark[:open_txn...]` wire form.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction snapshot: {0:?}")]
pub struct ParseSnapshotError(String);

impl FromStr for TxnSnapshot {
    type Err = ParseSnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let high_watermark = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ParseSnapshotError(s.to_string()))?;
        let open = parts
            .map(|p| p.parse().map_err(|_| ParseSnapshotError(s.to_string())))
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(Self::new(high_watermark, open))
    }
}
