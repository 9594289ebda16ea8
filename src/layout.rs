//! Directory layout of a transactional table: original bucket files, delta
//! directories, and the flush-length side files of open deltas.

use std::path::{Path, PathBuf};

use crate::error::MergeError;

/// Suffix of the side file recording a delta's durably flushed byte length.
pub const FLUSH_LENGTH_SUFFIX: &str = "_flush_length";

const DELTA_PREFIX: &str = "delta_";
const COPY_KEYWORD: &str = "_copy_";

/// Name of a pre-acid bucket file: `00000_0`, `00000_0_copy_1`, ...
pub fn original_file_name(bucket: i32, copy_index: usize) -> String {
    if copy_index == 0 {
        format!("{bucket:05}_0")
    } else {
        format!("{bucket:05}_0{COPY_KEYWORD}{copy_index}")
    }
}

/// Parse `(bucket, copy_index)` out of a pre-acid file name. Returns `None`
/// for names that do not follow the layout.
pub fn parse_original(name: &str) -> Option<(i32, usize)> {
    let (bucket_part, rest) = name.split_once('_')?;
    let bucket = bucket_part.parse().ok()?;
    if rest == "0" {
        return Some((bucket, 0));
    }
    let copy = rest.strip_prefix("0")?.strip_prefix(COPY_KEYWORD)?;
    Some((bucket, copy.parse().ok()?))
}

/// Name of the bucket file inside a delta directory: `bucket_00000`.
pub fn bucket_file_name(bucket: i32) -> String {
    format!("bucket_{bucket:05}")
}

/// Path of a bucket's file inside a delta directory.
pub fn bucket_file(delta_dir: &Path, bucket: i32) -> PathBuf {
    delta_dir.join(bucket_file_name(bucket))
}

/// Path of the flush-length side file for a delta bucket file.
pub fn flush_length_file(bucket_file: &Path) -> PathBuf {
    let mut name = bucket_file.file_name().unwrap_or_default().to_os_string();
    name.push(FLUSH_LENGTH_SUFFIX);
    bucket_file.with_file_name(name)
}

/// Identity parsed from a delta directory name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedDelta {
    /// Lowest transaction id stored in the delta.
    pub min_txn: i64,
    /// Highest transaction id stored in the delta.
    pub max_txn: i64,
    /// Statement ordinal for multi-statement transactions, when present.
    pub statement_id: Option<i32>,
}

/// Name of a delta directory: `delta_0000005_0000005` or, for one statement
/// of a multi-statement transaction, `delta_0000009_0000009_0001`.
pub fn delta_dir_name(min_txn: i64, max_txn: i64, statement_id: Option<i32>) -> String {
    match statement_id {
        None => format!("{DELTA_PREFIX}{min_txn:07}_{max_txn:07}"),
        Some(stmt) => format!("{DELTA_PREFIX}{min_txn:07}_{max_txn:07}_{stmt:04}"),
    }
}

/// Parse a delta directory name.
pub fn parse_delta(name: &str) -> Result<ParsedDelta, MergeError> {
    let invalid = || MergeError::InvalidDeltaName(name.to_string());
    let rest = name.strip_prefix(DELTA_PREFIX).ok_or_else(invalid)?;
    let mut parts = rest.split('_');
    let min_txn = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let max_txn = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let statement_id = match parts.next() {
        None => None,
        Some(p) => Some(p.parse().map_err(|_| invalid())?),
    };
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(ParsedDelta {
        min_txn,
        max_txn,
        statement_id,
    })
}

/// One physical file of a logical pre-acid bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalFile {
    /// Location of the file.
    pub path: PathBuf,
    /// Bucket parsed from the name.
    pub bucket: i32,
    /// Copy ordinal parsed from the name; 0 for the first file.
    pub copy_index: usize,
}

/// Enumerate the pre-acid files directly under `root` in their fixed order:
/// bucket ascending, then copy ordinal ascending. Names that do not follow
/// the pre-acid layout are ignored.
pub async fn original_files(root: &Path) -> Result<Vec<OriginalFile>, MergeError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some((bucket, copy_index)) = parse_original(name) {
            files.push(OriginalFile {
                path: entry.path(),
                bucket,
                copy_index,
            });
        }
    }
    files.sort_by_key(|f| (f.bucket, f.copy_index));
    Ok(files)
}

/// Read the durably flushed length of a delta bucket file.
///
/// The writer appends one big-endian `u64` per flush; the last complete value
/// wins. `None` means no side file exists and the file is complete.
/// `Some(0)` means the writer flushed nothing durable yet.
pub async fn read_flush_length(bucket_file: &Path) -> Result<Option<u64>, MergeError> {
    let side = flush_length_file(bucket_file);
    let raw = match tokio::fs::read(&side).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let complete = raw.len() / 8;
    if complete == 0 {
        return Ok(Some(0));
    }
    let start = (complete - 1) * 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[start..start + 8]);
    Ok(Some(u64::from_be_bytes(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_names_round_trip() {
        assert_eq!(original_file_name(0, 0), "00000_0");
        assert_eq!(original_file_name(3, 2), "00003_0_copy_2");

        assert_eq!(parse_original("00000_0"), Some((0, 0)));
        assert_eq!(parse_original("00003_0_copy_2"), Some((3, 2)));
        assert_eq!(parse_original("bucket_00000"), None);
        assert_eq!(parse_original("00000_0_flush_length"), None);
    }

    #[test]
    fn delta_names_round_trip() {
        assert_eq!(delta_dir_name(5, 5, None), "delta_0000005_0000005");
        assert_eq!(delta_dir_name(9, 9, Some(1)), "delta_0000009_0000009_0001");

        assert_eq!(
            parse_delta("delta_0000005_0000007").unwrap(),
            ParsedDelta {
                min_txn: 5,
                max_txn: 7,
                statement_id: None
            }
        );
        assert_eq!(
            parse_delta("delta_0000009_0000009_0001").unwrap(),
            ParsedDelta {
                min_txn: 9,
                max_txn: 9,
                statement_id: Some(1)
            }
        );
        assert!(parse_delta("base_0000005").is_err());
        assert!(parse_delta("delta_x_y").is_err());
    }

    #[tokio::test]
    async fn original_files_sort_by_bucket_then_copy() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["00001_0", "00000_0_copy_2", "00000_0", "00000_0_copy_10"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(dir.path().join("bucket_00000"), b"x").unwrap();

        let files = original_files(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["00000_0", "00000_0_copy_2", "00000_0_copy_10", "00001_0"]
        );
    }

    #[tokio::test]
    async fn flush_length_reads_last_complete_value() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = dir.path().join("bucket_00000");

        assert_eq!(read_flush_length(&bucket).await.unwrap(), None);

        let side = flush_length_file(&bucket);
        let mut raw = Vec::new();
        raw.extend_from_slice(&100u64.to_be_bytes());
        raw.extend_from_slice(&256u64.to_be_bytes());
        raw.extend_from_slice(&[0, 1, 2]);
        std::fs::write(&side, &raw).unwrap();

        assert_eq!(read_flush_length(&bucket).await.unwrap(), Some(256));

        std::fs::write(&side, &[1, 2, 3]).unwrap();
        assert_eq!(read_flush_length(&bucket).await.unwrap(), Some(0));
    }
}
