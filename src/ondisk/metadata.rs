//! Footer metadata carried by transactional files: the per-stripe key index
//! and the ACID operation counts.

use crate::{error::MergeError, key::RecordId};

/// Footer key under which event files store the per-stripe key index.
pub const KEY_INDEX_META: &str = "strata.key.index";
/// Footer key under which delta files store their operation counts.
pub const ACID_STATS_META: &str = "strata.acid.stats";

/// Operation counts summarizing a delta file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcidStats {
    /// Number of insert events.
    pub inserts: i64,
    /// Number of update events.
    pub updates: i64,
    /// Number of delete events.
    pub deletes: i64,
}

impl AcidStats {
    /// Whether the delta rewrites or removes existing rows.
    pub fn has_mutations(&self) -> bool {
        self.updates > 0 || self.deletes > 0
    }

    /// Wire form: `inserts,updates,deletes`.
    pub fn serialize(&self) -> String {
        format!("{},{},{}", self.inserts, self.updates, self.deletes)
    }

    /// Parse the wire form.
    pub fn parse(raw: &str) -> Result<Self, MergeError> {
        let mut parts = raw.split(',');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(|| MergeError::Metadata(format!("malformed acid stats: {raw:?}")))
        };
        Ok(Self {
            inserts: next()?,
            updates: next()?,
            deletes: next()?,
        })
    }
}

/// Encode a key index (the last key written into each stripe) for the footer.
pub fn encode_key_index(keys: &[RecordId]) -> String {
    serde_json::to_string(keys).unwrap_or_default()
}

/// Decode a footer key index.
pub fn parse_key_index(raw: &str) -> Result<Vec<RecordId>, MergeError> {
    serde_json::from_str(raw)
        .map_err(|err| MergeError::Metadata(format!("malformed key index: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acid_stats_round_trip() {
        let stats = AcidStats {
            inserts: 3,
            updates: 1,
            deletes: 0,
        };
        assert_eq!(stats.serialize(), "3,1,0");
        assert_eq!(AcidStats::parse("3,1,0").unwrap(), stats);
        assert!(stats.has_mutations());
        assert!(!AcidStats {
            inserts: 5,
            updates: 0,
            deletes: 0
        }
        .has_mutations());
        assert!(AcidStats::parse("3,1").is_err());
        assert!(AcidStats::parse("a,b,c").is_err());
    }

    #[test]
    fn key_index_round_trip() {
        let keys = vec![RecordId::new(5, 0, 2), RecordId::new(5, 0, 7)];
        let encoded = encode_key_index(&keys);
        assert_eq!(parse_key_index(&encoded).unwrap(), keys);
        assert!(parse_key_index("not json").is_err());
    }
}
