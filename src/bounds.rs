//! Key bounds of one split, derived from stripe geometry.
//!
//! Splits are byte ranges that usually land on block boundaries, not stripe
//! boundaries. The window we want is: one key before the first row of the
//! first stripe starting inside the range, through the last row of the last
//! such stripe. Clipping by keys rather than bytes lets every cursor of the
//! merge agree on which rows belong to the split.

use crate::{
    error::MergeError,
    key::{KeyInterval, RecordId},
    ondisk::StripeInfo,
};

/// Bounds for an event file, taken from its per-stripe key index (the last
/// key written into each stripe).
pub(crate) fn event_key_bounds(
    stripes: &[StripeInfo],
    key_index: &[RecordId],
    offset: u64,
    max_offset: u64,
) -> Result<KeyInterval, MergeError> {
    let mut first_stripe = 0usize;
    let mut stripe_count = 0usize;
    let mut is_tail = true;
    for stripe in stripes {
        if offset > stripe.offset {
            first_stripe += 1;
        } else if max_offset > stripe.offset {
            stripe_count += 1;
        } else {
            is_tail = false;
            break;
        }
    }

    let index_entry = |at: usize| {
        key_index
            .get(at)
            .copied()
            .ok_or_else(|| MergeError::Metadata(format!("key index has no entry for stripe {at}")))
    };
    let min = if first_stripe > 0 {
        Some(index_entry(first_stripe - 1)?)
    } else {
        None
    };
    let max = if !is_tail {
        let end = (first_stripe + stripe_count)
            .checked_sub(1)
            .ok_or_else(|| MergeError::Metadata("split byte range covers no stripes".into()))?;
        Some(index_entry(end)?)
    } else {
        None
    };
    Ok(KeyInterval::new(min, max))
}

/// Bounds for an original file, synthesized from cumulative row counts.
///
/// When `offset` and `max_offset` land inside a single stripe the row length
/// stays zero and `min == max`: the window is empty and the split yields
/// nothing. Callers tolerate empty cursors.
pub(crate) fn original_key_bounds(
    stripes: &[StripeInfo],
    bucket: i32,
    offset: u64,
    max_offset: u64,
) -> KeyInterval {
    let mut row_offset = 0i64;
    let mut row_length = 0i64;
    let mut is_tail = true;
    for stripe in stripes {
        if offset > stripe.offset {
            row_offset += stripe.rows as i64;
        } else if max_offset > stripe.offset {
            row_length += stripe.rows as i64;
        } else {
            is_tail = false;
            break;
        }
    }

    let min = (row_offset > 0).then(|| RecordId::new(0, bucket, row_offset - 1));
    let max = (!is_tail).then(|| RecordId::new(0, bucket, row_offset + row_length - 1));
    KeyInterval::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripes(rows_per_stripe: &[u64]) -> Vec<StripeInfo> {
        let mut offset = 4;
        rows_per_stripe
            .iter()
            .map(|&rows| {
                let stripe = StripeInfo {
                    offset,
                    length: 100,
                    rows,
                };
                offset += 100;
                stripe
            })
            .collect()
    }

    fn key(row_id: i64) -> RecordId {
        RecordId::new(5, 0, row_id)
    }

    #[test]
    fn event_bounds_for_a_middle_split() {
        let stripes = stripes(&[10, 10, 10]);
        let index = [key(9), key(19), key(29)];

        // Second stripe only: min is the last key before it, max its last key.
        let interval = event_key_bounds(&stripes, &index, 100, 200).unwrap();
        assert_eq!(interval.min, Some(key(9)));
        assert_eq!(interval.max, Some(key(19)));
    }

    #[test]
    fn event_bounds_for_head_and_tail_splits() {
        let stripes = stripes(&[10, 10, 10]);
        let index = [key(9), key(19), key(29)];

        let head = event_key_bounds(&stripes, &index, 0, 100).unwrap();
        assert_eq!(head.min, None);
        assert_eq!(head.max, Some(key(9)));

        let tail = event_key_bounds(&stripes, &index, 200, u64::MAX).unwrap();
        assert_eq!(tail.min, Some(key(19)));
        assert_eq!(tail.max, None);
    }

    #[test]
    fn event_bounds_reject_short_key_index() {
        let stripes = stripes(&[10, 10, 10]);
        let index = [key(9)];

        assert!(event_key_bounds(&stripes, &index, 100, 200).is_err());
    }

    #[test]
    fn original_bounds_synthesize_row_ids() {
        let stripes = stripes(&[10, 10, 10]);

        let interval = original_key_bounds(&stripes, 0, 100, 200);
        assert_eq!(interval.min, Some(RecordId::new(0, 0, 9)));
        assert_eq!(interval.max, Some(RecordId::new(0, 0, 19)));

        let tail = original_key_bounds(&stripes, 0, 100, u64::MAX);
        assert_eq!(tail.min, Some(RecordId::new(0, 0, 9)));
        assert_eq!(tail.max, None);
    }

    #[test]
    fn original_bounds_inside_one_stripe_collapse_to_an_empty_window() {
        let stripes = stripes(&[10, 10, 10]);

        let interval = original_key_bounds(&stripes, 0, 110, 150);
        assert_eq!(interval.min, interval.max);
        assert!(!interval.contains(&RecordId::new(0, 0, 10)));
    }
}
