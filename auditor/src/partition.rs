//! Key-space partitioning.
//!
//! Turns the probed key bounds of a table into an ordered list of disjoint
//! ranges sized for fingerprinting, and splits a mismatching range into
//! narrower children during drill-down.

use crate::types::{Key, KeyBounds, KeyRange};

/// Partitions the covered key space into ranges targeting `range_size` rows.
///
/// The stride is derived from the probed row count, so a uniformly
/// distributed key yields about `range_size` rows per range while a sparse
/// table yields proportionally fewer, wider ranges instead of a flood of
/// empty ones. Clustered keys can still overshoot the target; the checker
/// probes each range's row count and splits outliers before fingerprinting.
///
/// Ranges are half-open and contiguous except for the last one, which is
/// closed so the maximum key itself is covered even at the upper edge of the
/// key domain.
pub fn partition(bounds: KeyBounds, range_size: u64) -> Vec<KeyRange> {
    let min = bounds.min as i128;
    let max = bounds.max as i128;
    let width = (max - min + 1) as u128;

    let pieces = (bounds.rows.max(1) as u128)
        .div_ceil(range_size.max(1) as u128)
        .min(width);
    let stride = width.div_ceil(pieces) as i128;

    let mut ranges = Vec::with_capacity(pieces as usize);
    let mut cursor = min;

    while cursor + stride <= max {
        let next = cursor + stride;
        ranges.push(KeyRange::half_open(cursor as Key, next as Key));
        cursor = next;
    }

    ranges.push(KeyRange::inclusive(cursor as Key, max as Key));

    ranges
}

/// Splits a range into up to `fanout` disjoint children covering it exactly.
///
/// Children are sized as evenly as 128-bit division allows. A range narrower
/// than the fanout degenerates into one single-key range per key, which is
/// the terminal granularity of drill-down.
pub fn split(range: KeyRange, fanout: u64) -> Vec<KeyRange> {
    let Some((low, high)) = range.effective_bounds() else {
        return Vec::new();
    };

    let fanout = fanout.max(2) as u128;
    let width = range.width();
    let pieces = width.min(fanout);
    let stride = width.div_ceil(pieces) as i128;

    let mut children = Vec::with_capacity(pieces as usize);
    let mut cursor = low as i128;
    let high = high as i128;

    while cursor + stride <= high {
        let next = cursor + stride;
        children.push(KeyRange::half_open(cursor as Key, next as Key));
        cursor = next;
    }

    children.push(KeyRange::inclusive(cursor as Key, high as Key));

    children
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bounds of a dense table, one row per key.
    fn dense(min: Key, max: Key) -> KeyBounds {
        KeyBounds {
            min,
            max,
            rows: (max as i128 - min as i128 + 1) as u64,
        }
    }

    fn assert_covers_exactly(ranges: &[KeyRange], min: Key, max: Key) {
        let mut expected = min as i128;
        for range in ranges {
            let (low, high) = range.effective_bounds().expect("non-empty range");
            assert_eq!(low as i128, expected);
            expected = high as i128 + 1;
        }
        assert_eq!(expected, max as i128 + 1);
    }

    #[test]
    fn dense_table_yields_range_size_strides() {
        let ranges = partition(dense(0, 999), 50);

        assert_eq!(ranges.len(), 20);
        assert_covers_exactly(&ranges, 0, 999);
        assert_eq!(ranges[0], KeyRange::half_open(0, 50));
    }

    #[test]
    fn uneven_width_still_covers_exactly() {
        let ranges = partition(dense(0, 249), 100);

        assert_eq!(ranges.len(), 3);
        assert_covers_exactly(&ranges, 0, 249);
    }

    #[test]
    fn sparse_table_yields_wide_ranges_not_empty_ones() {
        let bounds = KeyBounds {
            min: 0,
            max: 999_999,
            rows: 100,
        };

        let ranges = partition(bounds, 50);

        assert_eq!(ranges.len(), 2);
        assert_covers_exactly(&ranges, 0, 999_999);
    }

    #[test]
    fn single_range_when_rows_fit() {
        let ranges = partition(dense(10, 50), 100);

        assert_eq!(ranges, vec![KeyRange::inclusive(10, 50)]);
    }

    #[test]
    fn single_row_table_yields_single_key_range() {
        let ranges = partition(dense(42, 42), 100);

        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].single_key(), Some(42));
    }

    #[test]
    fn negative_keys_are_partitioned() {
        let ranges = partition(dense(-150, 149), 100);

        assert_eq!(ranges.len(), 3);
        assert_covers_exactly(&ranges, -150, 149);
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        let ranges = partition(dense(Key::MAX - 10, Key::MAX), 1);

        assert_eq!(ranges.len(), 11);
        assert_covers_exactly(&ranges, Key::MAX - 10, Key::MAX);

        let full = partition(
            KeyBounds {
                min: Key::MIN,
                max: Key::MAX,
                rows: 4,
            },
            1,
        );
        assert_eq!(full.len(), 4);
        assert_covers_exactly(&full, Key::MIN, Key::MAX);
    }

    #[test]
    fn empty_probe_yields_one_covering_range() {
        let bounds = KeyBounds {
            min: 0,
            max: 9,
            rows: 0,
        };

        let ranges = partition(bounds, 100);

        assert_eq!(ranges, vec![KeyRange::inclusive(0, 9)]);
    }

    #[test]
    fn split_produces_fanout_children() {
        let children = split(KeyRange::inclusive(0, 99), 10);

        assert_eq!(children.len(), 10);
        assert_covers_exactly(&children, 0, 99);
    }

    #[test]
    fn split_of_narrow_range_yields_single_keys() {
        let children = split(KeyRange::inclusive(5, 7), 10);

        assert_eq!(children.len(), 3);
        assert_eq!(children[0].single_key(), Some(5));
        assert_eq!(children[1].single_key(), Some(6));
        assert_eq!(children[2].single_key(), Some(7));
    }

    #[test]
    fn split_of_uneven_range_still_covers_exactly() {
        let children = split(KeyRange::inclusive(0, 100), 8);

        assert!(children.len() <= 8);
        assert_covers_exactly(&children, 0, 100);
    }

    #[test]
    fn split_of_empty_range_is_empty() {
        assert!(split(KeyRange::half_open(10, 10), 4).is_empty());
    }
}
