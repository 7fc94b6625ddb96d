//! Core value types for table auditing.
//!
//! A table is partitioned over a totally ordered `BIGINT` key. Ranges over
//! that key space and the order-independent fingerprints computed per range
//! are the transient currency of a check run; only the final report outlives
//! it.

use serde::Serialize;
use std::fmt;
use std::hash::{DefaultHasher, Hasher};

/// The partitioning key of an audited table.
///
/// The auditor assumes a deterministic, totally ordered key; a `BIGINT`
/// primary key column covers the overwhelmingly common case.
pub type Key = i64;

/// Observed key bounds of a table, produced by a bounds probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBounds {
    /// Smallest key present.
    pub min: Key,
    /// Largest key present.
    pub max: Key,
    /// Row count at probe time, used to size partitions.
    pub rows: u64,
}

impl KeyBounds {
    /// Merges two sides' bounds into the widest covering bound.
    ///
    /// The scan must cover keys that exist on only one side, so the union of
    /// both probes is used. The larger row count is kept as the density
    /// estimate.
    pub fn union(self, other: KeyBounds) -> KeyBounds {
        KeyBounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            rows: self.rows.max(other.rows),
        }
    }
}

/// A contiguous slice of a table's key space.
///
/// Ranges produced by the partitioner are disjoint, contiguous and ordered;
/// together they cover the scanned bound exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyRange {
    /// Lower bound of the range.
    pub lower: Key,
    /// Upper bound of the range.
    pub upper: Key,
    /// Whether `lower` itself belongs to the range.
    pub inclusive_lower: bool,
    /// Whether `upper` itself belongs to the range.
    pub inclusive_upper: bool,
}

impl KeyRange {
    /// Creates a closed range `[lower, upper]`.
    pub fn inclusive(lower: Key, upper: Key) -> KeyRange {
        KeyRange {
            lower,
            upper,
            inclusive_lower: true,
            inclusive_upper: true,
        }
    }

    /// Creates a half-open range `[lower, upper)`.
    pub fn half_open(lower: Key, upper: Key) -> KeyRange {
        KeyRange {
            lower,
            upper,
            inclusive_lower: true,
            inclusive_upper: false,
        }
    }

    /// Returns the effective inclusive `(low, high)` bounds, or `None` if the
    /// range contains no keys.
    ///
    /// Computed in 128-bit arithmetic so that exclusive bounds at the extremes
    /// of the key domain cannot overflow.
    pub fn effective_bounds(&self) -> Option<(Key, Key)> {
        let mut low = self.lower as i128;
        if !self.inclusive_lower {
            low += 1;
        }

        let mut high = self.upper as i128;
        if !self.inclusive_upper {
            high -= 1;
        }

        if low > high {
            return None;
        }

        Some((low as Key, high as Key))
    }

    /// Returns the number of keys the range can contain.
    pub fn width(&self) -> u128 {
        match self.effective_bounds() {
            Some((low, high)) => (high as i128 - low as i128 + 1) as u128,
            None => 0,
        }
    }

    /// Returns the single key covered by this range, if it covers exactly one.
    ///
    /// A single-key range is the terminal granularity of drill-down.
    pub fn single_key(&self) -> Option<Key> {
        match self.effective_bounds() {
            Some((low, high)) if low == high => Some(low),
            _ => None,
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.inclusive_lower { '[' } else { '(' };
        let close = if self.inclusive_upper { ']' } else { ')' };
        write!(f, "{open}{}, {}{close}", self.lower, self.upper)
    }
}

/// Two independent 64-bit digests of a single row's textual rendering.
///
/// The Postgres source computes these server-side from the two halves of
/// `md5(row::text)`; [`RowDigest::of_text`] is the in-process analogue used by
/// the memory source. Digests from different source implementations are not
/// mutually comparable, but within one implementation two identical rows
/// always digest identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowDigest {
    pub lo: u64,
    pub hi: u64,
}

impl RowDigest {
    /// Digests a row's textual rendering.
    pub fn of_text(text: &str) -> RowDigest {
        RowDigest {
            lo: salted_hash(0x1f, text),
            hi: salted_hash(0x2e, text),
        }
    }
}

fn salted_hash(salt: u8, text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write_u8(salt);
    hasher.write(text.as_bytes());
    hasher.finish()
}

/// An order-independent fingerprint of all rows in a key range.
///
/// Combining is commutative (XOR of per-row digests plus a row count), so two
/// scans of identical row sets produce identical fingerprints regardless of
/// scan order, while any row-level difference changes the value with
/// overwhelming probability. The empty range fingerprints to the default
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Fingerprint {
    /// Number of rows folded into this fingerprint.
    pub rows: u64,
    /// XOR of the low digest halves.
    pub digest_lo: u64,
    /// XOR of the high digest halves.
    pub digest_hi: u64,
}

impl Fingerprint {
    /// Folds one row digest into the fingerprint.
    pub fn combine(&mut self, digest: RowDigest) {
        self.rows += 1;
        self.digest_lo ^= digest.lo;
        self.digest_hi ^= digest.hi;
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}{:016x}/{}",
            self.digest_hi, self.digest_lo, self.rows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_order_independent() {
        let rows = ["(1,alice)", "(2,bob)", "(3,carol)"];

        let mut forward = Fingerprint::default();
        for row in rows.iter() {
            forward.combine(RowDigest::of_text(row));
        }

        let mut backward = Fingerprint::default();
        for row in rows.iter().rev() {
            backward.combine(RowDigest::of_text(row));
        }

        assert_eq!(forward, backward);
    }

    #[test]
    fn fingerprint_is_sensitive_to_single_cell_changes() {
        let mut original = Fingerprint::default();
        original.combine(RowDigest::of_text("(1,alice)"));
        original.combine(RowDigest::of_text("(2,bob)"));

        let mut altered = Fingerprint::default();
        altered.combine(RowDigest::of_text("(1,alice)"));
        altered.combine(RowDigest::of_text("(2,bos)"));

        assert_ne!(original, altered);
    }

    #[test]
    fn fingerprint_is_sensitive_to_missing_rows() {
        let mut full = Fingerprint::default();
        full.combine(RowDigest::of_text("(1,alice)"));
        full.combine(RowDigest::of_text("(2,bob)"));

        let mut partial = Fingerprint::default();
        partial.combine(RowDigest::of_text("(1,alice)"));

        assert_ne!(full, partial);
    }

    #[test]
    fn empty_ranges_fingerprint_identically() {
        assert_eq!(Fingerprint::default(), Fingerprint::default());
    }

    #[test]
    fn effective_bounds_normalize_exclusive_edges() {
        let range = KeyRange::half_open(10, 20);
        assert_eq!(range.effective_bounds(), Some((10, 19)));

        let range = KeyRange::inclusive(10, 20);
        assert_eq!(range.effective_bounds(), Some((10, 20)));
    }

    #[test]
    fn empty_half_open_range_has_no_bounds() {
        let range = KeyRange::half_open(10, 10);

        assert_eq!(range.effective_bounds(), None);
        assert_eq!(range.width(), 0);
        assert_eq!(range.single_key(), None);
    }

    #[test]
    fn single_key_detection() {
        assert_eq!(KeyRange::inclusive(7, 7).single_key(), Some(7));
        assert_eq!(KeyRange::half_open(7, 8).single_key(), Some(7));
        assert_eq!(KeyRange::inclusive(7, 8).single_key(), None);
    }

    #[test]
    fn width_survives_extreme_bounds() {
        let range = KeyRange::inclusive(Key::MIN, Key::MAX);

        assert_eq!(range.width(), u64::MAX as u128 + 1);
    }

    #[test]
    fn bounds_union_takes_widest_cover() {
        let a = KeyBounds {
            min: 10,
            max: 100,
            rows: 80,
        };
        let b = KeyBounds {
            min: 5,
            max: 90,
            rows: 70,
        };

        let merged = a.union(b);
        assert_eq!(merged.min, 5);
        assert_eq!(merged.max, 100);
        assert_eq!(merged.rows, 80);
    }
}
