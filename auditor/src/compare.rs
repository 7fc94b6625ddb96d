//! Fingerprint comparison.

use serde::Serialize;

use crate::types::{Fingerprint, KeyRange};

/// Outcome of comparing one range across the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeStatus {
    /// Fingerprints agree; the range is identical on both sides.
    Match,
    /// Fingerprints disagree; the range needs drill-down.
    Mismatch,
    /// The range could not be checked on at least one side.
    Error,
}

/// A compared range together with both fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub range: KeyRange,
    pub primary: Fingerprint,
    pub replica: Fingerprint,
    pub status: RangeStatus,
}

impl ComparisonResult {
    pub fn new(range: KeyRange, primary: Fingerprint, replica: Fingerprint) -> ComparisonResult {
        ComparisonResult {
            range,
            primary,
            replica,
            status: compare(&primary, &replica),
        }
    }
}

/// Compares two range fingerprints.
///
/// A match means the row sets are identical with overwhelming probability; a
/// mismatch is definitive. Whether a mismatch reflects real divergence or
/// in-flight replication is decided later by drill-down, not here.
pub fn compare(primary: &Fingerprint, replica: &Fingerprint) -> RangeStatus {
    if primary == replica {
        RangeStatus::Match
    } else {
        RangeStatus::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowDigest;

    #[test]
    fn equal_fingerprints_match() {
        let mut a = Fingerprint::default();
        a.combine(RowDigest::of_text("(1,x)"));
        let b = a;

        assert_eq!(compare(&a, &b), RangeStatus::Match);
    }

    #[test]
    fn count_difference_is_a_mismatch() {
        let mut a = Fingerprint::default();
        a.combine(RowDigest::of_text("(1,x)"));

        let b = Fingerprint::default();

        assert_eq!(compare(&a, &b), RangeStatus::Mismatch);
    }

    #[test]
    fn content_difference_is_a_mismatch() {
        let mut a = Fingerprint::default();
        a.combine(RowDigest::of_text("(1,x)"));

        let mut b = Fingerprint::default();
        b.combine(RowDigest::of_text("(1,y)"));

        assert_eq!(compare(&a, &b), RangeStatus::Mismatch);
    }

    #[test]
    fn comparison_result_carries_status() {
        let range = KeyRange::inclusive(0, 9);
        let empty = Fingerprint::default();

        let result = ComparisonResult::new(range, empty, empty);
        assert_eq!(result.status, RangeStatus::Match);
    }
}
