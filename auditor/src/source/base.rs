use std::fmt;
use std::future::Future;

use postgres::types::TableName;

use crate::error::AuditResult;
use crate::types::{Fingerprint, Key, KeyBounds, KeyRange};

/// Which side of the replication pair a source represents.
///
/// Used for error attribution and logging; the checker treats both sides
/// symmetrically otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSide {
    Primary,
    Replica,
}

impl fmt::Display for SourceSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSide::Primary => write!(f, "primary"),
            SourceSide::Replica => write!(f, "replica"),
        }
    }
}

/// A queryable table holder on one side of the replication pair.
///
/// All operations are read-only. Fingerprints are only comparable between
/// sources of the same implementation, since each implementation picks its
/// own row digest; the checker always pairs like with like.
pub trait AuditSource {
    /// Probes the minimum and maximum key and the row count of the table.
    ///
    /// Returns `None` for an empty table.
    fn key_bounds(
        &self,
        table: &TableName,
        key_column: &str,
    ) -> impl Future<Output = AuditResult<Option<KeyBounds>>> + Send;

    /// Counts the rows whose key falls within the range.
    fn count_rows(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> impl Future<Output = AuditResult<u64>> + Send;

    /// Computes the order-independent fingerprint of all rows in the range.
    ///
    /// An empty range yields the default fingerprint.
    fn range_fingerprint(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> impl Future<Output = AuditResult<Fingerprint>> + Send;

    /// Fetches the full textual rendering of the row with the given key.
    ///
    /// Returns `None` when no such row exists on this side.
    fn fetch_row(
        &self,
        table: &TableName,
        key_column: &str,
        key: Key,
    ) -> impl Future<Output = AuditResult<Option<String>>> + Send;

    /// Returns the newest `updated_at` value in the table as epoch seconds.
    ///
    /// Returns `None` for an empty table. Errors if the table has no
    /// `updated_at` column; callers using this as a lag probe treat that as
    /// "lag unknown" rather than a failure.
    fn max_updated_at(
        &self,
        table: &TableName,
    ) -> impl Future<Output = AuditResult<Option<f64>>> + Send;
}
