//! Divergence detection between a Postgres primary and a read replica.
//!
//! The crate partitions a table's key space into ranges, fingerprints each
//! range on both sides with an order-independent aggregate, and drills down
//! on mismatches until the exact differing rows are known, tolerating
//! replication lag along the way. It reports divergence; it never repairs it.
//!
//! [`checker::TableChecker`] is the entry point; [`source::AuditSource`]
//! abstracts where the rows live.

pub mod checker;
pub mod compare;
pub mod concurrency;
mod drill;
pub mod error;
mod macros;
pub mod partition;
pub mod report;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
