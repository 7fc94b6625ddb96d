//! Sources of table data to audit.
//!
//! The checker never talks to a database directly; it goes through the
//! [`AuditSource`] trait so the same comparison and drill-down logic runs
//! against live Postgres connections and in-memory tables alike.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{AuditSource, SourceSide};
pub use memory::MemoryAuditSource;
pub use self::postgres::PgAuditSource;
