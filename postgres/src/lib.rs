//! Low-level Postgres helpers shared across the auditor workspace.
//!
//! Contains identifier-safe table naming and DSN parsing. Anything that speaks
//! the wire protocol lives in the `auditor` crate's source implementations.

pub mod dsn;
pub mod types;
