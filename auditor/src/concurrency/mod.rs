//! Concurrency primitives for coordinating check workers.

pub mod shutdown;
