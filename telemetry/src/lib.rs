//! Tracing initialization for the auditor binaries and tests.

pub mod tracing;
