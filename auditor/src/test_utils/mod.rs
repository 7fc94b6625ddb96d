//! Test helpers for exercising the checker against misbehaving sources.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use postgres::types::TableName;

use crate::audit_error;
use crate::error::{AuditResult, ErrorKind};
use crate::source::AuditSource;
use crate::types::{Fingerprint, Key, KeyBounds, KeyRange};

/// Wraps a source and starts failing every operation after a budget of
/// successful calls is spent.
///
/// Simulates a side that degrades mid-run. The budget is shared across
/// clones, so all workers observe the same cutover.
#[derive(Debug, Clone)]
pub struct FlakySource<S> {
    inner: S,
    remaining_successes: Arc<AtomicU64>,
}

impl<S> FlakySource<S> {
    pub fn new(inner: S, allowed_successes: u64) -> FlakySource<S> {
        FlakySource {
            inner,
            remaining_successes: Arc::new(AtomicU64::new(allowed_successes)),
        }
    }

    fn charge(&self) -> AuditResult<()> {
        let remaining = self
            .remaining_successes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| {
                budget.checked_sub(1)
            });

        match remaining {
            Ok(_) => Ok(()),
            Err(_) => Err(audit_error!(
                ErrorKind::QueryFailed,
                "injected query failure"
            )),
        }
    }
}

impl<S: AuditSource + Sync> AuditSource for FlakySource<S> {
    async fn key_bounds(
        &self,
        table: &TableName,
        key_column: &str,
    ) -> AuditResult<Option<KeyBounds>> {
        self.charge()?;
        self.inner.key_bounds(table, key_column).await
    }

    async fn count_rows(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<u64> {
        self.charge()?;
        self.inner.count_rows(table, key_column, range).await
    }

    async fn range_fingerprint(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<Fingerprint> {
        self.charge()?;
        self.inner.range_fingerprint(table, key_column, range).await
    }

    async fn fetch_row(
        &self,
        table: &TableName,
        key_column: &str,
        key: Key,
    ) -> AuditResult<Option<String>> {
        self.charge()?;
        self.inner.fetch_row(table, key_column, key).await
    }

    async fn max_updated_at(&self, table: &TableName) -> AuditResult<Option<f64>> {
        self.charge()?;
        self.inner.max_updated_at(table).await
    }
}

/// Serves stale data for a fixed number of row reads, then fresh data.
///
/// Models a replica that catches up mid-run: fingerprint and row fetches hit
/// the stale source until the budget is spent, while metadata probes always
/// see the fresh state. The budget is shared across clones.
#[derive(Debug, Clone)]
pub struct LaggingSource<S> {
    stale: S,
    fresh: S,
    stale_reads: Arc<AtomicU64>,
}

impl<S> LaggingSource<S> {
    pub fn new(stale: S, fresh: S, stale_reads: u64) -> LaggingSource<S> {
        LaggingSource {
            stale,
            fresh,
            stale_reads: Arc::new(AtomicU64::new(stale_reads)),
        }
    }

    fn still_stale(&self) -> bool {
        self.stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| {
                budget.checked_sub(1)
            })
            .is_ok()
    }
}

impl<S: AuditSource + Sync> AuditSource for LaggingSource<S> {
    async fn key_bounds(
        &self,
        table: &TableName,
        key_column: &str,
    ) -> AuditResult<Option<KeyBounds>> {
        self.fresh.key_bounds(table, key_column).await
    }

    async fn count_rows(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<u64> {
        self.fresh.count_rows(table, key_column, range).await
    }

    async fn range_fingerprint(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<Fingerprint> {
        if self.still_stale() {
            self.stale.range_fingerprint(table, key_column, range).await
        } else {
            self.fresh.range_fingerprint(table, key_column, range).await
        }
    }

    async fn fetch_row(
        &self,
        table: &TableName,
        key_column: &str,
        key: Key,
    ) -> AuditResult<Option<String>> {
        if self.still_stale() {
            self.stale.fetch_row(table, key_column, key).await
        } else {
            self.fresh.fetch_row(table, key_column, key).await
        }
    }

    async fn max_updated_at(&self, table: &TableName) -> AuditResult<Option<f64>> {
        self.fresh.max_updated_at(table).await
    }
}

/// Wraps a source and delays every operation by a fixed amount.
///
/// Used to drive the per-query timeout path deterministically.
#[derive(Debug, Clone)]
pub struct SlowSource<S> {
    inner: S,
    delay: Duration,
}

impl<S> SlowSource<S> {
    pub fn new(inner: S, delay: Duration) -> SlowSource<S> {
        SlowSource { inner, delay }
    }
}

impl<S: AuditSource + Sync> AuditSource for SlowSource<S> {
    async fn key_bounds(
        &self,
        table: &TableName,
        key_column: &str,
    ) -> AuditResult<Option<KeyBounds>> {
        tokio::time::sleep(self.delay).await;
        self.inner.key_bounds(table, key_column).await
    }

    async fn count_rows(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<u64> {
        tokio::time::sleep(self.delay).await;
        self.inner.count_rows(table, key_column, range).await
    }

    async fn range_fingerprint(
        &self,
        table: &TableName,
        key_column: &str,
        range: KeyRange,
    ) -> AuditResult<Fingerprint> {
        tokio::time::sleep(self.delay).await;
        self.inner.range_fingerprint(table, key_column, range).await
    }

    async fn fetch_row(
        &self,
        table: &TableName,
        key_column: &str,
        key: Key,
    ) -> AuditResult<Option<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_row(table, key_column, key).await
    }

    async fn max_updated_at(&self, table: &TableName) -> AuditResult<Option<f64>> {
        tokio::time::sleep(self.delay).await;
        self.inner.max_updated_at(table).await
    }
}
