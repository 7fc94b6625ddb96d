//! Table checking orchestration.
//!
//! [`TableChecker`] is the entry point of the crate: it probes key bounds on
//! both sides, partitions the covered key space, fans the ranges out over a
//! bounded worker pool, and folds the workers' outcomes into a [`Report`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use config::shared::AuditConfig;
use postgres::types::TableName;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, warn};

use crate::audit_error;
use crate::compare::{ComparisonResult, RangeStatus};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown};
use crate::drill::{DrillOptions, drill_range};
use crate::error::{AuditResult, ErrorKind};
use crate::partition::{partition, split};
use crate::report::{DivergenceRecord, Report};
use crate::source::AuditSource;
use crate::types::{KeyBounds, KeyRange};

/// Backoff before the single retry of a timed-out query.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Buffer size of the worker-to-collector outcome channel.
const OUTCOME_CHANNEL_SIZE: usize = 128;

/// Runs a query under the per-query timeout, retrying once on timeout.
///
/// Only timeouts are retried; a query the server rejected will be rejected
/// again, so those errors surface immediately.
pub(crate) async fn query_with_retry<T, F, Fut>(timeout: Duration, mut op: F) -> AuditResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AuditResult<T>>,
{
    match time::timeout(timeout, op()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("query timed out, retrying once");
            time::sleep(RETRY_BACKOFF).await;

            match time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(elapsed) => Err(elapsed.into()),
            }
        }
    }
}

/// One worker's contribution to the report, sent over the outcome channel so
/// a single collector owns the report mutation.
#[derive(Debug)]
enum CheckOutcome {
    Match,
    Mismatch,
    /// A preemptive oversize split added this many top-level ranges.
    ExtraRanges(u64),
    Transients(u64),
    Divergence(DivergenceRecord),
    Failure {
        range: KeyRange,
        error: String,
    },
    Interrupted,
}

fn apply_outcome(report: &mut Report, outcome: CheckOutcome) {
    match outcome {
        CheckOutcome::Match => report.record_match(),
        CheckOutcome::Mismatch => report.record_mismatch(),
        CheckOutcome::ExtraRanges(count) => report.total_ranges += count,
        CheckOutcome::Transients(count) => report.transient_mismatches += count,
        CheckOutcome::Divergence(record) => report.record_divergence(record),
        CheckOutcome::Failure { range, error } => report.record_failure(range, error),
        CheckOutcome::Interrupted => report.interrupted = true,
    }
}

/// Checks one table across a primary/replica pair.
///
/// The two sources must share fingerprint semantics, which in practice means
/// the same [`AuditSource`] implementation on both sides.
#[derive(Debug)]
pub struct TableChecker<P, R> {
    primary: P,
    replica: R,
    table: TableName,
    config: AuditConfig,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<P, R> TableChecker<P, R>
where
    P: AuditSource + Clone + Send + Sync + 'static,
    R: AuditSource + Clone + Send + Sync + 'static,
{
    pub fn new(primary: P, replica: R, table: TableName, config: AuditConfig) -> TableChecker<P, R> {
        let (shutdown_tx, shutdown_rx) = create_shutdown();

        TableChecker {
            primary,
            replica,
            table,
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Returns a handle that stops the run at the next safe point.
    ///
    /// A run stopped this way yields an inconclusive report, never a
    /// consistent one.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Runs the check to completion (or until shutdown) and returns the report.
    ///
    /// Connection-level failures and bounds-probe failures abort the run with
    /// an error; everything after that degrades to per-range failure entries
    /// in the report.
    pub async fn run(self) -> AuditResult<Report> {
        let mut report = Report::new(self.table.to_string(), self.config.key_column.clone());

        report.replication_lag_seconds = self.probe_replication_lag().await;

        let Some(bounds) = self.probe_key_bounds().await? else {
            info!(table = %self.table, "table is empty on both sides");
            report.finalize();
            return Ok(report);
        };

        let ranges = partition(bounds, self.config.range_size);
        report.scanned_range = Some(KeyRange::inclusive(bounds.min, bounds.max));
        report.total_ranges = ranges.len() as u64;

        info!(
            table = %self.table,
            ranges = ranges.len(),
            rows = bounds.rows,
            "starting table check"
        );

        let (outcome_tx, mut outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_SIZE);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency as usize));

        // A single collector owns the report while workers run, so outcomes
        // drain even when every worker is busy sending.
        let collector = tokio::spawn(async move {
            while let Some(outcome) = outcome_rx.recv().await {
                apply_outcome(&mut report, outcome);
            }

            report
        });

        let mut workers: JoinSet<KeyRange> = JoinSet::new();
        for range in ranges {
            let primary = self.primary.clone();
            let replica = self.replica.clone();
            let table = self.table.clone();
            let config = self.config.clone();
            let shutdown = self.shutdown_rx.clone();
            let semaphore = semaphore.clone();
            let outcome_tx = outcome_tx.clone();

            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return range;
                };

                check_top_range(
                    &primary,
                    &replica,
                    &table,
                    &config,
                    range,
                    &shutdown,
                    &outcome_tx,
                )
                .await;

                range
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(join_error) = joined {
                warn!(%join_error, "range check worker panicked");
                let _ = outcome_tx
                    .send(CheckOutcome::Failure {
                        range: KeyRange::inclusive(bounds.min, bounds.max),
                        error: format!("range check worker panicked: {join_error}"),
                    })
                    .await;
            }
        }
        drop(outcome_tx);

        let mut report = collector.await.map_err(|join_error| {
            audit_error!(
                ErrorKind::WorkerPanic,
                "report collector task panicked",
                source: join_error
            )
        })?;

        if self.shutdown_rx.is_signaled() {
            report.interrupted = true;
        }

        report.finalize();

        info!(table = %self.table, status = ?report.status, "table check finished");

        Ok(report)
    }

    /// Probes `MAX(updated_at)` on both sides and returns the delta in seconds.
    ///
    /// Purely informational: a failed probe (for example when the table has no
    /// `updated_at` column) leaves the field empty and never affects the
    /// verdict.
    async fn probe_replication_lag(&self) -> Option<f64> {
        let (primary_max, replica_max) = tokio::join!(
            self.primary.max_updated_at(&self.table),
            self.replica.max_updated_at(&self.table),
        );

        match (primary_max, replica_max) {
            (Ok(Some(primary_max)), Ok(Some(replica_max))) => Some(primary_max - replica_max),
            (Ok(_), Ok(_)) => None,
            (Err(err), _) | (_, Err(err)) => {
                debug!(%err, "replication lag probe unavailable");
                None
            }
        }
    }

    /// Probes key bounds on both sides and returns their union.
    ///
    /// The union guarantees keys present on only one side at either extreme
    /// still fall inside a scanned range.
    async fn probe_key_bounds(&self) -> AuditResult<Option<KeyBounds>> {
        let timeout = self.config.query_timeout();
        let (primary_bounds, replica_bounds) = tokio::join!(
            query_with_retry(timeout, || self
                .primary
                .key_bounds(&self.table, &self.config.key_column)),
            query_with_retry(timeout, || self
                .replica
                .key_bounds(&self.table, &self.config.key_column)),
        );

        let bounds = match (primary_bounds?, replica_bounds?) {
            (Some(primary_bounds), Some(replica_bounds)) => {
                Some(primary_bounds.union(replica_bounds))
            }
            (Some(bounds), None) | (None, Some(bounds)) => Some(bounds),
            (None, None) => None,
        };

        Ok(bounds)
    }
}

/// Checks one top-level range, drilling down on mismatch.
///
/// Ranges that the row-count probe shows to be far denser than the target
/// size are split before fingerprinting, so a hot spot in the key
/// distribution does not produce ranges too wide to drill efficiently.
async fn check_top_range<P, R>(
    primary: &P,
    replica: &R,
    table: &TableName,
    config: &AuditConfig,
    top: KeyRange,
    shutdown: &ShutdownRx,
    outcome_tx: &mpsc::Sender<CheckOutcome>,
) where
    P: AuditSource,
    R: AuditSource,
{
    let timeout = config.query_timeout();
    let drill_options = DrillOptions {
        fanout: config.drill_down_fanout as u64,
        recheck_delay: config.mismatch_recheck_delay(),
        query_timeout: timeout,
    };

    let mut queue = vec![top];
    while let Some(range) = queue.pop() {
        if shutdown.is_signaled() {
            let _ = outcome_tx.send(CheckOutcome::Interrupted).await;
            return;
        }

        if range.single_key().is_none() {
            let count =
                query_with_retry(timeout, || primary.count_rows(table, &config.key_column, range))
                    .await;
            match count {
                Ok(count) if count > config.range_size.saturating_mul(2) => {
                    let children = split(range, config.drill_down_fanout as u64);
                    debug!(%range, count, parts = children.len(), "splitting oversize range");
                    let _ = outcome_tx
                        .send(CheckOutcome::ExtraRanges(children.len() as u64 - 1))
                        .await;
                    queue.extend(children);
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    let _ = outcome_tx
                        .send(CheckOutcome::Failure {
                            range,
                            error: error.to_string(),
                        })
                        .await;
                    continue;
                }
            }
        }

        let fingerprints = tokio::join!(
            query_with_retry(timeout, || primary.range_fingerprint(
                table,
                &config.key_column,
                range
            )),
            query_with_retry(timeout, || replica.range_fingerprint(
                table,
                &config.key_column,
                range
            )),
        );
        let (primary_fp, replica_fp) = match fingerprints {
            (Ok(primary_fp), Ok(replica_fp)) => (primary_fp, replica_fp),
            (Err(error), _) | (_, Err(error)) => {
                let _ = outcome_tx
                    .send(CheckOutcome::Failure {
                        range,
                        error: error.to_string(),
                    })
                    .await;
                continue;
            }
        };

        let comparison = ComparisonResult::new(range, primary_fp, replica_fp);
        if comparison.status == RangeStatus::Match {
            let _ = outcome_tx.send(CheckOutcome::Match).await;
            continue;
        }

        debug!(%range, %primary_fp, %replica_fp, "range fingerprints differ");
        let _ = outcome_tx.send(CheckOutcome::Mismatch).await;

        let drilled = drill_range(
            primary,
            replica,
            table,
            &config.key_column,
            range,
            drill_options,
            shutdown,
        )
        .await;

        if drilled.transients > 0 {
            let _ = outcome_tx
                .send(CheckOutcome::Transients(drilled.transients))
                .await;
        }
        for record in drilled.divergences {
            let _ = outcome_tx.send(CheckOutcome::Divergence(record)).await;
        }
        for (failed_range, error) in drilled.failures {
            let _ = outcome_tx
                .send(CheckOutcome::Failure {
                    range: failed_range,
                    error: error.to_string(),
                })
                .await;
        }
        if drilled.interrupted {
            let _ = outcome_tx.send(CheckOutcome::Interrupted).await;
            return;
        }
    }
}
