//! Drill-down from a mismatched range to the exact differing rows.

use std::collections::VecDeque;
use std::time::Duration;

use postgres::types::TableName;
use tracing::{debug, info};

use crate::checker::query_with_retry;
use crate::compare::{RangeStatus, compare};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::AuditError;
use crate::partition::split;
use crate::report::DivergenceRecord;
use crate::source::AuditSource;
use crate::types::KeyRange;

/// Tuning knobs for one drill-down, derived from the audit config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DrillOptions {
    pub fanout: u64,
    pub recheck_delay: Duration,
    pub query_timeout: Duration,
}

/// What one drill-down over a mismatched top-level range produced.
#[derive(Debug, Default)]
pub(crate) struct DrillResult {
    /// Mismatches that disappeared on re-check, attributed to replication lag.
    pub transients: u64,
    /// Row-level differences that survived the re-check.
    pub divergences: Vec<DivergenceRecord>,
    /// Branches abandoned because a query failed after the retry.
    pub failures: Vec<(KeyRange, AuditError)>,
    /// Whether shutdown stopped the drill before the queue drained.
    pub interrupted: bool,
}

/// Narrows a mismatched range down to per-key divergence records.
///
/// Runs an explicit work queue instead of recursing, so the drill depth never
/// grows the call stack. Every split strictly shrinks its range, which bounds
/// the queue life to `ceil(log_fanout(width))` levels. A branch that stops
/// mismatching along the way is dropped silently; the difference it carried
/// either lives in a sibling branch or was replication lag that has since
/// caught up.
pub(crate) async fn drill_range<P, R>(
    primary: &P,
    replica: &R,
    table: &TableName,
    key_column: &str,
    top: KeyRange,
    options: DrillOptions,
    shutdown: &ShutdownRx,
) -> DrillResult
where
    P: AuditSource,
    R: AuditSource,
{
    let mut result = DrillResult::default();
    let mut queue = VecDeque::from([top]);

    while let Some(range) = queue.pop_front() {
        if shutdown.is_signaled() {
            result.interrupted = true;
            break;
        }

        let fingerprints = tokio::join!(
            query_with_retry(options.query_timeout, || primary.range_fingerprint(
                table, key_column, range
            )),
            query_with_retry(options.query_timeout, || replica.range_fingerprint(
                table, key_column, range
            )),
        );
        let (primary_fp, replica_fp) = match fingerprints {
            (Ok(primary_fp), Ok(replica_fp)) => (primary_fp, replica_fp),
            (Err(err), _) | (_, Err(err)) => {
                result.failures.push((range, err));
                continue;
            }
        };

        if compare(&primary_fp, &replica_fp) == RangeStatus::Match {
            continue;
        }

        // Give replication a chance to catch up before treating the mismatch
        // as real.
        debug!(%range, "mismatch persists, re-checking after delay");
        tokio::time::sleep(options.recheck_delay).await;

        let rechecked = tokio::join!(
            query_with_retry(options.query_timeout, || primary.range_fingerprint(
                table, key_column, range
            )),
            query_with_retry(options.query_timeout, || replica.range_fingerprint(
                table, key_column, range
            )),
        );
        let (primary_fp, replica_fp) = match rechecked {
            (Ok(primary_fp), Ok(replica_fp)) => (primary_fp, replica_fp),
            (Err(err), _) | (_, Err(err)) => {
                result.failures.push((range, err));
                continue;
            }
        };

        if compare(&primary_fp, &replica_fp) == RangeStatus::Match {
            info!(%range, "mismatch resolved on re-check, attributing to replication lag");
            result.transients += 1;
            continue;
        }

        if let Some(key) = range.single_key() {
            let rows = tokio::join!(
                query_with_retry(options.query_timeout, || primary.fetch_row(
                    table, key_column, key
                )),
                query_with_retry(options.query_timeout, || replica.fetch_row(
                    table, key_column, key
                )),
            );
            match rows {
                (Ok(primary_row), Ok(replica_row)) => {
                    if primary_row == replica_row {
                        info!(key, "rows equal on direct fetch, attributing to replication lag");
                        result.transients += 1;
                    } else {
                        result.divergences.push(DivergenceRecord {
                            key,
                            primary: primary_row,
                            replica: replica_row,
                        });
                    }
                }
                (Err(err), _) | (_, Err(err)) => {
                    result.failures.push((range, err));
                }
            }
            continue;
        }

        for child in split(range, options.fanout) {
            queue.push_back(child);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown;
    use crate::source::memory::MemoryAuditSource;

    fn options() -> DrillOptions {
        DrillOptions {
            fanout: 4,
            recheck_delay: Duration::from_millis(0),
            query_timeout: Duration::from_secs(5),
        }
    }

    fn users() -> TableName {
        TableName::new("public".to_string(), "users".to_string())
    }

    async fn seeded_pair(rows: u64) -> (MemoryAuditSource, MemoryAuditSource) {
        let primary = MemoryAuditSource::new();
        let replica = MemoryAuditSource::new();
        for key in 0..rows as i64 {
            primary.upsert_row(&users(), key, format!("({key},v)")).await;
            replica.upsert_row(&users(), key, format!("({key},v)")).await;
        }
        (primary, replica)
    }

    #[tokio::test]
    async fn pinpoints_single_mutated_row() {
        let (primary, replica) = seeded_pair(100).await;
        replica.upsert_row(&users(), 37, "(37,mutated)").await;
        let (_tx, shutdown) = create_shutdown();

        let result = drill_range(
            &primary,
            &replica,
            &users(),
            "id",
            KeyRange::inclusive(0, 99),
            options(),
            &shutdown,
        )
        .await;

        assert_eq!(result.divergences.len(), 1);
        assert_eq!(result.divergences[0].key, 37);
        assert_eq!(result.divergences[0].primary.as_deref(), Some("(37,v)"));
        assert_eq!(
            result.divergences[0].replica.as_deref(),
            Some("(37,mutated)")
        );
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn pinpoints_missing_and_extra_rows() {
        let (primary, replica) = seeded_pair(50).await;
        replica.delete_row(&users(), 10).await;
        replica.upsert_row(&users(), 200, "(200,extra)").await;
        let (_tx, shutdown) = create_shutdown();

        let result = drill_range(
            &primary,
            &replica,
            &users(),
            "id",
            KeyRange::inclusive(0, 200),
            options(),
            &shutdown,
        )
        .await;

        let keys: Vec<_> = result.divergences.iter().map(|d| d.key).collect();
        assert_eq!(keys, vec![10, 200]);
        assert_eq!(result.divergences[0].replica, None);
        assert_eq!(result.divergences[1].primary, None);
    }

    #[tokio::test]
    async fn identical_ranges_produce_nothing() {
        let (primary, replica) = seeded_pair(20).await;
        let (_tx, shutdown) = create_shutdown();

        let result = drill_range(
            &primary,
            &replica,
            &users(),
            "id",
            KeyRange::inclusive(0, 19),
            options(),
            &shutdown,
        )
        .await;

        assert!(result.divergences.is_empty());
        assert_eq!(result.transients, 0);
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_queue() {
        let (primary, replica) = seeded_pair(100).await;
        replica.upsert_row(&users(), 5, "(5,mutated)").await;
        let (tx, shutdown) = create_shutdown();
        tx.shutdown();

        let result = drill_range(
            &primary,
            &replica,
            &users(),
            "id",
            KeyRange::inclusive(0, 99),
            options(),
            &shutdown,
        )
        .await;

        assert!(result.interrupted);
        assert!(result.divergences.is_empty());
    }
}
