//! Final output of a check run.

use std::fmt::Write as _;

use serde::Serialize;

use crate::types::{Key, KeyRange};

/// Consistency verdict for the audited table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableStatus {
    /// Every range matched, directly or after the lag re-check.
    Consistent,
    /// At least one row-level difference was confirmed.
    Inconsistent,
    /// Some ranges could not be verified, and none diverged.
    Inconclusive,
}

/// A confirmed row-level difference between the two sides.
///
/// `None` on a side means the row is absent there. Only produced at
/// single-key granularity, after the lag re-check failed to resolve the
/// mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivergenceRecord {
    pub key: Key,
    pub primary: Option<String>,
    pub replica: Option<String>,
}

/// A range that could not be verified on at least one side.
#[derive(Debug, Clone, Serialize)]
pub struct RangeFailure {
    pub range: KeyRange,
    pub error: String,
}

/// Accumulated result of one table check run.
///
/// Built incrementally by the checker's collector and finalized once all
/// workers are done; [`Report::finalize`] computes the verdict from what was
/// recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Fully qualified name of the audited table.
    pub table: String,
    /// Key column the table was partitioned over.
    pub key_column: String,
    /// Union of both sides' key bounds, `None` when both sides were empty.
    pub scanned_range: Option<KeyRange>,
    /// Number of top-level ranges checked.
    pub total_ranges: u64,
    /// Ranges whose fingerprints matched on first comparison.
    pub matched_ranges: u64,
    /// Ranges whose fingerprints mismatched and entered drill-down.
    pub mismatched_ranges: u64,
    /// Mismatches that resolved after the replication-lag re-check.
    pub transient_mismatches: u64,
    /// Confirmed row-level differences, ordered by key.
    pub divergences: Vec<DivergenceRecord>,
    /// Ranges that errored out after the retry.
    pub failures: Vec<RangeFailure>,
    /// Primary-minus-replica `MAX(updated_at)` delta in seconds, when known.
    pub replication_lag_seconds: Option<f64>,
    /// Whether the run was stopped before all ranges were checked.
    pub interrupted: bool,
    pub status: TableStatus,
}

impl Report {
    pub fn new(table: String, key_column: String) -> Report {
        Report {
            table,
            key_column,
            scanned_range: None,
            total_ranges: 0,
            matched_ranges: 0,
            mismatched_ranges: 0,
            transient_mismatches: 0,
            divergences: Vec::new(),
            failures: Vec::new(),
            replication_lag_seconds: None,
            interrupted: false,
            status: TableStatus::Consistent,
        }
    }

    pub fn record_match(&mut self) {
        self.matched_ranges += 1;
    }

    pub fn record_mismatch(&mut self) {
        self.mismatched_ranges += 1;
    }

    pub fn record_transient(&mut self) {
        self.transient_mismatches += 1;
    }

    pub fn record_divergence(&mut self, record: DivergenceRecord) {
        self.divergences.push(record);
    }

    pub fn record_failure(&mut self, range: KeyRange, error: String) {
        self.failures.push(RangeFailure { range, error });
    }

    /// Computes the final verdict.
    ///
    /// A confirmed divergence always wins: a table proven different is
    /// inconsistent even if other ranges could not be verified. Only a run
    /// with no divergences degrades to inconclusive on errors or
    /// interruption.
    pub fn finalize(&mut self) {
        self.divergences.sort_by_key(|record| record.key);
        self.divergences.dedup();

        self.status = if !self.divergences.is_empty() {
            TableStatus::Inconsistent
        } else if !self.failures.is_empty() || self.interrupted {
            TableStatus::Inconclusive
        } else {
            TableStatus::Consistent
        };
    }

    /// Renders the report as a human-readable text summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "table: {}", self.table);
        match self.scanned_range {
            Some(range) => {
                let _ = writeln!(out, "scanned: {} over {}", range, self.key_column);
            }
            None => {
                let _ = writeln!(out, "scanned: empty on both sides");
            }
        }
        let _ = writeln!(
            out,
            "ranges: {} total, {} matched, {} mismatched, {} transient",
            self.total_ranges,
            self.matched_ranges,
            self.mismatched_ranges,
            self.transient_mismatches
        );

        if let Some(lag) = self.replication_lag_seconds {
            let _ = writeln!(out, "replication lag: {lag:.3}s");
        }

        for record in &self.divergences {
            let describe = |row: &Option<String>| match row {
                Some(text) => text.clone(),
                None => "<absent>".to_string(),
            };
            let _ = writeln!(
                out,
                "divergent key {}: primary={} replica={}",
                record.key,
                describe(&record.primary),
                describe(&record.replica)
            );
        }

        for failure in &self.failures {
            let _ = writeln!(out, "failed range {}: {}", failure.range, failure.error);
        }

        if self.interrupted {
            let _ = writeln!(out, "run interrupted before completion");
        }

        let status = match self.status {
            TableStatus::Consistent => "CONSISTENT",
            TableStatus::Inconsistent => "INCONSISTENT",
            TableStatus::Inconclusive => "INCONCLUSIVE",
        };
        let _ = writeln!(out, "status: {status}");

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report::new("public.users".to_string(), "id".to_string())
    }

    #[test]
    fn clean_run_is_consistent() {
        let mut report = report();
        report.total_ranges = 4;
        report.record_match();
        report.record_match();
        report.record_mismatch();
        report.record_transient();

        report.finalize();
        assert_eq!(report.status, TableStatus::Consistent);
    }

    #[test]
    fn divergence_makes_run_inconsistent() {
        let mut report = report();
        report.record_divergence(DivergenceRecord {
            key: 7,
            primary: Some("(7,a)".to_string()),
            replica: Some("(7,b)".to_string()),
        });

        report.finalize();
        assert_eq!(report.status, TableStatus::Inconsistent);
    }

    #[test]
    fn errors_without_divergence_are_inconclusive() {
        let mut report = report();
        report.record_failure(KeyRange::inclusive(0, 9), "query timed out".to_string());

        report.finalize();
        assert_eq!(report.status, TableStatus::Inconclusive);
    }

    #[test]
    fn divergence_outranks_errors() {
        let mut report = report();
        report.record_failure(KeyRange::inclusive(0, 9), "query timed out".to_string());
        report.record_divergence(DivergenceRecord {
            key: 3,
            primary: Some("(3,a)".to_string()),
            replica: None,
        });

        report.finalize();
        assert_eq!(report.status, TableStatus::Inconsistent);
    }

    #[test]
    fn interruption_is_inconclusive() {
        let mut report = report();
        report.interrupted = true;

        report.finalize();
        assert_eq!(report.status, TableStatus::Inconclusive);
    }

    #[test]
    fn divergences_are_sorted_and_deduplicated() {
        let mut report = report();
        let record = DivergenceRecord {
            key: 9,
            primary: None,
            replica: Some("(9,x)".to_string()),
        };
        report.record_divergence(record.clone());
        report.record_divergence(DivergenceRecord {
            key: 2,
            primary: Some("(2,a)".to_string()),
            replica: None,
        });
        report.record_divergence(record);

        report.finalize();
        assert_eq!(report.divergences.len(), 2);
        assert_eq!(report.divergences[0].key, 2);
        assert_eq!(report.divergences[1].key, 9);
    }

    #[test]
    fn report_serializes_to_json() {
        let mut report = report();
        report.scanned_range = Some(KeyRange::inclusive(0, 99));
        report.total_ranges = 2;
        report.record_match();
        report.record_match();
        report.finalize();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["table"], "public.users");
        assert_eq!(value["status"], "Consistent");
        assert_eq!(value["total_ranges"], 2);
    }

    #[test]
    fn text_rendering_mentions_divergent_keys() {
        let mut report = report();
        report.record_divergence(DivergenceRecord {
            key: 42,
            primary: Some("(42,a)".to_string()),
            replica: None,
        });
        report.finalize();

        let text = report.render_text();
        assert!(text.contains("divergent key 42"));
        assert!(text.contains("<absent>"));
        assert!(text.contains("INCONSISTENT"));
    }
}
