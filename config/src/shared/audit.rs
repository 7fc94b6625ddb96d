use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Tuning knobs for a table audit.
///
/// The re-check delay and drill-down fanout are workload-dependent; both are
/// configurable rather than fixed so operators can trade scan time against
/// false-positive pressure from replication lag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    /// Target number of rows per top-level key range.
    #[serde(default = "default_range_size")]
    pub range_size: u64,
    /// Number of sub-ranges a mismatched range is split into during drill-down.
    #[serde(default = "default_drill_down_fanout")]
    pub drill_down_fanout: u32,
    /// Time to wait, in milliseconds, before re-checking a mismatched range.
    ///
    /// A mismatch that resolves on the re-check is treated as a replication
    /// lag artifact, not a divergence.
    #[serde(default = "default_mismatch_recheck_delay_ms")]
    pub mismatch_recheck_delay_ms: u64,
    /// Per-query timeout in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Maximum number of range checks running concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u16,
    /// Name of the ordered key column used to partition the table.
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

impl AuditConfig {
    /// Default target rows per top-level range.
    pub const DEFAULT_RANGE_SIZE: u64 = 50_000;

    /// Default drill-down fanout.
    pub const DEFAULT_DRILL_DOWN_FANOUT: u32 = 10;

    /// Default mismatch re-check delay in milliseconds.
    pub const DEFAULT_MISMATCH_RECHECK_DELAY_MS: u64 = 2_000;

    /// Default per-query timeout in milliseconds.
    pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;

    /// Default worker pool size.
    pub const DEFAULT_MAX_CONCURRENCY: u16 = 4;

    /// Default partitioning key column.
    pub const DEFAULT_KEY_COLUMN: &'static str = "id";

    /// Returns the mismatch re-check delay as a [`Duration`].
    pub fn mismatch_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.mismatch_recheck_delay_ms)
    }

    /// Returns the per-query timeout as a [`Duration`].
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Validates audit configuration settings.
    ///
    /// Ensures range size, fanout and concurrency are non-zero and that a key
    /// column is named.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.range_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "audit.range_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.drill_down_fanout < 2 {
            return Err(ValidationError::InvalidFieldValue {
                field: "audit.drill_down_fanout".to_string(),
                constraint: "must be at least 2".to_string(),
            });
        }

        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "audit.max_concurrency".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.key_column.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "audit.key_column".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            range_size: default_range_size(),
            drill_down_fanout: default_drill_down_fanout(),
            mismatch_recheck_delay_ms: default_mismatch_recheck_delay_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            key_column: default_key_column(),
        }
    }
}

fn default_range_size() -> u64 {
    AuditConfig::DEFAULT_RANGE_SIZE
}

fn default_drill_down_fanout() -> u32 {
    AuditConfig::DEFAULT_DRILL_DOWN_FANOUT
}

fn default_mismatch_recheck_delay_ms() -> u64 {
    AuditConfig::DEFAULT_MISMATCH_RECHECK_DELAY_MS
}

fn default_query_timeout_ms() -> u64 {
    AuditConfig::DEFAULT_QUERY_TIMEOUT_MS
}

fn default_max_concurrency() -> u16 {
    AuditConfig::DEFAULT_MAX_CONCURRENCY
}

fn default_key_column() -> String {
    AuditConfig::DEFAULT_KEY_COLUMN.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AuditConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.range_size, AuditConfig::DEFAULT_RANGE_SIZE);
        assert_eq!(config.key_column, "id");
    }

    #[test]
    fn zero_range_size_is_rejected() {
        let config = AuditConfig {
            range_size: 0,
            ..AuditConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn fanout_below_two_is_rejected() {
        let config = AuditConfig {
            drill_down_fanout: 1,
            ..AuditConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
