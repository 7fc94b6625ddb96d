//! Command-line argument parsing and configuration resolution.

use std::fs;

use anyhow::{Context, bail};
use clap::Parser;
use config::load_config;
use config::shared::{AuditConfig, AuditorConfig};
use postgres::dsn::connection_config_from_dsn;

/// Compares a table between a Postgres primary and a read replica and reports
/// the exact rows that diverge.
#[derive(Debug, Parser)]
#[command(name = "pg-replica-auditor", version)]
pub struct Args {
    /// Connection string of the primary (libpq DSN or postgres:// URI).
    #[arg(long)]
    pub primary: Option<String>,

    /// Connection string of the read replica.
    #[arg(long)]
    pub replica: Option<String>,

    /// Table to audit.
    #[arg(long)]
    pub table: Option<String>,

    /// Schema containing the table.
    #[arg(long)]
    pub schema: Option<String>,

    /// Ordered key column to partition the table over.
    #[arg(long)]
    pub key_column: Option<String>,

    /// Target number of rows per top-level range.
    #[arg(long)]
    pub range_size: Option<u64>,

    /// Number of sub-ranges a mismatched range is split into.
    #[arg(long)]
    pub fanout: Option<u32>,

    /// Delay before re-checking a mismatched range, in milliseconds.
    #[arg(long)]
    pub recheck_delay_ms: Option<u64>,

    /// Per-query timeout in milliseconds.
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Maximum number of range checks running concurrently.
    #[arg(long)]
    pub concurrency: Option<u16>,

    /// Path to a PEM file of trusted root certificates, required when either
    /// DSN requests TLS.
    #[arg(long)]
    pub trusted_root_certs: Option<String>,

    /// Render the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Resolves the effective configuration from flags, falling back to the
/// `configuration/` directory plus `APP_*` overrides when no connection
/// strings are given. Explicit flags win over file values either way.
pub fn resolve_config(args: &Args) -> anyhow::Result<AuditorConfig> {
    let mut config = match (&args.primary, &args.replica) {
        (Some(primary), Some(replica)) => {
            let table = args
                .table
                .clone()
                .context("--table is required when connection strings are given")?;

            AuditorConfig {
                primary: connection_config_from_dsn(primary)
                    .context("failed to parse --primary")?,
                replica: connection_config_from_dsn(replica)
                    .context("failed to parse --replica")?,
                table,
                schema: "public".to_string(),
                audit: AuditConfig::default(),
            }
        }
        (None, None) => load_config::<AuditorConfig>()
            .context("no connection strings given and loading the configuration directory failed")?,
        _ => bail!("--primary and --replica must be provided together"),
    };

    if let Some(table) = &args.table {
        config.table = table.clone();
    }
    if let Some(schema) = &args.schema {
        config.schema = schema.clone();
    }
    if let Some(key_column) = &args.key_column {
        config.audit.key_column = key_column.clone();
    }
    if let Some(range_size) = args.range_size {
        config.audit.range_size = range_size;
    }
    if let Some(fanout) = args.fanout {
        config.audit.drill_down_fanout = fanout;
    }
    if let Some(delay) = args.recheck_delay_ms {
        config.audit.mismatch_recheck_delay_ms = delay;
    }
    if let Some(timeout) = args.query_timeout_ms {
        config.audit.query_timeout_ms = timeout;
    }
    if let Some(concurrency) = args.concurrency {
        config.audit.max_concurrency = concurrency;
    }
    if let Some(path) = &args.trusted_root_certs {
        let certs = fs::read_to_string(path)
            .with_context(|| format!("failed to read trusted root certificates from {path}"))?;
        config.primary.tls.trusted_root_certs = certs.clone();
        config.replica.tls.trusted_root_certs = certs;
    }

    config.validate().context("invalid configuration")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("pg-replica-auditor").chain(args.iter().copied()))
    }

    #[test]
    fn dsn_flags_build_a_full_config() {
        let args = parse(&[
            "--primary",
            "postgres://u@primary:5432/app",
            "--replica",
            "postgres://u@replica:5432/app",
            "--table",
            "users",
            "--range-size",
            "1000",
        ]);

        let config = resolve_config(&args).unwrap();

        assert_eq!(config.primary.host, "primary");
        assert_eq!(config.replica.host, "replica");
        assert_eq!(config.table, "users");
        assert_eq!(config.schema, "public");
        assert_eq!(config.audit.range_size, 1000);
    }

    #[test]
    fn table_is_required_with_dsn_flags() {
        let args = parse(&[
            "--primary",
            "postgres://u@primary:5432/app",
            "--replica",
            "postgres://u@replica:5432/app",
        ]);

        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn one_sided_dsn_is_rejected() {
        let args = parse(&["--primary", "postgres://u@primary:5432/app", "--table", "t"]);

        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn knob_overrides_are_applied() {
        let args = parse(&[
            "--primary",
            "postgres://u@primary:5432/app",
            "--replica",
            "postgres://u@replica:5432/app",
            "--table",
            "users",
            "--schema",
            "audit",
            "--key-column",
            "order_id",
            "--fanout",
            "4",
            "--concurrency",
            "2",
        ]);

        let config = resolve_config(&args).unwrap();

        assert_eq!(config.schema, "audit");
        assert_eq!(config.audit.key_column, "order_id");
        assert_eq!(config.audit.drill_down_fanout, 4);
        assert_eq!(config.audit.max_concurrency, 2);
    }
}
