//! Wires configuration into a running table check.

use auditor::checker::TableChecker;
use auditor::report::Report;
use auditor::source::{PgAuditSource, SourceSide};
use config::shared::AuditorConfig;
use postgres::types::TableName;
use tracing::info;

/// Connects to both sides and runs the check to completion.
///
/// A Ctrl-C received while the check runs stops it at the next safe point;
/// the partial report comes back marked as interrupted.
pub async fn run_audit(config: AuditorConfig) -> anyhow::Result<Report> {
    let table = TableName::new(config.schema.clone(), config.table.clone());

    info!(%table, primary = %config.primary.host, replica = %config.replica.host, "starting audit");

    let (primary, replica) = tokio::try_join!(
        PgAuditSource::connect(config.primary.clone(), SourceSide::Primary),
        PgAuditSource::connect(config.replica.clone(), SourceSide::Replica),
    )?;

    let checker = TableChecker::new(primary, replica, table, config.audit);

    let shutdown_tx = checker.shutdown_tx();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, stopping at the next safe point");
            shutdown_tx.shutdown();
        }
    });

    let report = checker.run().await?;

    Ok(report)
}
