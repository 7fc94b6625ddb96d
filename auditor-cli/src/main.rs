//! Primary/replica table divergence auditor binary.
//!
//! Parses arguments, initializes tracing, starts the async runtime and runs
//! the table check. The exit code encodes the verdict so scripts can branch
//! on it without parsing output.

use std::process::ExitCode;

use auditor::report::{Report, TableStatus};
use clap::Parser;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::cli::{Args, resolve_config};
use crate::core::run_audit;

mod cli;
mod core;

/// Exit code when the table is consistent.
const EXIT_CONSISTENT: u8 = 0;
/// Exit code when at least one divergence was confirmed.
const EXIT_INCONSISTENT: u8 = 1;
/// Exit code when the run finished without a definitive verdict.
const EXIT_INCONCLUSIVE: u8 = 2;
/// Exit code when the run failed before a report existed.
const EXIT_FAILURE: u8 = 3;

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(env!("CARGO_BIN_NAME"));

    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!("audit failed: {err:#}");
            EXIT_FAILURE
        }
    };

    ExitCode::from(code)
}

fn run(args: Args) -> anyhow::Result<u8> {
    let json = args.json;
    let config = resolve_config(&args)?;

    let report = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_audit(config))?;

    render(&report, json)?;

    Ok(match report.status {
        TableStatus::Consistent => EXIT_CONSISTENT,
        TableStatus::Inconsistent => EXIT_INCONSISTENT,
        TableStatus::Inconclusive => EXIT_INCONCLUSIVE,
    })
}

fn render(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(())
}
