//! EDGAR fetcher binary.
//!
//! Fetches one ticker's company facts and prints the parsed filings as JSON
//! on stdout. On failure it prints a single JSON failure line on stderr and
//! exits with a reason-specific code:
//!
//! | code | reason              |
//! |------|---------------------|
//! | 10   | `resolution_failed` |
//! | 11   | `fetch_failed`      |
//! | 12   | `parse_failed`      |
//! | 13   | `configuration`     |
//! | 14   | `cancelled`         |

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use valuation::{
    EdgarConfig, EdgarOrchestrator, FailureReport, FetchFailure, FetchOrchestrator, Symbol,
};

#[derive(Parser)]
#[command(name = "edgar-fetcher")]
#[command(about = "Fetch and parse SEC company facts for one ticker", long_about = None)]
#[command(version)]
struct Args {
    /// Ticker symbol
    ticker: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let ticker = Symbol::new(&args.ticker);

    let orchestrator = match EdgarConfig::from_env().and_then(EdgarOrchestrator::new) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return fail(
                &FailureReport::configuration(ticker.as_str(), e.to_string()),
                FetchFailure::EXIT_CONFIG,
            );
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    match orchestrator.fetch_with_cancel(&ticker, &cancel).await {
        Ok(filings) => {
            info!(entity = %filings.entity, values = filings.series.len(), "fetched");
            let mut stdout = std::io::stdout().lock();
            let written = serde_json::to_writer(&mut stdout, &filings)
                .map_err(std::io::Error::from)
                .and_then(|()| stdout.flush());
            match written {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    let failure = FetchFailure::FetchFailed {
                        ticker: ticker.to_string(),
                        message: format!("writing output: {e}"),
                    };
                    fail(&FailureReport::from(&failure), failure.exit_code())
                }
            }
        }
        Err(failure) => fail(&FailureReport::from(&failure), failure.exit_code()),
    }
}

fn fail(report: &FailureReport, code: i32) -> ExitCode {
    match serde_json::to_string(report) {
        Ok(line) => eprintln!("{line}"),
        Err(_) => eprintln!("{}: {}", report.error, report.message),
    }
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: logging already initialized");
    }
}
