//! Valuation CLI binary.
//!
//! Analyzes tickers from regulator filings and maintains the report cache.

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "valuation")]
#[command(about = "Filing-driven equity valuation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more tickers and print the reports as JSON
    Analyze(cmd::analyze::AnalyzeArgs),

    /// Maintain a SQLite report cache
    Cache {
        #[command(subcommand)]
        action: cmd::cache::CacheAction,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = init_tracing() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => cmd::analyze::run(args).await,
        Commands::Cache { action } => {
            cmd::cache::run(action).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr; stdout carries only JSON.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
