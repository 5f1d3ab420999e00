//! Out-of-process fetch orchestration.
//!
//! [`SubprocessOrchestrator`] runs a fetcher executable once per ticker. The
//! executable receives the ticker as its last argument and must either
//!
//! - exit 0 with the [`CompanyFilings`] JSON on stdout, or
//! - exit with [`FetchFailure::exit_code`] and write a [`FailureReport`] JSON
//!   line to stderr.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use valuation_core::{CompanyFilings, FetchFailure, FetchOrchestrator, Symbol};

/// Machine-readable failure line written by a fetcher to stderr.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Failure reason, e.g. `resolution_failed`.
    pub error: String,
    /// Requested ticker.
    pub ticker: String,
    /// Human-readable detail.
    pub message: String,
}

impl FailureReport {
    /// Reason reported for configuration errors.
    pub const CONFIGURATION: &'static str = "configuration";

    /// A configuration failure for `ticker`.
    #[must_use]
    pub fn configuration(ticker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Self::CONFIGURATION.to_string(),
            ticker: ticker.into(),
            message: message.into(),
        }
    }
}

impl From<&FetchFailure> for FailureReport {
    fn from(failure: &FetchFailure) -> Self {
        let message = match failure {
            FetchFailure::ResolutionFailed { message, .. }
            | FetchFailure::FetchFailed { message, .. }
            | FetchFailure::ParseFailed { message, .. } => message.clone(),
            FetchFailure::Cancelled { .. } => failure.to_string(),
        };
        Self {
            error: failure.reason().to_string(),
            ticker: failure.ticker().to_string(),
            message,
        }
    }
}

/// A [`FetchOrchestrator`] that runs a separate fetcher executable.
///
/// The child is killed if the fetch is cancelled or the future dropped.
#[derive(Clone, Debug)]
pub struct SubprocessOrchestrator {
    program: PathBuf,
    args: Vec<OsString>,
}

impl SubprocessOrchestrator {
    /// Creates an orchestrator for the given fetcher executable.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds an argument passed before the ticker.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self, ticker: &Symbol) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(ticker.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl FetchOrchestrator for SubprocessOrchestrator {
    fn name(&self) -> &str {
        "subprocess"
    }

    #[instrument(skip(self, ticker, cancel), fields(ticker = %ticker, program = %self.program.display()))]
    async fn fetch_with_cancel(
        &self,
        ticker: &Symbol,
        cancel: &CancellationToken,
    ) -> Result<CompanyFilings, FetchFailure> {
        let cancelled = || FetchFailure::Cancelled {
            ticker: ticker.to_string(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let child = self
            .command(ticker)
            .spawn()
            .map_err(|e| FetchFailure::FetchFailed {
                ticker: ticker.to_string(),
                message: format!("failed to start fetcher: {e}"),
            })?;

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("fetch cancelled, killing fetcher");
                return Err(cancelled());
            }
            output = child.wait_with_output() => output.map_err(|e| FetchFailure::FetchFailed {
                ticker: ticker.to_string(),
                message: format!("fetcher I/O error: {e}"),
            })?,
        };

        decode(ticker, &output)
    }
}

fn decode(ticker: &Symbol, output: &Output) -> Result<CompanyFilings, FetchFailure> {
    if output.status.success() {
        let filings: CompanyFilings =
            serde_json::from_slice(&output.stdout).map_err(|e| FetchFailure::ParseFailed {
                ticker: ticker.to_string(),
                message: format!("unreadable fetcher output: {e}"),
            })?;
        debug!(values = filings.series.len(), "fetcher succeeded");
        return Ok(filings);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let report = stderr
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<FailureReport>(line.trim()).ok());
    let message = match report {
        Some(report) => report.message,
        None => stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map_or_else(|| format!("fetcher exited with {}", output.status), str::to_string),
    };

    let failure = match output.status.code() {
        Some(code) => FetchFailure::from_exit(code, ticker.as_str(), message),
        None => FetchFailure::FetchFailed {
            ticker: ticker.to_string(),
            message: format!("fetcher terminated by signal: {message}"),
        },
    };
    warn!(reason = failure.reason(), status = %output.status, "fetcher failed");
    Err(failure)
}
