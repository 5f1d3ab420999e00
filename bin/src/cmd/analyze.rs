//! Analyze command implementation.

use anyhow::{Context, Result, bail};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use valuation::{
    Analysis, AnalysisError, Analyzer, DEFAULT_CONCURRENCY, DcfAssumptions, EdgarConfig,
    EdgarOrchestrator, FetchOrchestrator, NetDebtPolicy, ReportCache, SqliteReportStore,
    SubprocessOrchestrator, Symbol, YahooProvider,
};

/// Exit code when at least one ticker could not be analyzed.
const EXIT_PARTIAL: u8 = 2;

#[derive(Args, Debug)]
pub(crate) struct AnalyzeArgs {
    /// Ticker symbols
    #[arg(required = true, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Explicitly projected years
    #[arg(long, default_value_t = 5)]
    horizon: u32,

    /// Free-cash-flow growth over the horizon (0.05 = 5%)
    #[arg(long, default_value = "0.05")]
    growth: Decimal,

    /// Required return
    #[arg(long, default_value = "0.09")]
    discount: Decimal,

    /// Perpetual growth after the horizon, below the required return
    #[arg(long, default_value = "0.02")]
    terminal_growth: Decimal,

    /// Subtract net debt from enterprise value
    #[arg(long)]
    subtract_net_debt: bool,

    /// Market price to compute ratios at (single ticker, bypasses the cache)
    #[arg(long)]
    price: Option<Decimal>,

    /// Run this fetcher executable instead of fetching in-process
    #[arg(long)]
    fetcher: Option<PathBuf>,

    /// SQLite report cache file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Lifetime of cached reports
    #[arg(long, default_value_t = 24)]
    cache_ttl_hours: u64,

    /// Do not query the secondary market-data provider
    #[arg(long)]
    no_secondary: bool,

    /// Tickers analyzed at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

impl AnalyzeArgs {
    fn assumptions(&self) -> DcfAssumptions {
        let policy = if self.subtract_net_debt {
            NetDebtPolicy::Subtract
        } else {
            NetDebtPolicy::Ignore
        };
        DcfAssumptions::new(
            self.horizon,
            self.growth,
            self.discount,
            self.terminal_growth,
        )
        .with_net_debt(policy)
    }

    fn analyzer(&self) -> Result<Analyzer> {
        let orchestrator: Arc<dyn FetchOrchestrator> = match &self.fetcher {
            Some(program) => Arc::new(SubprocessOrchestrator::new(program)),
            None => {
                let config = EdgarConfig::from_env().context("loading EDGAR configuration")?;
                Arc::new(EdgarOrchestrator::new(config)?)
            }
        };

        let mut analyzer = Analyzer::new(orchestrator)
            .with_ttl(Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600)))
            .with_concurrency(self.concurrency);
        if !self.no_secondary {
            analyzer = analyzer.with_market_data(Arc::new(YahooProvider::new()?));
        }
        if let Some(path) = &self.cache {
            let store = SqliteReportStore::open(path)
                .with_context(|| format!("opening report cache {}", path.display()))?;
            analyzer = analyzer.with_cache(ReportCache::new(Arc::new(store)));
        }
        Ok(analyzer)
    }
}

/// One line of the command's output.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outcome {
    Analyzed(Box<Analysis>),
    Failed {
        ticker: String,
        error: &'static str,
        message: String,
    },
}

impl Outcome {
    fn new(ticker: &Symbol, result: Result<Analysis, AnalysisError>) -> Self {
        match result {
            Ok(analysis) => Self::Analyzed(Box::new(analysis)),
            Err(e) => Self::Failed {
                ticker: ticker.to_string(),
                error: match &e {
                    AnalysisError::Valuation(_) => "invalid_assumptions",
                    AnalysisError::Fetch(failure) => failure.reason(),
                },
                message: e.to_string(),
            },
        }
    }
}

/// Analyze the given tickers and print one JSON array of outcomes.
pub(crate) async fn run(args: AnalyzeArgs) -> Result<ExitCode> {
    let assumptions = args.assumptions();
    assumptions.validate()?;

    let analyzer = args.analyzer()?;
    let tickers: Vec<Symbol> = args.tickers.iter().map(Symbol::new).collect();

    let results = match (args.price, tickers.as_slice()) {
        (None, _) => analyzer.analyze_many(&tickers, &assumptions).await,
        (Some(price), [ticker]) => vec![(
            ticker.clone(),
            analyzer.analyze_at_price(ticker, &assumptions, price).await,
        )],
        (Some(_), _) => bail!("--price applies to exactly one ticker"),
    };

    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    let outcomes: Vec<Outcome> = results
        .into_iter()
        .map(|(ticker, result)| Outcome::new(&ticker, result))
        .collect();

    let json = if args.pretty {
        serde_json::to_string_pretty(&outcomes)?
    } else {
        serde_json::to_string(&outcomes)?
    };
    println!("{json}");

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}
