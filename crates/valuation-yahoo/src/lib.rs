#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/valuation/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance market-data provider.
//!
//! This crate provides a [`YahooProvider`] implementing the
//! [`MarketDataProvider`] trait from `valuation-core`.
//!
//! # Example
//!
//! ```no_run
//! use valuation_core::{MarketDataProvider, Symbol};
//! use valuation_yahoo::YahooProvider;
//!
//! # async fn example() -> Result<(), valuation_core::MarketDataError> {
//! let provider = YahooProvider::new()?;
//! let snapshot = provider.snapshot(&Symbol::new("MC.PA")).await?;
//! println!("price {:?}, {} values", snapshot.price, snapshot.series.len());
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, instrument};
use valuation_core::{
    ConceptKey, DatedValue, FilingType, FinancialSeries, MarketDataError, MarketDataProvider,
    MarketSnapshot, Source, Symbol, Unit,
};

/// Yahoo Finance quote summary API base URL.
pub const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Modules requested from the quote summary endpoint.
const MODULES: &str = "financialData,defaultKeyStatistics,price,\
incomeStatementHistory,cashflowStatementHistory,balanceSheetHistory";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const PROVIDER_NAME: &str = "Yahoo Finance";

/// Yahoo Finance market-data provider.
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Create a new provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    ///
    /// # Errors
    /// Returns [`MarketDataError::Network`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, MarketDataError> {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new provider with a custom HTTP client.
    ///
    /// Uses the provided client for all HTTP requests. Rate limiting
    /// is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: QUOTE_SUMMARY_URL.to_string(),
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new provider with custom rate limiting.
    ///
    /// # Errors
    /// Returns [`MarketDataError::Network`] if the HTTP client cannot be built.
    pub fn with_rate_limit(rate_limit: Duration) -> Result<Self, MarketDataError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MarketDataError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: QUOTE_SUMMARY_URL.to_string(),
            rate_limit_ms: u64::try_from(rate_limit.as_millis()).unwrap_or(u64::MAX),
            last_request_time: AtomicU64::new(0),
        })
    }

    /// Points the provider at another quote summary endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now_ms().saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(now_ms(), Ordering::Relaxed);
    }

    fn quote_summary_url(&self, symbol: &Symbol) -> String {
        format!("{}/{}?modules={}", self.base_url, symbol.as_str(), MODULES)
    }

    /// Fetch quote summary data for a symbol.
    async fn fetch_quote_summary(&self, symbol: &Symbol) -> Result<QuoteSummaryData, MarketDataError> {
        self.apply_rate_limit().await;

        let url = self.quote_summary_url(symbol);
        debug!("Fetching quote summary: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketDataError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
            });
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
        }

        if !response.status().is_success() {
            return Err(MarketDataError::Network(format!(
                "HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let summary = response
            .json::<QuoteSummaryResponse>()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;

        summary
            .quote_summary
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| MarketDataError::SymbolNotFound(symbol.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[instrument(skip(self, symbol), fields(symbol = %symbol))]
    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot, MarketDataError> {
        let data = self.fetch_quote_summary(symbol).await?;
        let snapshot = build_snapshot(symbol, data);
        debug!(
            price = ?snapshot.price,
            values = snapshot.series.len(),
            "quote summary snapshot"
        );
        Ok(snapshot)
    }
}

fn now_ms() -> u64 {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Turns the quote summary modules into a snapshot.
///
/// Fundamentals come from the annual statement histories, each row dated at
/// its own `endDate`. The trailing-twelve-month figures in `financialData`
/// are not fiscal-year values and are not imported. The share count is a
/// current figure and is dated at `lastFiscalYearEnd`, or at the latest
/// statement when that is missing.
fn build_snapshot(symbol: &Symbol, data: QuoteSummaryData) -> MarketSnapshot {
    let financial = data.financial_data.unwrap_or_default();
    let stats = data.default_key_statistics.unwrap_or_default();
    let price = data.price.unwrap_or_default();

    let currency = financial
        .financial_currency
        .clone()
        .or_else(|| price.currency.clone());
    let market_price = price
        .regular_market_price
        .decimal()
        .or_else(|| financial.current_price.decimal());

    let money = Unit::Currency(currency.clone().unwrap_or_else(|| "USD".to_string()));
    let mut series = FinancialSeries::new();
    let income = data.income_statement_history.unwrap_or_default();
    for row in &income.income_statement_history {
        insert_row(&mut series, &row.end_date, &row.entries(), &money);
    }
    let cashflow = data.cashflow_statement_history.unwrap_or_default();
    for row in &cashflow.cashflow_statements {
        insert_row(&mut series, &row.end_date, &row.entries(), &money);
    }
    let balance = data.balance_sheet_history.unwrap_or_default();
    for row in &balance.balance_sheet_statements {
        insert_row(&mut series, &row.end_date, &row.entries(), &money);
    }

    let shares_date = stats
        .last_fiscal_year_end
        .date()
        .or_else(|| series.latest_period_end());
    if let (Some(period_end), Some(shares)) = (shares_date, stats.shares_outstanding.decimal()) {
        series.insert(
            ConceptKey::SharesOutstanding,
            DatedValue::new(period_end, shares, Unit::Shares, FilingType::Annual)
                .with_source(Source::Secondary),
        );
    }

    MarketSnapshot {
        symbol: symbol.clone(),
        price: market_price,
        currency,
        series,
    }
}

/// Inserts one annual statement row; rows without an end date are skipped.
fn insert_row(
    series: &mut FinancialSeries,
    end_date: &RawValue,
    entries: &[(ConceptKey, &RawValue)],
    unit: &Unit,
) {
    let Some(period_end) = end_date.date() else {
        debug!("statement row without end date");
        return;
    };
    for (concept, raw) in entries {
        if let Some(value) = raw.decimal() {
            series.insert(
                *concept,
                DatedValue::new(period_end, value, unit.clone(), FilingType::Annual)
                    .with_source(Source::Secondary),
            );
        }
    }
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Quote Summary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<QuoteSummaryData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryData {
    financial_data: Option<FinancialData>,
    default_key_statistics: Option<KeyStatistics>,
    price: Option<PriceModule>,
    income_statement_history: Option<IncomeStatementHistory>,
    cashflow_statement_history: Option<CashflowStatementHistory>,
    balance_sheet_history: Option<BalanceSheetHistory>,
}

/// A `{"raw": .., "fmt": ..}` field; Yahoo sends `{}` when it has no value.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    raw: Option<serde_json::Number>,
}

impl RawValue {
    fn decimal(&self) -> Option<Decimal> {
        let text = self.raw.as_ref()?.to_string();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
    }

    fn date(&self) -> Option<NaiveDate> {
        let secs = self.raw.as_ref()?.as_i64()?;
        DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FinancialData {
    current_price: RawValue,
    financial_currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct KeyStatistics {
    shares_outstanding: RawValue,
    last_fiscal_year_end: RawValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PriceModule {
    regular_market_price: RawValue,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IncomeStatementHistory {
    income_statement_history: Vec<IncomeStatement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IncomeStatement {
    end_date: RawValue,
    total_revenue: RawValue,
    cost_of_revenue: RawValue,
    gross_profit: RawValue,
    operating_income: RawValue,
    net_income: RawValue,
}

impl IncomeStatement {
    fn entries(&self) -> [(ConceptKey, &RawValue); 5] {
        [
            (ConceptKey::Revenue, &self.total_revenue),
            (ConceptKey::CostOfRevenue, &self.cost_of_revenue),
            (ConceptKey::GrossProfit, &self.gross_profit),
            (ConceptKey::OperatingIncome, &self.operating_income),
            (ConceptKey::NetIncome, &self.net_income),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CashflowStatementHistory {
    cashflow_statements: Vec<CashflowStatement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CashflowStatement {
    end_date: RawValue,
    total_cash_from_operating_activities: RawValue,
    capital_expenditures: RawValue,
}

impl CashflowStatement {
    fn entries(&self) -> [(ConceptKey, &RawValue); 2] {
        [
            (
                ConceptKey::OperatingCashFlow,
                &self.total_cash_from_operating_activities,
            ),
            (ConceptKey::CapitalExpenditures, &self.capital_expenditures),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BalanceSheetHistory {
    balance_sheet_statements: Vec<BalanceSheet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BalanceSheet {
    end_date: RawValue,
    cash: RawValue,
    total_assets: RawValue,
    total_current_assets: RawValue,
    total_liab: RawValue,
    total_current_liabilities: RawValue,
    long_term_debt: RawValue,
    short_long_term_debt: RawValue,
    total_stockholder_equity: RawValue,
}

impl BalanceSheet {
    fn entries(&self) -> [(ConceptKey, &RawValue); 8] {
        [
            (ConceptKey::CashAndEquivalents, &self.cash),
            (ConceptKey::TotalAssets, &self.total_assets),
            (ConceptKey::CurrentAssets, &self.total_current_assets),
            (ConceptKey::TotalLiabilities, &self.total_liab),
            (ConceptKey::CurrentLiabilities, &self.total_current_liabilities),
            (ConceptKey::LongTermDebt, &self.long_term_debt),
            (ConceptKey::ShortTermDebt, &self.short_long_term_debt),
            (ConceptKey::StockholdersEquity, &self.total_stockholder_equity),
        ]
    }
}
