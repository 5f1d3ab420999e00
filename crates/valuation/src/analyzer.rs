//! The analysis pipeline.
//!
//! [`Analyzer`] drives one ticker through fetch, reconciliation, the metrics
//! engine and the report cache:
//!
//! 1. validate the DCF assumptions (nothing is fetched for invalid input)
//! 2. fetch the primary series through the [`FetchOrchestrator`]
//! 3. take a snapshot from the optional [`MarketDataProvider`]
//! 4. [`reconcile`] the two series
//! 5. return a cached report for the derived [`CacheKey`], or compute and
//!    cache a new one

use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use valuation_cache::ReportCache;
use valuation_core::{
    AnalysisError, CacheKey, CompanyFilings, DcfAssumptions, EntityIdentifier, FetchFailure,
    FetchOrchestrator, FinancialSeries, MarketDataProvider, MarketSnapshot, MetricsReport, Source,
    Symbol, reconcile,
};
use valuation_metrics::MetricsEngine;

/// Default lifetime of a cached report.
pub const DEFAULT_REPORT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default number of tickers analyzed at once by [`Analyzer::analyze_many`].
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of analyzing one ticker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// The computed (or cached) report.
    pub report: MetricsReport,
    /// Resolved regulator entity, absent when only secondary data was used.
    pub entity: Option<EntityIdentifier>,
    /// Registered entity name, when known.
    pub entity_name: Option<String>,
    /// Market price the report's ratios were computed at; for a cached
    /// report, the price at the time it was computed.
    pub price: Option<Decimal>,
    /// Number of values imported from the secondary provider.
    pub secondary_values: usize,
    /// Whether the report came from the cache.
    pub from_cache: bool,
}

/// Fetch, reconcile, compute and cache.
///
/// Cloning is cheap; every collaborator is shared.
#[derive(Clone)]
pub struct Analyzer {
    orchestrator: Arc<dyn FetchOrchestrator>,
    market_data: Option<Arc<dyn MarketDataProvider>>,
    cache: Option<ReportCache>,
    engine: MetricsEngine,
    ttl: Duration,
    secondary_fallback: bool,
    concurrency: usize,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("orchestrator", &self.orchestrator.name())
            .field("market_data", &self.market_data.as_ref().map(|p| p.name()))
            .field("cache", &self.cache.is_some())
            .field("ttl", &self.ttl)
            .field("secondary_fallback", &self.secondary_fallback)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Analyzer {
    /// Creates an analyzer over a fetch orchestrator, with no secondary
    /// provider and no cache.
    #[must_use]
    pub fn new(orchestrator: Arc<dyn FetchOrchestrator>) -> Self {
        Self {
            orchestrator,
            market_data: None,
            cache: None,
            engine: MetricsEngine::new(),
            ttl: DEFAULT_REPORT_TTL,
            secondary_fallback: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Adds a secondary market-data provider for prices and gap filling.
    #[must_use]
    pub fn with_market_data(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.market_data = Some(provider);
        self
    }

    /// Caches computed reports.
    #[must_use]
    pub fn with_cache(mut self, cache: ReportCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the lifetime of cached reports.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Fails instead of falling back to secondary data when the ticker is
    /// unknown to the regulator.
    #[must_use]
    pub const fn without_secondary_fallback(mut self) -> Self {
        self.secondary_fallback = false;
        self
    }

    /// Sets how many tickers [`analyze_many`](Self::analyze_many) runs at
    /// once (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Analyzes one ticker at the provider's market price.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Valuation`] for invalid assumptions and
    /// [`AnalysisError::Fetch`] when the primary fetch fails without a usable
    /// fallback.
    pub async fn analyze(
        &self,
        ticker: &Symbol,
        assumptions: &DcfAssumptions,
    ) -> Result<Analysis, AnalysisError> {
        self.analyze_with_cancel(ticker, assumptions, None, &CancellationToken::new())
            .await
    }

    /// Analyzes one ticker at an explicit market price.
    ///
    /// Reports computed at an explicit price bypass the cache.
    ///
    /// # Errors
    /// See [`analyze`](Self::analyze).
    pub async fn analyze_at_price(
        &self,
        ticker: &Symbol,
        assumptions: &DcfAssumptions,
        price: Decimal,
    ) -> Result<Analysis, AnalysisError> {
        self.analyze_with_cancel(ticker, assumptions, Some(price), &CancellationToken::new())
            .await
    }

    /// Analyzes one ticker, aborting the fetch once `cancel` fires.
    ///
    /// # Errors
    /// See [`analyze`](Self::analyze); a cancelled fetch surfaces as
    /// [`FetchFailure::Cancelled`].
    #[instrument(skip(self, ticker, assumptions, price, cancel), fields(ticker = %ticker))]
    pub async fn analyze_with_cancel(
        &self,
        ticker: &Symbol,
        assumptions: &DcfAssumptions,
        price: Option<Decimal>,
        cancel: &CancellationToken,
    ) -> Result<Analysis, AnalysisError> {
        assumptions.validate()?;

        let (filings, primary_failure) =
            match self.orchestrator.fetch_with_cancel(ticker, cancel).await {
                Ok(filings) => (Some(filings), None),
                Err(failure) if self.can_fall_back(&failure) => {
                    info!(reason = failure.reason(), "primary fetch failed, trying secondary data");
                    (None, Some(failure))
                }
                Err(failure) => return Err(failure.into()),
            };

        let snapshot = self.snapshot(ticker).await;
        if let Some(failure) = primary_failure
            && snapshot.as_ref().is_none_or(|s| s.series.is_empty())
        {
            return Err(failure.into());
        }

        let (entity, entity_name, primary) = match filings {
            Some(CompanyFilings {
                entity,
                entity_name,
                series,
            }) => (Some(entity), entity_name, series),
            None => (None, None, FinancialSeries::new()),
        };
        let (market_price, secondary) = snapshot
            .map(|s| (s.price, s.series))
            .unwrap_or_default();

        let merged = reconcile(primary, secondary);
        let secondary_values = merged
            .iter()
            .filter(|(_, value)| value.source == Source::Secondary)
            .count();

        let key = CacheKey::derive(ticker, merged.latest_period_end(), assumptions);
        let cache = self.cache.as_ref().filter(|_| price.is_none());
        let price = price.or(market_price);

        if let Some(cache) = cache
            && let Some(report) = cache.get(&key).await
        {
            if price.is_some() && report.price != price {
                debug!(cached = ?report.price, current = ?price, "cached report priced differently");
            }
            return Ok(Analysis {
                price: report.price,
                report,
                entity,
                entity_name,
                secondary_values,
                from_cache: true,
            });
        }

        let report = self
            .engine
            .compute_at_price(ticker, &merged, assumptions, price)?;
        info!(
            dcf_fair_value = ?report.dcf_fair_value,
            piotroski_score = ?report.piotroski_score,
            secondary_values,
            "computed report"
        );

        if let Some(cache) = cache {
            cache.put(&key, report.clone(), self.ttl).await;
        }

        Ok(Analysis {
            price: report.price,
            report,
            entity,
            entity_name,
            secondary_values,
            from_cache: false,
        })
    }

    /// Analyzes several tickers concurrently, in input order.
    ///
    /// Duplicate tickers are analyzed once. Every fetch draws from the same
    /// orchestrator and therefore the same rate limiter.
    pub async fn analyze_many(
        &self,
        tickers: &[Symbol],
        assumptions: &DcfAssumptions,
    ) -> Vec<(Symbol, Result<Analysis, AnalysisError>)> {
        let mut seen = HashSet::new();
        let distinct: Vec<Symbol> = tickers
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();
        debug!(tickers = distinct.len(), concurrency = self.concurrency, "analyzing batch");

        stream::iter(distinct)
            .map(|ticker| async move {
                let result = self.analyze(&ticker, assumptions).await;
                (ticker, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    fn can_fall_back(&self, failure: &FetchFailure) -> bool {
        self.secondary_fallback
            && self.market_data.is_some()
            && matches!(failure, FetchFailure::ResolutionFailed { .. })
    }

    async fn snapshot(&self, ticker: &Symbol) -> Option<MarketSnapshot> {
        let provider = self.market_data.as_ref()?;
        match provider.snapshot(ticker).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "market data unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valuation_core::{
        ConceptKey, DatedValue, FilingType, MarketDataError, RatioName, Unit, ValuationError,
    };

    fn value(year: i32, amount: Decimal, unit: Unit) -> DatedValue {
        DatedValue::new(
            NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            amount,
            unit,
            FilingType::Annual,
        )
    }

    fn scenario() -> FinancialSeries {
        let mut s = FinancialSeries::new();
        for (concept, year, amount) in [
            (ConceptKey::Revenue, 2022, dec!(100)),
            (ConceptKey::Revenue, 2023, dec!(120)),
            (ConceptKey::NetIncome, 2022, dec!(10)),
            (ConceptKey::NetIncome, 2023, dec!(15)),
            (ConceptKey::OperatingCashFlow, 2023, dec!(18)),
            (ConceptKey::CapitalExpenditures, 2023, dec!(3)),
        ] {
            s.insert(concept, value(year, amount, Unit::usd()));
        }
        s.insert(ConceptKey::SharesOutstanding, value(2023, dec!(50), Unit::Shares));
        s
    }

    fn assumptions() -> DcfAssumptions {
        DcfAssumptions::new(5, dec!(0.05), dec!(0.09), dec!(0.02))
    }

    #[derive(Debug, Default)]
    struct FakeOrchestrator {
        outcomes: HashMap<String, Result<CompanyFilings, FetchFailure>>,
        calls: AtomicUsize,
    }

    impl FakeOrchestrator {
        fn with(mut self, ticker: &str, outcome: Result<CompanyFilings, FetchFailure>) -> Self {
            self.outcomes.insert(ticker.to_string(), outcome);
            self
        }

        fn filings(ticker: &str) -> CompanyFilings {
            CompanyFilings::new(EntityIdentifier::new(Symbol::new(ticker), 42), scenario())
                .with_entity_name("Acme Corp")
        }

        fn unknown(ticker: &str) -> Result<CompanyFilings, FetchFailure> {
            Err(FetchFailure::ResolutionFailed {
                ticker: ticker.to_string(),
                message: "not in directory".into(),
            })
        }
    }

    #[async_trait]
    impl FetchOrchestrator for FakeOrchestrator {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_with_cancel(
            &self,
            ticker: &Symbol,
            _cancel: &CancellationToken,
        ) -> Result<CompanyFilings, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .get(ticker.as_str())
                .cloned()
                .unwrap_or_else(|| Self::unknown(ticker.as_str()))
        }
    }

    #[derive(Debug)]
    struct FakeMarket {
        snapshot: Result<MarketSnapshot, MarketDataError>,
    }

    impl FakeMarket {
        fn priced(price: Decimal) -> Self {
            let mut series = FinancialSeries::new();
            series.insert(
                ConceptKey::Revenue,
                value(2024, dec!(150), Unit::usd()).with_source(Source::Secondary),
            );
            series.insert(
                ConceptKey::Revenue,
                value(2023, dec!(999), Unit::usd()).with_source(Source::Secondary),
            );
            Self {
                snapshot: Ok(MarketSnapshot {
                    symbol: Symbol::new("ACME"),
                    price: Some(price),
                    currency: Some("USD".into()),
                    series,
                }),
            }
        }

        fn down() -> Self {
            Self {
                snapshot: Err(MarketDataError::Network("connection refused".into())),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for FakeMarket {
        fn name(&self) -> &str {
            "fake-market"
        }

        async fn snapshot(&self, _symbol: &Symbol) -> Result<MarketSnapshot, MarketDataError> {
            self.snapshot.clone()
        }
    }

    #[tokio::test]
    async fn test_primary_only() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let analyzer = Analyzer::new(Arc::new(orchestrator));

        let analysis = analyzer
            .analyze(&Symbol::new("ACME"), &assumptions())
            .await
            .unwrap();

        assert!(analysis.report.dcf_fair_value.is_some());
        assert_eq!(analysis.report.piotroski_score, Some(1));
        assert_eq!(analysis.entity.as_ref().map(|e| e.cik()), Some("0000000042"));
        assert_eq!(analysis.entity_name.as_deref(), Some("Acme Corp"));
        assert_eq!(analysis.price, None);
        assert_eq!(analysis.secondary_values, 0);
        assert!(!analysis.from_cache);
    }

    #[tokio::test]
    async fn test_invalid_assumptions_skip_fetch() {
        let orchestrator = Arc::new(FakeOrchestrator::default());
        let analyzer = Analyzer::new(orchestrator.clone());
        let bad = DcfAssumptions::new(5, dec!(0.05), dec!(0.09), dec!(0.09));

        let err = analyzer.analyze(&Symbol::new("ACME"), &bad).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Valuation(ValuationError::InvalidAssumptions(_))
        ));
        assert_eq!(orchestrator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_secondary_fills_gaps_and_prices() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let analyzer = Analyzer::new(Arc::new(orchestrator))
            .with_market_data(Arc::new(FakeMarket::priced(dec!(6))));

        let analysis = analyzer
            .analyze(&Symbol::new("ACME"), &assumptions())
            .await
            .unwrap();

        // only the 2024 revenue is new
        assert_eq!(analysis.secondary_values, 1);
        assert_eq!(analysis.price, Some(dec!(6)));
        assert_eq!(
            analysis.report.fiscal_period_end,
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
    }

    #[tokio::test]
    async fn test_market_outage_is_not_fatal() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let analyzer =
            Analyzer::new(Arc::new(orchestrator)).with_market_data(Arc::new(FakeMarket::down()));

        let analysis = analyzer
            .analyze(&Symbol::new("ACME"), &assumptions())
            .await
            .unwrap();
        assert_eq!(analysis.price, None);
        assert!(analysis.report.dcf_fair_value.is_some());
    }

    #[tokio::test]
    async fn test_unknown_ticker_falls_back_to_secondary() {
        let analyzer = Analyzer::new(Arc::new(FakeOrchestrator::default()))
            .with_market_data(Arc::new(FakeMarket::priced(dec!(6))));

        let analysis = analyzer
            .analyze(&Symbol::new("AIR.PA"), &assumptions())
            .await
            .unwrap();
        assert!(analysis.entity.is_none());
        assert_eq!(analysis.secondary_values, 2);
        assert_eq!(analysis.report.ticker, Symbol::new("AIR.PA"));
    }

    #[tokio::test]
    async fn test_fallback_disabled() {
        let analyzer = Analyzer::new(Arc::new(FakeOrchestrator::default()))
            .with_market_data(Arc::new(FakeMarket::priced(dec!(6))))
            .without_secondary_fallback();

        let err = analyzer
            .analyze(&Symbol::new("AIR.PA"), &assumptions())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Fetch(FetchFailure::ResolutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_fallback_without_secondary_data_keeps_failure() {
        let analyzer = Analyzer::new(Arc::new(FakeOrchestrator::default()))
            .with_market_data(Arc::new(FakeMarket::down()));

        let err = analyzer
            .analyze(&Symbol::new("AIR.PA"), &assumptions())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no data for AIR.PA: not in directory");
    }

    #[tokio::test]
    async fn test_transient_failure_never_falls_back() {
        let failure = FetchFailure::FetchFailed {
            ticker: "ACME".into(),
            message: "HTTP 503".into(),
        };
        let orchestrator = FakeOrchestrator::default().with("ACME", Err(failure.clone()));
        let analyzer = Analyzer::new(Arc::new(orchestrator))
            .with_market_data(Arc::new(FakeMarket::priced(dec!(6))));

        let err = analyzer
            .analyze(&Symbol::new("ACME"), &assumptions())
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::Fetch(failure));
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let analyzer = Analyzer::new(Arc::new(orchestrator)).with_cache(ReportCache::in_memory());
        let ticker = Symbol::new("ACME");

        let first = analyzer.analyze(&ticker, &assumptions()).await.unwrap();
        let second = analyzer.analyze(&ticker, &assumptions()).await.unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.report, second.report);

        let other = DcfAssumptions::new(5, dec!(0.06), dec!(0.09), dec!(0.02));
        let third = analyzer.analyze(&ticker, &other).await.unwrap();
        assert!(!third.from_cache);
    }

    /// Quotes each price in turn, then repeats the last.
    #[derive(Debug)]
    struct MovingMarket {
        prices: Vec<Decimal>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for MovingMarket {
        fn name(&self) -> &str {
            "moving-market"
        }

        async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot, MarketDataError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let price = self.prices[call.min(self.prices.len() - 1)];
            Ok(MarketSnapshot {
                symbol: symbol.clone(),
                price: Some(price),
                currency: Some("USD".into()),
                series: FinancialSeries::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_cache_hit_reports_price_of_cached_ratios() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let market = MovingMarket {
            prices: vec![dec!(6), dec!(12)],
            calls: AtomicUsize::new(0),
        };
        let analyzer = Analyzer::new(Arc::new(orchestrator))
            .with_market_data(Arc::new(market))
            .with_cache(ReportCache::in_memory());
        let ticker = Symbol::new("ACME");

        let first = analyzer.analyze(&ticker, &assumptions()).await.unwrap();
        let second = analyzer.analyze(&ticker, &assumptions()).await.unwrap();

        assert!(second.from_cache);
        assert_eq!(first.price, Some(dec!(6)));
        assert_eq!(second.price, Some(dec!(6)));
        assert_eq!(second.report.price, second.price);
        assert_eq!(second.report.ratio(RatioName::PriceToEarnings), Some(dec!(20)));
    }

    #[tokio::test]
    async fn test_explicit_price_bypasses_cache() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let cache = ReportCache::in_memory();
        let analyzer = Analyzer::new(Arc::new(orchestrator)).with_cache(cache.clone());
        let ticker = Symbol::new("ACME");

        let priced = analyzer
            .analyze_at_price(&ticker, &assumptions(), dec!(6))
            .await
            .unwrap();
        assert_eq!(priced.report.ratio(RatioName::PriceToEarnings), Some(dec!(20)));

        let key = CacheKey::derive(&ticker, NaiveDate::from_ymd_opt(2023, 12, 31), &assumptions());
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_caches() {
        let orchestrator = FakeOrchestrator::default().with("ACME", Ok(FakeOrchestrator::filings("ACME")));
        let analyzer = Analyzer::new(Arc::new(orchestrator))
            .with_cache(ReportCache::in_memory())
            .with_ttl(Duration::ZERO);
        let ticker = Symbol::new("ACME");

        analyzer.analyze(&ticker, &assumptions()).await.unwrap();
        let again = analyzer.analyze(&ticker, &assumptions()).await.unwrap();
        assert!(!again.from_cache);
    }

    #[tokio::test]
    async fn test_cancelled_fetch() {
        let failure = FetchFailure::Cancelled { ticker: "ACME".into() };
        let orchestrator = FakeOrchestrator::default().with("ACME", Err(failure));
        let analyzer = Analyzer::new(Arc::new(orchestrator));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = analyzer
            .analyze_with_cancel(&Symbol::new("ACME"), &assumptions(), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Fetch(FetchFailure::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_analyze_many_dedupes_in_order() {
        let orchestrator = Arc::new(
            FakeOrchestrator::default()
                .with("ACME", Ok(FakeOrchestrator::filings("ACME")))
                .with("WIDG", Ok(FakeOrchestrator::filings("WIDG"))),
        );
        let analyzer = Analyzer::new(orchestrator.clone()).with_concurrency(2);
        let tickers = ["widg", "ACME", "WIDG", "NOPE"].map(Symbol::new);

        let results = analyzer.analyze_many(&tickers, &assumptions()).await;
        let order: Vec<&str> = results.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(order, ["WIDG", "ACME", "NOPE"]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_ok());
        assert!(results[2].1.is_err());
        assert_eq!(orchestrator.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_debug_names_collaborators() {
        let analyzer = Analyzer::new(Arc::new(FakeOrchestrator::default()));
        let debug = format!("{analyzer:?}");
        assert!(debug.contains("fake"));
        assert!(debug.contains("secondary_fallback: true"));
    }
}
