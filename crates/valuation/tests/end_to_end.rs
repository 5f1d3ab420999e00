//! End-to-end analysis against a mock regulator server.

#![cfg(feature = "edgar")]

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use valuation::{
    Analyzer, ConceptKey, CriterionOutcome, DatedValue, DcfAssumptions, EdgarConfig,
    EdgarOrchestrator, FetchOrchestrator, FilingType, FinancialSeries, MarketDataError,
    MarketDataProvider, MarketSnapshot, PiotroskiCriterion, RatioName, ReportCache, RetryPolicy,
    Source, StaticDirectory, Symbol, Unit, Unlimited,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FACTS_PATH: &str = "/api/xbrl/companyfacts/CIK0000000042.json";

fn annual(start: &str, end: &str, val: i64) -> Value {
    json!({"start": start, "end": end, "val": val, "form": "10-K", "filed": "2024-02-15"})
}

/// Revenue 100/120, net income 10/15, OCF 18, capex 3, 50 shares.
fn scenario_facts() -> Value {
    json!({
        "cik": 42,
        "entityName": "Acme Corp",
        "facts": {
            "us-gaap": {
                "Revenues": {"units": {"USD": [
                    annual("2022-01-01", "2022-12-31", 100),
                    annual("2023-01-01", "2023-12-31", 120)
                ]}},
                "NetIncomeLoss": {"units": {"USD": [
                    annual("2022-01-01", "2022-12-31", 10),
                    annual("2023-01-01", "2023-12-31", 15)
                ]}},
                "NetCashProvidedByUsedInOperatingActivities": {"units": {"USD": [
                    annual("2023-01-01", "2023-12-31", 18)
                ]}},
                "PaymentsToAcquirePropertyPlantAndEquipment": {"units": {"USD": [
                    annual("2023-01-01", "2023-12-31", 3)
                ]}},
                "CommonStockSharesOutstanding": {"units": {"shares": [
                    {"end": "2023-12-31", "val": 50, "form": "10-K", "filed": "2024-02-15"}
                ]}},
                "SomethingNobodyAskedFor": {"units": {"USD": []}}
            },
            "srt": {}
        },
        "unexpectedTopLevel": true
    })
}

async fn regulator(expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FACTS_PATH))
        .and(header("user-agent", "Acme Research ops@acme.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(scenario_facts()))
        .expect(expected_fetches)
        .mount(&server)
        .await;
    server
}

fn orchestrator(server: &MockServer) -> Arc<EdgarOrchestrator> {
    let config = EdgarConfig::builder("Acme Research ops@acme.test")
        .with_data_base_url(server.uri())
        .with_tickers_url(format!("{}/files/company_tickers.json", server.uri()))
        .with_retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap();
    let orchestrator = EdgarOrchestrator::with_limiter(config, Arc::new(Unlimited))
        .unwrap()
        .with_resolver(Arc::new(StaticDirectory::new().with_entry("ACME", 42)));
    Arc::new(orchestrator)
}

fn assumptions() -> DcfAssumptions {
    DcfAssumptions::new(5, dec!(0.05), dec!(0.09), dec!(0.02))
}

#[derive(Debug)]
struct StubMarket;

#[async_trait]
impl MarketDataProvider for StubMarket {
    fn name(&self) -> &str {
        "stub"
    }

    async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot, MarketDataError> {
        let fy = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let eur = Unit::Currency("EUR".into());
        let mut series = FinancialSeries::new();
        for (concept, value, unit) in [
            (ConceptKey::Revenue, dec!(80), &eur),
            (ConceptKey::NetIncome, dec!(12), &eur),
            (ConceptKey::OperatingCashFlow, dec!(30), &eur),
            (ConceptKey::CapitalExpenditures, dec!(-6), &eur),
            (ConceptKey::StockholdersEquity, dec!(100), &eur),
            (ConceptKey::LongTermDebt, dec!(20), &eur),
            (ConceptKey::SharesOutstanding, dec!(10), &Unit::Shares),
        ] {
            series.insert(
                concept,
                DatedValue::new(fy, value, unit.clone(), FilingType::Annual)
                    .with_source(Source::Secondary),
            );
        }
        Ok(MarketSnapshot {
            symbol: symbol.clone(),
            price: Some(dec!(6)),
            currency: Some("EUR".into()),
            series,
        })
    }
}

#[tokio::test]
async fn test_scenario_produces_report() {
    let server = regulator(1).await;
    let analyzer = Analyzer::new(orchestrator(&server));

    let analysis = analyzer
        .analyze(&Symbol::new("acme"), &assumptions())
        .await
        .unwrap();
    let report = &analysis.report;

    let fair = report.dcf_fair_value.unwrap();
    assert!(fair > Decimal::ZERO);
    assert_eq!(report.fiscal_period_end, NaiveDate::from_ymd_opt(2023, 12, 31));
    assert_eq!(analysis.entity_name.as_deref(), Some("Acme Corp"));

    assert!(report.piotroski_score.is_some());
    assert_eq!(
        report.piotroski.outcome(PiotroskiCriterion::PositiveNetIncome),
        CriterionOutcome::Passed
    );
    assert_eq!(
        report.piotroski.outcome(PiotroskiCriterion::PositiveOperatingCashFlow),
        CriterionOutcome::NotEvaluable
    );
    assert_eq!(report.ratio(RatioName::NetMargin), Some(dec!(0.125)));
    assert_eq!(report.ratio(RatioName::PriceToBook), None);
}

#[tokio::test]
async fn test_second_analysis_is_served_from_cache() {
    let server = regulator(2).await;
    let analyzer = Analyzer::new(orchestrator(&server)).with_cache(ReportCache::in_memory());
    let ticker = Symbol::new("ACME");

    let first = analyzer.analyze(&ticker, &assumptions()).await.unwrap();
    let second = analyzer.analyze(&ticker, &assumptions()).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.report.computed_at, second.report.computed_at);
}

#[tokio::test]
async fn test_primary_values_win_over_secondary() {
    let server = regulator(1).await;
    let analyzer = Analyzer::new(orchestrator(&server)).with_market_data(Arc::new(StubMarket));

    let analysis = analyzer
        .analyze(&Symbol::new("ACME"), &assumptions())
        .await
        .unwrap();

    // equity and debt fill gaps; everything else was filed
    assert_eq!(analysis.secondary_values, 2);
    assert_eq!(analysis.price, Some(dec!(6)));
    let report = &analysis.report;
    // EPS 0.3
    assert_eq!(report.ratio(RatioName::PriceToEarnings), Some(dec!(20)));
    assert_eq!(report.ratio(RatioName::NetMargin), Some(dec!(0.125)));
    // BVPS 100 / 50
    assert_eq!(report.ratio(RatioName::PriceToBook), Some(dec!(3)));
    assert_eq!(report.ratio(RatioName::DebtToEquity), Some(dec!(0.2)));
}

#[tokio::test]
async fn test_unknown_ticker_uses_secondary_snapshot() {
    let server = regulator(0).await;
    let analyzer = Analyzer::new(orchestrator(&server)).with_market_data(Arc::new(StubMarket));

    let analysis = analyzer
        .analyze(&Symbol::new("AIR.PA"), &assumptions())
        .await
        .unwrap();
    assert!(analysis.entity.is_none());
    assert_eq!(analysis.secondary_values, 7);
    let report = &analysis.report;
    assert!(report.dcf_fair_value.is_some_and(|v| v > Decimal::ZERO));
    assert_eq!(report.ratio(RatioName::ReturnOnEquity), Some(dec!(0.12)));
    // BVPS 100 / 10
    assert_eq!(report.ratio(RatioName::PriceToBook), Some(dec!(0.6)));
    assert_eq!(report.ratio(RatioName::DebtToEquity), Some(dec!(0.2)));

    let strict = Analyzer::new(orchestrator(&server))
        .with_market_data(Arc::new(StubMarket))
        .without_secondary_fallback();
    let err = strict
        .analyze(&Symbol::new("AIR.PA"), &assumptions())
        .await
        .unwrap_err();
    assert_eq!(err.to_string().split(':').next(), Some("no data for AIR.PA"));
}

#[tokio::test]
async fn test_batch_shares_one_orchestrator() {
    let server = regulator(1).await;
    let analyzer = Analyzer::new(orchestrator(&server)).with_concurrency(3);
    let tickers = ["ACME", "acme", "ZZZZ"].map(Symbol::new);

    let results = analyzer.analyze_many(&tickers, &assumptions()).await;
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_ok());
    assert_eq!(
        results[1].1.as_ref().unwrap_err().to_string().split(':').next(),
        Some("no data for ZZZZ")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_out_of_process_fetch_matches_in_process() {
    let server = regulator(2).await;
    let in_process = orchestrator(&server);
    let filings = in_process.fetch(&Symbol::new("ACME")).await.unwrap();
    let payload = serde_json::to_string(&filings).unwrap();

    let fetcher = valuation::SubprocessOrchestrator::new("sh")
        .with_arg("-c")
        .with_arg(r#"printf '%s' "$0""#)
        .with_arg(payload);

    let ticker = Symbol::new("ACME");
    let direct = Analyzer::new(in_process)
        .analyze(&ticker, &assumptions())
        .await
        .unwrap();
    let remote = Analyzer::new(Arc::new(fetcher))
        .analyze(&ticker, &assumptions())
        .await
        .unwrap();

    assert_eq!(remote.entity, direct.entity);
    assert_eq!(remote.entity_name, direct.entity_name);
    assert_eq!(remote.report.dcf_fair_value, direct.report.dcf_fair_value);
    assert_eq!(remote.report.piotroski, direct.report.piotroski);
    assert_eq!(remote.report.ratios, direct.report.ratios);
}
