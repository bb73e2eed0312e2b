use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::{Error, Result};
use crate::events::{ActivityEventType, ActivityRecord, ActivitySinkTrait};
use crate::market_data::market_data_model::Quote;
use crate::market_data::market_data_traits::QuoteRepositoryTrait;
use crate::portfolio::{
    Holding, HoldingsRepositoryTrait, Portfolio, PortfolioValuation, ValuationService,
    ValuationServiceTrait,
};

// --- Mocks ---

struct MemoryHoldingsRepository {
    portfolios: Vec<Portfolio>,
    saved: Mutex<Vec<PortfolioValuation>>,
    save_calls: AtomicUsize,
    fail_portfolio: Option<String>,
}

impl MemoryHoldingsRepository {
    fn new(portfolios: Vec<Portfolio>) -> Self {
        MemoryHoldingsRepository {
            portfolios,
            saved: Mutex::new(Vec::new()),
            save_calls: AtomicUsize::new(0),
            fail_portfolio: None,
        }
    }

    fn failing_for(mut self, portfolio_id: &str) -> Self {
        self.fail_portfolio = Some(portfolio_id.to_string());
        self
    }

    fn last_saved_for(&self, portfolio_id: &str) -> Option<PortfolioValuation> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|v| v.portfolio_id == portfolio_id)
            .cloned()
    }
}

#[async_trait]
impl HoldingsRepositoryTrait for MemoryHoldingsRepository {
    async fn portfolios_holding_symbols(&self, symbols: &[String]) -> Result<Vec<Portfolio>> {
        Ok(self
            .portfolios
            .iter()
            .filter(|p| {
                p.holdings
                    .iter()
                    .any(|h| h.quantity > Decimal::ZERO && symbols.contains(&h.symbol))
            })
            .cloned()
            .collect())
    }

    async fn held_symbols(&self) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        for portfolio in &self.portfolios {
            for holding in &portfolio.holdings {
                if holding.quantity > Decimal::ZERO && !symbols.contains(&holding.symbol) {
                    symbols.push(holding.symbol.clone());
                }
            }
        }
        Ok(symbols)
    }

    async fn save_valuation(&self, valuation: &PortfolioValuation) -> Result<()> {
        if self.fail_portfolio.as_deref() == Some(valuation.portfolio_id.as_str()) {
            return Err(Error::Repository("storage offline".to_string()));
        }
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.saved.lock().unwrap().push(valuation.clone());
        Ok(())
    }
}

#[derive(Default)]
struct MemoryQuoteRepository {
    current: Mutex<HashMap<String, Quote>>,
}

impl MemoryQuoteRepository {
    fn with_quote(self, symbol: &str, price: Decimal, open: Option<Decimal>) -> Self {
        let mut quote = Quote::new(symbol, price, "test-provider");
        quote.open = open;
        self.current
            .lock()
            .unwrap()
            .insert(symbol.to_string(), quote);
        self
    }
}

#[async_trait]
impl QuoteRepositoryTrait for MemoryQuoteRepository {
    async fn append_quote_history(&self, _quote: &Quote) -> Result<()> {
        Ok(())
    }

    async fn upsert_current_quote(&self, quote: &Quote) -> Result<()> {
        self.current
            .lock()
            .unwrap()
            .insert(quote.symbol.clone(), quote.clone());
        Ok(())
    }

    async fn get_current_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        Ok(self.current.lock().unwrap().get(symbol).cloned())
    }

    async fn get_current_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        let current = self.current.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| current.get(s).map(|q| (s.clone(), q.clone())))
            .collect())
    }
}

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<ActivityRecord>>,
}

#[async_trait]
impl ActivitySinkTrait for CollectingSink {
    async fn record(&self, record: ActivityRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl ActivitySinkTrait for FailingSink {
    async fn record(&self, _record: ActivityRecord) -> Result<()> {
        Err(Error::Repository("sink offline".to_string()))
    }
}

// --- Helpers ---

fn holding(portfolio_id: &str, symbol: &str, quantity: Decimal, average_cost: Decimal) -> Holding {
    Holding {
        id: format!("{}-{}", portfolio_id, symbol),
        portfolio_id: portfolio_id.to_string(),
        symbol: symbol.to_string(),
        quantity,
        average_cost,
    }
}

fn portfolio(id: &str, holdings: Vec<Holding>) -> Portfolio {
    Portfolio {
        id: id.to_string(),
        name: format!("Portfolio {}", id),
        holdings,
    }
}

fn engine(
    holdings: Arc<MemoryHoldingsRepository>,
    quotes: Arc<MemoryQuoteRepository>,
    sink: Arc<dyn ActivitySinkTrait>,
) -> ValuationService {
    ValuationService::new(holdings, quotes, sink)
}

// --- Tests ---

#[tokio::test]
async fn recomputes_the_documented_example_scenario() {
    // 100 shares of XYZ at average cost 40.00; snapshot arrives at 45.00
    // with opening price 43.00.
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![holding("pf1", "XYZ", dec!(100), dec!(40.00))],
    )]));
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(45.00), Some(dec!(43.00))));
    let engine = engine(holdings.clone(), quotes, Arc::new(CollectingSink::default()));

    engine.on_symbol_updated("XYZ").await.unwrap();

    let valuation = holdings.last_saved_for("pf1").unwrap();
    assert_eq!(valuation.total_value, dec!(4500.00));
    assert_eq!(valuation.daily_change, dec!(200.00));
    assert_eq!(valuation.daily_change_percent, dec!(4.65));
    assert_eq!(valuation.unrealized_gain, dec!(500.00));
    assert_eq!(valuation.unrealized_gain_percent, dec!(12.50));
}

#[tokio::test]
async fn missing_opening_price_contributes_zero_day_change() {
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![holding("pf1", "XYZ", dec!(100), dec!(40.00))],
    )]));
    let quotes = Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(45.00), None));
    let engine = engine(holdings.clone(), quotes, Arc::new(CollectingSink::default()));

    engine.on_symbol_updated("XYZ").await.unwrap();

    let valuation = holdings.last_saved_for("pf1").unwrap();
    assert_eq!(valuation.total_value, dec!(4500.00));
    assert_eq!(valuation.daily_change, Decimal::ZERO);
    assert_eq!(valuation.daily_change_percent, Decimal::ZERO);
}

#[tokio::test]
async fn zero_opening_value_yields_zero_percent_not_an_error() {
    // Opening price of zero makes the denominator zero; the percent must be
    // 0, never a division error or NaN.
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![holding("pf1", "XYZ", dec!(100), dec!(40.00))],
    )]));
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(45.00), Some(Decimal::ZERO)));
    let engine = engine(holdings.clone(), quotes, Arc::new(CollectingSink::default()));

    engine.on_symbol_updated("XYZ").await.unwrap();

    let valuation = holdings.last_saved_for("pf1").unwrap();
    assert_eq!(valuation.total_value, dec!(4500.00));
    assert_eq!(valuation.daily_change, dec!(4500.00));
    assert_eq!(valuation.daily_change_percent, Decimal::ZERO);
}

#[tokio::test]
async fn coalesced_update_matches_sequential_and_touches_each_portfolio_once() {
    let make_holdings = || {
        Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
            "pf1",
            vec![
                holding("pf1", "AAPL", dec!(10), dec!(150.00)),
                holding("pf1", "GOOGL", dec!(5), dec!(120.00)),
            ],
        )]))
    };
    let make_quotes = || {
        Arc::new(
            MemoryQuoteRepository::default()
                .with_quote("AAPL", dec!(190.00), Some(dec!(185.00)))
                .with_quote("GOOGL", dec!(140.00), Some(dec!(138.00))),
        )
    };

    // Coalesced path
    let bulk_holdings = make_holdings();
    let bulk_engine = engine(
        bulk_holdings.clone(),
        make_quotes(),
        Arc::new(CollectingSink::default()),
    );
    let summary = bulk_engine
        .on_symbols_updated(&["AAPL".to_string(), "GOOGL".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.portfolios_updated, 1);
    assert_eq!(summary.coalesced_count, 2);
    assert_eq!(bulk_holdings.save_calls.load(Ordering::SeqCst), 1);

    // Sequential path
    let seq_holdings = make_holdings();
    let seq_engine = engine(
        seq_holdings.clone(),
        make_quotes(),
        Arc::new(CollectingSink::default()),
    );
    seq_engine.on_symbol_updated("AAPL").await.unwrap();
    seq_engine.on_symbol_updated("GOOGL").await.unwrap();
    assert_eq!(seq_holdings.save_calls.load(Ordering::SeqCst), 2);

    let bulk = bulk_holdings.last_saved_for("pf1").unwrap();
    let sequential = seq_holdings.last_saved_for("pf1").unwrap();
    assert_eq!(bulk.total_value, sequential.total_value);
    assert_eq!(bulk.daily_change, sequential.daily_change);
    assert_eq!(bulk.daily_change_percent, sequential.daily_change_percent);

    // 10 * 190 + 5 * 140 and 10 * 5 + 5 * 2
    assert_eq!(bulk.total_value, dec!(2600.00));
    assert_eq!(bulk.daily_change, dec!(60.00));
}

#[tokio::test]
async fn one_portfolio_failure_does_not_abort_the_others() {
    let holdings = Arc::new(
        MemoryHoldingsRepository::new(vec![
            portfolio("bad", vec![holding("bad", "XYZ", dec!(1), dec!(1.00))]),
            portfolio("good", vec![holding("good", "XYZ", dec!(2), dec!(1.00))]),
        ])
        .failing_for("bad"),
    );
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(3.00), Some(dec!(2.00))));
    let engine = engine(holdings.clone(), quotes, Arc::new(CollectingSink::default()));

    let summary = engine.on_symbol_updated("XYZ").await.unwrap();
    assert_eq!(summary.portfolios_updated, 1);
    assert_eq!(summary.portfolios_failed, 1);
    assert!(holdings.last_saved_for("good").is_some());
}

#[tokio::test]
async fn holdings_without_a_current_quote_contribute_nothing() {
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![
            holding("pf1", "XYZ", dec!(100), dec!(40.00)),
            holding("pf1", "UNPRICED", dec!(50), dec!(10.00)),
        ],
    )]));
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(45.00), Some(dec!(43.00))));
    let engine = engine(holdings.clone(), quotes, Arc::new(CollectingSink::default()));

    engine.on_symbol_updated("XYZ").await.unwrap();

    let valuation = holdings.last_saved_for("pf1").unwrap();
    assert_eq!(valuation.total_value, dec!(4500.00));
    assert_eq!(valuation.daily_change, dec!(200.00));
}

#[tokio::test]
async fn every_invocation_records_an_update_metrics_entry() {
    let sink = Arc::new(CollectingSink::default());
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![holding("pf1", "XYZ", dec!(1), dec!(1.00))],
    )]));
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(2.00), Some(dec!(1.00))));
    let engine = engine(holdings, quotes, sink.clone());

    engine.on_symbol_updated("XYZ").await.unwrap();

    let records = sink.records.lock().unwrap();
    let metrics: Vec<_> = records
        .iter()
        .filter(|r| r.event_type == ActivityEventType::PortfolioRecalculated)
        .collect();
    assert_eq!(metrics.len(), 1);
    let metadata = metrics[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["trigger"], "single_symbol");
    assert_eq!(metadata["coalescedCount"], 1);
    assert_eq!(metadata["portfoliosUpdated"], 1);
}

#[tokio::test]
async fn metrics_sink_failure_does_not_fail_the_recalculation() {
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![holding("pf1", "XYZ", dec!(1), dec!(1.00))],
    )]));
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(2.00), Some(dec!(1.00))));
    let engine = engine(holdings.clone(), quotes, Arc::new(FailingSink));

    let summary = engine.on_symbol_updated("XYZ").await.unwrap();
    assert_eq!(summary.portfolios_updated, 1);
    assert!(holdings.last_saved_for("pf1").is_some());
}

#[tokio::test]
async fn symbols_are_normalized_and_deduplicated() {
    let holdings = Arc::new(MemoryHoldingsRepository::new(vec![portfolio(
        "pf1",
        vec![holding("pf1", "XYZ", dec!(1), dec!(1.00))],
    )]));
    let quotes =
        Arc::new(MemoryQuoteRepository::default().with_quote("XYZ", dec!(2.00), Some(dec!(1.00))));
    let engine = engine(holdings.clone(), quotes, Arc::new(CollectingSink::default()));

    let summary = engine
        .on_symbols_updated(&["xyz".to_string(), " XYZ ".to_string(), "XYZ".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.coalesced_count, 1);
    assert_eq!(holdings.save_calls.load(Ordering::SeqCst), 1);
}
