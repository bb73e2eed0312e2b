use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

use pricefeed_core::configuration::{ConfigurationRepositoryTrait, ProviderConfiguration};
use pricefeed_core::errors::Result;
use pricefeed_core::events::{ActivityRecord, ActivitySinkTrait};
use pricefeed_core::market_data::{Quote, QuoteRepositoryTrait};
use pricefeed_core::portfolio::{Holding, HoldingsRepositoryTrait, Portfolio, PortfolioValuation};

#[derive(Default)]
pub struct MemoryConfigurationRepository {
    rows: Mutex<HashMap<String, ProviderConfiguration>>,
}

#[async_trait]
impl ConfigurationRepositoryTrait for MemoryConfigurationRepository {
    async fn insert(&self, configuration: &ProviderConfiguration) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(configuration.id.clone(), configuration.clone());
        Ok(())
    }

    async fn update(&self, configuration: &ProviderConfiguration) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(configuration.id.clone(), configuration.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ProviderConfiguration>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ProviderConfiguration>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn list_active(&self) -> Result<Vec<ProviderConfiguration>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryQuoteRepository {
    pub history: Mutex<Vec<Quote>>,
    pub current: Mutex<HashMap<String, Quote>>,
}

#[async_trait]
impl QuoteRepositoryTrait for MemoryQuoteRepository {
    async fn append_quote_history(&self, quote: &Quote) -> Result<()> {
        self.history.lock().unwrap().push(quote.clone());
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

pub struct MemoryHoldingsRepository {
    pub portfolios: Vec<Portfolio>,
    pub valuations: Mutex<HashMap<String, PortfolioValuation>>,
}

impl MemoryHoldingsRepository {
    pub fn new(portfolios: Vec<Portfolio>) -> Self {
        MemoryHoldingsRepository {
            portfolios,
            valuations: Mutex::new(HashMap::new()),
        }
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
        self.valuations
            .lock()
            .unwrap()
            .insert(valuation.portfolio_id.clone(), valuation.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub records: Mutex<Vec<ActivityRecord>>,
}

#[async_trait]
impl ActivitySinkTrait for CollectingSink {
    async fn record(&self, record: ActivityRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

pub fn holding(portfolio_id: &str, symbol: &str, quantity: Decimal, average_cost: Decimal) -> Holding {
    Holding {
        id: format!("{}-{}", portfolio_id, symbol),
        portfolio_id: portfolio_id.to_string(),
        symbol: symbol.to_string(),
        quantity,
        average_cost,
    }
}
