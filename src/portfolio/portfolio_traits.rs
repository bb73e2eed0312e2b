use async_trait::async_trait;

use super::portfolio_model::{Portfolio, PortfolioValuation, RecalculationSummary};
use crate::errors::Result;

/// Holdings/portfolio persistence collaborator.
#[async_trait]
pub trait HoldingsRepositoryTrait: Send + Sync {
    /// Portfolios (with their holdings) containing any of the given symbols
    /// with quantity > 0. Each portfolio appears at most once.
    async fn portfolios_holding_symbols(&self, symbols: &[String]) -> Result<Vec<Portfolio>>;

    /// Distinct symbols held with quantity > 0 across all portfolios.
    async fn held_symbols(&self) -> Result<Vec<String>>;

    /// Persist the derived portfolio fields atomically with the refreshed
    /// timestamp.
    async fn save_valuation(&self, valuation: &PortfolioValuation) -> Result<()>;
}

/// The real-time recalculation engine surface.
#[async_trait]
pub trait ValuationServiceTrait: Send + Sync {
    async fn on_symbol_updated(&self, symbol: &str) -> Result<RecalculationSummary>;

    /// Coalesced form: recomputes each affected portfolio exactly once even
    /// when many symbols change together.
    async fn on_symbols_updated(&self, symbols: &[String]) -> Result<RecalculationSummary>;
}
