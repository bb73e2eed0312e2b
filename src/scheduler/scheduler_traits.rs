use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::Result;
use crate::market_data::market_data_traits::MarketDataServiceTrait;
use crate::portfolio::HoldingsRepositoryTrait;

/// Supplies the symbol set the scheduler keeps fresh.
#[async_trait]
pub trait ActiveSymbolsTrait: Send + Sync {
    async fn active_symbols(&self) -> Result<Vec<String>>;
}

/// Default discovery: symbols held in any portfolio, plus symbols recently
/// requested through the routing layer.
pub struct MonitoredSymbols {
    holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
    market_data: Arc<dyn MarketDataServiceTrait>,
}

impl MonitoredSymbols {
    pub fn new(
        holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
        market_data: Arc<dyn MarketDataServiceTrait>,
    ) -> Self {
        MonitoredSymbols {
            holdings_repository,
            market_data,
        }
    }
}

#[async_trait]
impl ActiveSymbolsTrait for MonitoredSymbols {
    async fn active_symbols(&self) -> Result<Vec<String>> {
        let mut symbols = self.holdings_repository.held_symbols().await?;
        for symbol in self.market_data.recently_requested_symbols() {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }
}
