use async_trait::async_trait;
use std::collections::HashMap;

use super::market_data_model::{BulkPriceResponse, Quote};
use crate::errors::Result;
use crate::health::ProviderHealth;

/// Price persistence collaborator. Implementations keep an append-only
/// history per symbol plus exactly one upserted "current" record per symbol.
#[async_trait]
pub trait QuoteRepositoryTrait: Send + Sync {
    async fn append_quote_history(&self, quote: &Quote) -> Result<()>;
    async fn upsert_current_quote(&self, quote: &Quote) -> Result<()>;
    async fn get_current_quote(&self, symbol: &str) -> Result<Option<Quote>>;
    async fn get_current_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>>;
}

/// The routing surface exposed to the outer layers and to the scheduler.
#[async_trait]
pub trait MarketDataServiceTrait: Send + Sync {
    async fn get_price(
        &self,
        symbol: &str,
        preferred_provider_id: Option<&str>,
    ) -> Result<Quote>;

    async fn get_prices(&self, symbols: &[String], prefer_bulk: bool)
        -> Result<BulkPriceResponse>;

    async fn check_health(&self, config_id: &str) -> Result<ProviderHealth>;
    async fn all_health(&self) -> Result<HashMap<String, ProviderHealth>>;

    /// Bulk limit of the most bulk-capable active provider, if any.
    async fn max_bulk_symbols(&self) -> Result<Option<usize>>;

    /// Symbols requested through this service within the recency window.
    fn recently_requested_symbols(&self) -> Vec<String>;
}
