use crate::market_data::market_data_errors::MarketDataError;
use crate::market_data::market_data_model::Quote;
use async_trait::async_trait;

/// Result of one health probe against a live adapter
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub latency_ms: u64,
    pub detail: Option<String>,
}

/// A live adapter wrapping one configured provider instance. Adapters are
/// the only components that speak to the outside network; everything above
/// them treats them as opaque.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + std::fmt::Debug {
    /// Provider type name this adapter was registered under
    fn provider_type(&self) -> &str;

    /// Acquire any network/session resources. Called once by the adapter
    /// cache before the instance is handed out.
    async fn connect(&self) -> Result<(), MarketDataError> {
        Ok(())
    }

    /// Release resources. Called asynchronously when a configuration is
    /// deactivated or its cached adapter is invalidated.
    async fn disconnect(&self) -> Result<(), MarketDataError> {
        Ok(())
    }

    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError>;

    /// Fetch quotes for multiple symbols. Returns the quotes obtained plus
    /// the symbols that failed with their error messages; a total failure
    /// (auth, network, rate limit) is an `Err` instead.
    async fn get_latest_quotes(
        &self,
        symbols: &[String],
    ) -> Result<(Vec<Quote>, Vec<(String, String)>), MarketDataError>;

    /// Lightweight reachability probe used by the health-check loop.
    async fn check_health(&self) -> Result<HealthProbe, MarketDataError>;
}
