pub(crate) mod market_data_constants;
pub(crate) mod market_data_errors;
pub(crate) mod market_data_model;
pub(crate) mod market_data_service;
pub(crate) mod market_data_traits;
pub(crate) mod providers;


// Re-export the public interface
pub use market_data_constants::*;
pub use market_data_model::{BulkPriceResponse, Quote, RoutingStrategy};
pub use market_data_service::MarketDataService;
pub use market_data_traits::{MarketDataServiceTrait, QuoteRepositoryTrait};

// Re-export provider types
pub use providers::market_data_provider::{HealthProbe, MarketDataProvider};
pub use providers::models::{ProviderCapabilities, SettingKind, SettingSpec};
pub use providers::provider_registry::{AdapterFactory, ProviderRegistry};
pub use providers::register_builtin_providers;

// Re-export error types for convenience
pub use market_data_errors::{MarketDataError, RegistryError};
