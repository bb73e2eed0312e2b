pub mod manual_provider;
pub mod market_data_provider;
pub mod models;
pub mod provider_registry;
pub mod spark_feed_provider;

pub use market_data_provider::{HealthProbe, MarketDataProvider};
pub use models::{ProviderCapabilities, SettingKind, SettingSpec};
pub use provider_registry::{AdapterFactory, ProviderRegistry};

use crate::market_data::market_data_constants::{PROVIDER_TYPE_MANUAL, PROVIDER_TYPE_SPARK_FEED};
use crate::market_data::market_data_errors::RegistryError;
use manual_provider::ManualProvider;
use spark_feed_provider::SparkFeedProvider;
use std::sync::Arc;

/// Register the adapters that ship with the crate. Deployments with custom
/// providers call `ProviderRegistry::register` with their own factories.
pub fn register_builtin_providers(registry: &ProviderRegistry) -> Result<(), RegistryError> {
    registry.register(
        PROVIDER_TYPE_SPARK_FEED,
        SparkFeedProvider::capabilities(),
        SparkFeedProvider::settings_schema(),
        Arc::new(|config_id, settings| {
            SparkFeedProvider::from_settings(config_id, settings)
                .map(|p| Arc::new(p) as Arc<dyn MarketDataProvider>)
        }),
    )?;
    registry.register(
        PROVIDER_TYPE_MANUAL,
        ManualProvider::capabilities(),
        ManualProvider::settings_schema(),
        Arc::new(|config_id, settings| {
            ManualProvider::from_settings(config_id, settings)
                .map(|p| Arc::new(p) as Arc<dyn MarketDataProvider>)
        }),
    )?;
    Ok(())
}
