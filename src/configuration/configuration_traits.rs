use async_trait::async_trait;
use std::sync::Arc;

use super::configuration_model::{
    NewProviderConfiguration, ProviderConfiguration, ProviderConfigurationUpdate,
};
use crate::errors::Result;
use crate::market_data::providers::market_data_provider::MarketDataProvider;
use crate::market_data::providers::models::ProviderCapabilities;

/// Persistence collaborator for provider configurations. Deletion is always
/// the soft kind; implementations never remove rows.
#[async_trait]
pub trait ConfigurationRepositoryTrait: Send + Sync {
    async fn insert(&self, configuration: &ProviderConfiguration) -> Result<()>;
    async fn update(&self, configuration: &ProviderConfiguration) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<ProviderConfiguration>>;
    async fn list(&self) -> Result<Vec<ProviderConfiguration>>;
    async fn list_active(&self) -> Result<Vec<ProviderConfiguration>>;
}

/// Configuration management surface consumed by the routing layer and the
/// background loops.
#[async_trait]
pub trait ConfigurationServiceTrait: Send + Sync {
    async fn create(&self, new: NewProviderConfiguration) -> Result<ProviderConfiguration>;
    async fn update(
        &self,
        id: &str,
        update: ProviderConfigurationUpdate,
    ) -> Result<ProviderConfiguration>;
    async fn get(&self, id: &str) -> Result<Option<ProviderConfiguration>>;
    async fn list(&self) -> Result<Vec<ProviderConfiguration>>;
    async fn list_active(&self) -> Result<Vec<ProviderConfiguration>>;
    async fn soft_delete(&self, id: &str) -> Result<()>;

    /// Cached adapter for an active configuration; `None` when the
    /// configuration is missing or deactivated.
    async fn get_adapter(&self, id: &str) -> Result<Option<Arc<dyn MarketDataProvider>>>;

    /// Declared capabilities of the configuration's provider type.
    async fn capabilities(&self, id: &str) -> Result<Option<ProviderCapabilities>>;
}
