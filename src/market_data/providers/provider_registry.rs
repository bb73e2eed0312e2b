use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use serde_json::Value;
use std::sync::Arc;

use crate::market_data::market_data_errors::{MarketDataError, RegistryError};
use crate::market_data::providers::market_data_provider::MarketDataProvider;
use crate::market_data::providers::models::{ProviderCapabilities, SettingSpec};

/// Constructor resolved at registration time; receives the configuration id
/// and its decrypted settings.
pub type AdapterFactory = Arc<
    dyn Fn(&str, &Value) -> Result<Arc<dyn MarketDataProvider>, MarketDataError> + Send + Sync,
>;

struct RegisteredProvider {
    factory: AdapterFactory,
    capabilities: ProviderCapabilities,
    settings_schema: Vec<SettingSpec>,
}

/// Process-wide catalog mapping a provider type name to its adapter factory
/// and declared capabilities. No traffic can be routed to a provider type
/// that is not present here. State lives only for the process lifetime.
pub struct ProviderRegistry {
    providers: DashMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: DashMap::new(),
        }
    }

    /// Register a provider type. Atomic: concurrent callers never observe a
    /// half-registered entry.
    pub fn register(
        &self,
        name: &str,
        capabilities: ProviderCapabilities,
        settings_schema: Vec<SettingSpec>,
        factory: AdapterFactory,
    ) -> Result<(), RegistryError> {
        match self.providers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateProvider(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredProvider {
                    factory,
                    capabilities,
                    settings_schema,
                });
                info!("Registered market data provider type '{}'", name);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.providers
            .remove(name)
            .map(|_| info!("Unregistered market data provider type '{}'", name))
            .ok_or_else(|| RegistryError::ProviderNotFound(name.to_string()))
    }

    /// Construct an adapter for one configuration of the named provider type.
    pub fn create(
        &self,
        name: &str,
        config_id: &str,
        settings: &Value,
    ) -> Result<Arc<dyn MarketDataProvider>, RegistryError> {
        let entry = self
            .providers
            .get(name)
            .ok_or_else(|| RegistryError::ProviderNotFound(name.to_string()))?;
        (entry.factory)(config_id, settings).map_err(|e| RegistryError::ConstructionFailed {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn capabilities(&self, name: &str) -> Option<ProviderCapabilities> {
        self.providers.get(name).map(|e| e.capabilities)
    }

    pub fn settings_schema(&self, name: &str) -> Option<Vec<SettingSpec>> {
        self.providers.get(name).map(|e| e.settings_schema.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn filter_by_capability<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&ProviderCapabilities) -> bool,
    {
        self.providers
            .iter()
            .filter(|e| predicate(&e.capabilities))
            .map(|e| e.key().clone())
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
