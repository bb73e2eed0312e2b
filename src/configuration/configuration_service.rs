use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::configuration_errors::{ConfigurationError, FieldError};
use super::configuration_model::{
    NewProviderConfiguration, ProviderConfiguration, ProviderConfigurationUpdate,
};
use super::configuration_traits::{ConfigurationRepositoryTrait, ConfigurationServiceTrait};
use crate::errors::{Error, Result};
use crate::events::{record_best_effort, ActivityEventType, ActivityRecord, ActivitySinkTrait, Severity};
use crate::market_data::market_data_errors::RegistryError;
use crate::market_data::providers::market_data_provider::MarketDataProvider;
use crate::market_data::providers::models::{ProviderCapabilities, SettingKind};
use crate::market_data::providers::provider_registry::ProviderRegistry;
use crate::secrets::SecretDecryptorTrait;

type AdapterCell = Arc<OnceCell<Arc<dyn MarketDataProvider>>>;

/// Bridges persisted provider configurations and live adapters. Owns the
/// adapter cache: at most one live instance per configuration id, with
/// single-flight construction under concurrent first access.
pub struct ConfigurationService {
    repository: Arc<dyn ConfigurationRepositoryTrait>,
    registry: Arc<ProviderRegistry>,
    decryptor: Arc<dyn SecretDecryptorTrait>,
    activity_sink: Arc<dyn ActivitySinkTrait>,
    adapter_cells: DashMap<String, AdapterCell>,
}

impl ConfigurationService {
    pub fn new(
        repository: Arc<dyn ConfigurationRepositoryTrait>,
        registry: Arc<ProviderRegistry>,
        decryptor: Arc<dyn SecretDecryptorTrait>,
        activity_sink: Arc<dyn ActivitySinkTrait>,
    ) -> Self {
        ConfigurationService {
            repository,
            registry,
            decryptor,
            activity_sink,
            adapter_cells: DashMap::new(),
        }
    }

    /// Validate settings against the provider type's declared schema,
    /// collecting every invalid field.
    fn validate_settings(&self, provider_type: &str, settings: &Value) -> Result<()> {
        let schema = self.registry.settings_schema(provider_type).ok_or_else(|| {
            Error::Registry(RegistryError::ProviderNotFound(provider_type.to_string()))
        })?;

        let mut errors: Vec<FieldError> = Vec::new();
        let object = settings.as_object();
        if object.is_none() && !schema.is_empty() {
            errors.push(FieldError {
                field: "settings".to_string(),
                message: "must be a JSON object".to_string(),
            });
        }

        for spec in &schema {
            let value = object.and_then(|o| o.get(spec.key));
            match value {
                None | Some(Value::Null) => {
                    if spec.required {
                        errors.push(FieldError {
                            field: spec.key.to_string(),
                            message: "is required".to_string(),
                        });
                    }
                }
                Some(v) => {
                    if !kind_matches(&spec.kind, v) {
                        errors.push(FieldError {
                            field: spec.key.to_string(),
                            message: format!("expected {}", kind_name(&spec.kind)),
                        });
                    } else if spec.required && v.as_str().is_some_and(|s| s.trim().is_empty()) {
                        errors.push(FieldError {
                            field: spec.key.to_string(),
                            message: "must not be empty".to_string(),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Validation(errors).into())
        }
    }

    async fn build_adapter(
        &self,
        configuration: &ProviderConfiguration,
    ) -> Result<Arc<dyn MarketDataProvider>> {
        let settings = self
            .decryptor
            .decrypt_settings(&configuration.settings)
            .await?;
        self.validate_settings(&configuration.provider_type, &settings)?;

        let adapter = self.registry.create(
            &configuration.provider_type,
            &configuration.id,
            &settings,
        )?;
        adapter.connect().await.map_err(|e| {
            Error::Configuration(ConfigurationError::AdapterConstruction(e.to_string()))
        })?;

        info!(
            "Constructed adapter for configuration '{}' ({})",
            configuration.id, configuration.provider_type
        );
        Ok(adapter)
    }

    /// Drop the cached adapter for a configuration and release its resources
    /// on a background task, without blocking the caller.
    fn invalidate_adapter(&self, id: &str) {
        if let Some((_, cell)) = self.adapter_cells.remove(id) {
            if let Some(adapter) = cell.get() {
                let adapter = adapter.clone();
                let id = id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = adapter.disconnect().await {
                        warn!("Failed to release adapter for configuration '{}': {}", id, e);
                    } else {
                        debug!("Released adapter for configuration '{}'", id);
                    }
                });
            }
        }
    }
}

fn kind_matches(kind: &SettingKind, value: &Value) -> bool {
    match kind {
        SettingKind::Text | SettingKind::Secret => value.is_string(),
        SettingKind::Number => value.is_number(),
        SettingKind::Boolean => value.is_boolean(),
        SettingKind::Object => value.is_object() || value.is_array(),
    }
}

fn kind_name(kind: &SettingKind) -> &'static str {
    match kind {
        SettingKind::Text => "a string",
        SettingKind::Secret => "a string",
        SettingKind::Number => "a number",
        SettingKind::Boolean => "a boolean",
        SettingKind::Object => "an object or array",
    }
}

#[async_trait]
impl ConfigurationServiceTrait for ConfigurationService {
    async fn create(&self, new: NewProviderConfiguration) -> Result<ProviderConfiguration> {
        if !self.registry.contains(&new.provider_type) {
            return Err(RegistryError::ProviderNotFound(new.provider_type).into());
        }
        self.validate_settings(&new.provider_type, &new.settings)?;

        let configuration = new.into_configuration();
        self.repository.insert(&configuration).await?;
        info!(
            "Created provider configuration '{}' ({})",
            configuration.id, configuration.provider_type
        );
        Ok(configuration)
    }

    async fn update(
        &self,
        id: &str,
        update: ProviderConfigurationUpdate,
    ) -> Result<ProviderConfiguration> {
        let mut configuration = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))?;

        if let Some(name) = update.name {
            configuration.name = name;
        }
        if let Some(priority) = update.priority {
            configuration.priority = priority;
        }

        let settings_changed = update.settings.is_some();
        if let Some(patch) = update.settings {
            match (configuration.settings.as_object_mut(), patch.as_object()) {
                (Some(existing), Some(incoming)) => {
                    for (key, value) in incoming {
                        existing.insert(key.clone(), value.clone());
                    }
                }
                _ => configuration.settings = patch,
            }
            self.validate_settings(&configuration.provider_type, &configuration.settings)?;
        }

        if let Some(active) = update.is_active {
            configuration.is_active = active;
        }
        configuration.updated_at = Utc::now();
        self.repository.update(&configuration).await?;

        // A structural settings change or deactivation invalidates the
        // cached adapter; it is lazily recreated on the next access.
        if settings_changed || !configuration.is_active {
            self.invalidate_adapter(&configuration.id);
        }
        Ok(configuration)
    }

    async fn get(&self, id: &str) -> Result<Option<ProviderConfiguration>> {
        self.repository.get(id).await
    }

    async fn list(&self) -> Result<Vec<ProviderConfiguration>> {
        self.repository.list().await
    }

    async fn list_active(&self) -> Result<Vec<ProviderConfiguration>> {
        self.repository.list_active().await
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        let mut configuration = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))?;

        configuration.is_active = false;
        configuration.updated_at = Utc::now();
        self.repository.update(&configuration).await?;
        self.invalidate_adapter(id);

        record_best_effort(
            self.activity_sink.as_ref(),
            ActivityRecord::new(
                ActivityEventType::ConfigurationDeactivated,
                Severity::Info,
                format!("Provider configuration '{}' deactivated", configuration.name),
            )
            .with_provider(id),
        )
        .await;
        Ok(())
    }

    async fn get_adapter(&self, id: &str) -> Result<Option<Arc<dyn MarketDataProvider>>> {
        let configuration = match self.repository.get(id).await? {
            Some(c) if c.is_active => c,
            _ => return Ok(None),
        };

        let cell = self
            .adapter_cells
            .entry(configuration.id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let adapter = cell
            .get_or_try_init(|| self.build_adapter(&configuration))
            .await?;
        Ok(Some(adapter.clone()))
    }

    async fn capabilities(&self, id: &str) -> Result<Option<ProviderCapabilities>> {
        Ok(self
            .repository
            .get(id)
            .await?
            .and_then(|c| self.registry.capabilities(&c.provider_type)))
    }
}
