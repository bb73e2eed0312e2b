use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::configuration::{
    ConfigurationError, ConfigurationRepositoryTrait, ConfigurationService,
    ConfigurationServiceTrait, NewProviderConfiguration, ProviderConfiguration,
    ProviderConfigurationUpdate,
};
use crate::errors::{Error, Result};
use crate::events::{ActivityRecord, ActivitySinkTrait};
use crate::market_data::market_data_errors::{MarketDataError, RegistryError};
use crate::market_data::providers::market_data_provider::{HealthProbe, MarketDataProvider};
use crate::market_data::providers::models::{ProviderCapabilities, SettingKind, SettingSpec};
use crate::market_data::providers::provider_registry::ProviderRegistry;
use crate::market_data::{register_builtin_providers, Quote};
use crate::secrets::PassthroughDecryptor;

// --- Mocks ---

#[derive(Default)]
struct MemoryConfigurationRepository {
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

struct NoopSink;

#[async_trait]
impl ActivitySinkTrait for NoopSink {
    async fn record(&self, _record: ActivityRecord) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct CountingAdapter;

#[async_trait]
impl MarketDataProvider for CountingAdapter {
    fn provider_type(&self) -> &str {
        "COUNTED"
    }

    async fn get_latest_quote(&self, _symbol: &str) -> std::result::Result<Quote, MarketDataError> {
        Err(MarketDataError::NotFound("unused".to_string()))
    }

    async fn get_latest_quotes(
        &self,
        _symbols: &[String],
    ) -> std::result::Result<(Vec<Quote>, Vec<(String, String)>), MarketDataError> {
        Ok((Vec::new(), Vec::new()))
    }

    async fn check_health(&self) -> std::result::Result<HealthProbe, MarketDataError> {
        Ok(HealthProbe {
            latency_ms: 0,
            detail: None,
        })
    }
}

// --- Helpers ---

fn registry_with_counted(constructions: Arc<AtomicUsize>) -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::new());
    register_builtin_providers(&registry).unwrap();
    registry
        .register(
            "COUNTED",
            ProviderCapabilities::single_symbol(60),
            vec![
                SettingSpec::required("api_key", SettingKind::Secret),
                SettingSpec::optional("region", SettingKind::Text),
            ],
            Arc::new(move |_, _| {
                constructions.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(CountingAdapter) as Arc<dyn MarketDataProvider>)
            }),
        )
        .unwrap();
    registry
}

fn service_with(registry: Arc<ProviderRegistry>) -> ConfigurationService {
    ConfigurationService::new(
        Arc::new(MemoryConfigurationRepository::default()),
        registry,
        Arc::new(PassthroughDecryptor),
        Arc::new(NoopSink),
    )
}

fn counted_configuration() -> NewProviderConfiguration {
    NewProviderConfiguration {
        provider_type: "COUNTED".to_string(),
        name: "Counted".to_string(),
        settings: json!({"api_key": "secret-key", "region": "us"}),
        priority: 1,
    }
}

// --- Tests ---

#[tokio::test]
async fn create_rejects_unknown_provider_types() {
    let service = service_with(registry_with_counted(Arc::new(AtomicUsize::new(0))));
    let err = service
        .create(NewProviderConfiguration {
            provider_type: "NOPE".to_string(),
            name: "Nope".to_string(),
            settings: json!({}),
            priority: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::ProviderNotFound(_))
    ));
}

#[tokio::test]
async fn validation_reports_every_invalid_field() {
    let service = service_with(registry_with_counted(Arc::new(AtomicUsize::new(0))));
    let err = service
        .create(NewProviderConfiguration {
            provider_type: "COUNTED".to_string(),
            name: "Broken".to_string(),
            settings: json!({"api_key": "", "region": 7}),
            priority: 1,
        })
        .await
        .unwrap_err();

    match err {
        Error::Configuration(ConfigurationError::Validation(fields)) => {
            let mut names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
            names.sort();
            assert_eq!(names, vec!["api_key", "region"]);
        }
        other => panic!("expected Validation, got {:?}", other),
    }
}

#[tokio::test]
async fn get_adapter_returns_the_identical_cached_instance() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let service = service_with(registry_with_counted(constructions.clone()));
    let configuration = service.create(counted_configuration()).await.unwrap();

    let first = service.get_adapter(&configuration.id).await.unwrap().unwrap();
    let second = service.get_adapter(&configuration.id).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_first_access_constructs_exactly_once() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let service = Arc::new(service_with(registry_with_counted(constructions.clone())));
    let configuration = service.create(counted_configuration()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let id = configuration.id.clone();
        handles.push(tokio::spawn(async move {
            service.get_adapter(&id).await.unwrap().unwrap()
        }));
    }
    let adapters: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    for adapter in &adapters[1..] {
        assert!(Arc::ptr_eq(&adapters[0], adapter));
    }
}

#[tokio::test]
async fn settings_update_merges_and_invalidates_the_cached_adapter() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let service = service_with(registry_with_counted(constructions.clone()));
    let configuration = service.create(counted_configuration()).await.unwrap();

    let before = service.get_adapter(&configuration.id).await.unwrap().unwrap();

    let updated = service
        .update(
            &configuration.id,
            ProviderConfigurationUpdate {
                settings: Some(json!({"region": "eu"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Merge semantics: untouched keys survive the patch.
    assert_eq!(updated.settings["api_key"], json!("secret-key"));
    assert_eq!(updated.settings["region"], json!("eu"));

    let after = service.get_adapter(&configuration.id).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(constructions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn name_only_update_keeps_the_cached_adapter() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let service = service_with(registry_with_counted(constructions.clone()));
    let configuration = service.create(counted_configuration()).await.unwrap();

    let before = service.get_adapter(&configuration.id).await.unwrap().unwrap();
    service
        .update(
            &configuration.id,
            ProviderConfigurationUpdate {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let after = service.get_adapter(&configuration.id).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn soft_delete_deactivates_but_never_removes_the_row() {
    let service = service_with(registry_with_counted(Arc::new(AtomicUsize::new(0))));
    let configuration = service.create(counted_configuration()).await.unwrap();

    service.soft_delete(&configuration.id).await.unwrap();

    let stored = service.get(&configuration.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert!(service.list_active().await.unwrap().is_empty());
    assert_eq!(service.list().await.unwrap().len(), 1);
    assert!(service.get_adapter(&configuration.id).await.unwrap().is_none());
}

#[tokio::test]
async fn soft_delete_of_unknown_configuration_is_not_found() {
    let service = service_with(registry_with_counted(Arc::new(AtomicUsize::new(0))));
    let err = service.soft_delete("missing").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_construction_is_retried_on_the_next_access() {
    let registry = Arc::new(ProviderRegistry::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_in_factory = attempts.clone();
    registry
        .register(
            "FLAKY",
            ProviderCapabilities::single_symbol(60),
            Vec::new(),
            Arc::new(move |_, _| {
                if attempts_in_factory.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MarketDataError::ProviderError("cold start".to_string()))
                } else {
                    Ok(Arc::new(CountingAdapter) as Arc<dyn MarketDataProvider>)
                }
            }),
        )
        .unwrap();
    let service = service_with(registry);
    let configuration = service
        .create(NewProviderConfiguration {
            provider_type: "FLAKY".to_string(),
            name: "Flaky".to_string(),
            settings: json!({}),
            priority: 1,
        })
        .await
        .unwrap();

    assert!(service.get_adapter(&configuration.id).await.is_err());
    assert!(service.get_adapter(&configuration.id).await.unwrap().is_some());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn capabilities_resolve_through_the_registry() {
    let service = service_with(registry_with_counted(Arc::new(AtomicUsize::new(0))));
    let configuration = service.create(counted_configuration()).await.unwrap();

    let capabilities = service.capabilities(&configuration.id).await.unwrap().unwrap();
    assert!(!capabilities.supports_bulk);
    assert_eq!(capabilities.max_symbols_per_request, 1);
}
