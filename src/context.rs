use std::sync::Arc;
use std::time::Duration;

use crate::configuration::{ConfigurationRepositoryTrait, ConfigurationService};
use crate::errors::Result;
use crate::events::ActivitySinkTrait;
use crate::health::{HealthCheckConfig, HealthCheckService, HealthTracker};
use crate::market_data::market_data_constants::DEFAULT_CALL_TIMEOUT_MS;
use crate::market_data::{
    register_builtin_providers, MarketDataService, ProviderRegistry, QuoteRepositoryTrait,
    RoutingStrategy,
};
use crate::portfolio::{HoldingsRepositoryTrait, ValuationService, ValuationServiceTrait};
use crate::scheduler::{MonitoredSymbols, SchedulerConfig, SchedulerService};
use crate::secrets::SecretDecryptorTrait;

/// Collaborator implementations injected by the hosting process.
pub struct CoreCollaborators {
    pub configuration_repository: Arc<dyn ConfigurationRepositoryTrait>,
    pub quote_repository: Arc<dyn QuoteRepositoryTrait>,
    pub holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
    pub activity_sink: Arc<dyn ActivitySinkTrait>,
    pub secret_decryptor: Arc<dyn SecretDecryptorTrait>,
}

pub struct CoreOptions {
    pub routing_strategy: RoutingStrategy,
    pub call_timeout: Duration,
    pub scheduler: SchedulerConfig,
    pub health_checks: HealthCheckConfig,
    /// Register the adapters that ship with the crate
    pub register_builtins: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions {
            routing_strategy: RoutingStrategy::default(),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            scheduler: SchedulerConfig::default(),
            health_checks: HealthCheckConfig::default(),
            register_builtins: true,
        }
    }
}

/// Explicit dependency object constructed once at process start and handed
/// to whatever outer surface hosts the core. No hidden globals.
pub struct CoreContext {
    pub registry: Arc<ProviderRegistry>,
    pub health: Arc<HealthTracker>,
    pub configurations: Arc<ConfigurationService>,
    pub valuation: Arc<ValuationService>,
    pub market_data: Arc<MarketDataService>,
    pub health_checks: Arc<HealthCheckService>,
    pub scheduler: Arc<SchedulerService>,
}

impl CoreContext {
    pub fn new(collaborators: CoreCollaborators, options: CoreOptions) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::new());
        if options.register_builtins {
            register_builtin_providers(&registry)?;
        }
        let health = Arc::new(HealthTracker::new());

        let configurations = Arc::new(ConfigurationService::new(
            collaborators.configuration_repository,
            registry.clone(),
            collaborators.secret_decryptor,
            collaborators.activity_sink.clone(),
        ));

        let valuation = Arc::new(ValuationService::new(
            collaborators.holdings_repository.clone(),
            collaborators.quote_repository.clone(),
            collaborators.activity_sink.clone(),
        ));

        let market_data = Arc::new(MarketDataService::new(
            configurations.clone(),
            collaborators.quote_repository,
            health.clone(),
            Some(valuation.clone() as Arc<dyn ValuationServiceTrait>),
            options.routing_strategy,
            options.call_timeout,
        ));

        let health_checks = Arc::new(HealthCheckService::new(
            configurations.clone(),
            health.clone(),
            collaborators.activity_sink.clone(),
            options.health_checks,
        ));

        let monitored_symbols = Arc::new(MonitoredSymbols::new(
            collaborators.holdings_repository,
            market_data.clone(),
        ));
        let scheduler = Arc::new(SchedulerService::new(
            market_data.clone(),
            monitored_symbols,
            collaborators.activity_sink,
            options.scheduler,
        ));

        Ok(CoreContext {
            registry,
            health,
            configurations,
            valuation,
            market_data,
            health_checks,
            scheduler,
        })
    }

    /// Start both background loops.
    pub async fn start_background_services(&self) -> Result<()> {
        self.health_checks.start();
        self.scheduler.start().await?;
        Ok(())
    }

    /// Stop both background loops, returning only after each has fully
    /// exited.
    pub async fn shutdown(&self) {
        if let Err(e) = self.scheduler.stop(Some("shutdown")).await {
            log::debug!("Scheduler was not running at shutdown: {}", e);
        }
        self.health_checks.stop().await;
    }
}
