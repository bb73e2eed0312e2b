use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use lazy_static::lazy_static;
use log::{debug, error, warn};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::market_data_constants::RECENT_REQUEST_WINDOW_SECS;
use super::market_data_errors::MarketDataError;
use super::market_data_model::{BulkPriceResponse, Quote, RoutingStrategy};
use super::market_data_traits::{MarketDataServiceTrait, QuoteRepositoryTrait};
use crate::configuration::{ConfigurationServiceTrait, ProviderConfiguration};
use crate::errors::Result;
use crate::health::{HealthTracker, ProviderHealth};
use crate::market_data::providers::models::ProviderCapabilities;
use crate::portfolio::ValuationServiceTrait;

lazy_static! {
    static ref SYMBOL_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.\-^=]{0,19}$").expect("valid symbol pattern");
}

struct Candidate {
    configuration: ProviderConfiguration,
    capabilities: ProviderCapabilities,
    health: ProviderHealth,
}

impl Candidate {
    fn performance_score(&self) -> f64 {
        self.health.success_rate - self.health.avg_latency_ms / 1000.0
    }
}

/// The routing brain. Selects an ordered candidate list of active, healthy
/// provider configurations, tries each in turn (bulk-capable first for
/// multi-symbol requests), records per-attempt health feedback, and
/// write-throughs every fetched quote to the price repository.
pub struct MarketDataService {
    configurations: Arc<dyn ConfigurationServiceTrait>,
    quote_repository: Arc<dyn QuoteRepositoryTrait>,
    health: Arc<HealthTracker>,
    valuation: Option<Arc<dyn ValuationServiceTrait>>,
    strategy: RoutingStrategy,
    call_timeout: Duration,
    recent_requests: DashMap<String, DateTime<Utc>>,
}

impl MarketDataService {
    pub fn new(
        configurations: Arc<dyn ConfigurationServiceTrait>,
        quote_repository: Arc<dyn QuoteRepositoryTrait>,
        health: Arc<HealthTracker>,
        valuation: Option<Arc<dyn ValuationServiceTrait>>,
        strategy: RoutingStrategy,
        call_timeout: Duration,
    ) -> Self {
        MarketDataService {
            configurations,
            quote_repository,
            health,
            valuation,
            strategy,
            call_timeout,
            recent_requests: DashMap::new(),
        }
    }

    fn normalize_symbol(raw: &str) -> std::result::Result<String, MarketDataError> {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() || !SYMBOL_PATTERN.is_match(&symbol) {
            return Err(MarketDataError::InvalidSymbol(raw.to_string()));
        }
        Ok(symbol)
    }

    fn note_request(&self, symbol: &str) {
        self.recent_requests.insert(symbol.to_string(), Utc::now());
    }

    /// Active configurations minus unhealthy/circuit-open ones, ranked by
    /// the configured strategy. A preferred id is moved to the front; for
    /// multi-symbol requests bulk-capable candidates come first.
    async fn routing_candidates(
        &self,
        preferred_provider_id: Option<&str>,
        bulk_first: bool,
    ) -> Result<Vec<Candidate>> {
        let active = self.configurations.list_active().await?;
        let mut candidates = Vec::with_capacity(active.len());

        for configuration in active {
            let capabilities = match self.configurations.capabilities(&configuration.id).await? {
                Some(c) => c,
                None => {
                    warn!(
                        "Skipping configuration '{}': provider type '{}' is not registered",
                        configuration.id, configuration.provider_type
                    );
                    continue;
                }
            };
            let health = self.health.get(&configuration.id);
            if !health.status.is_routable() {
                debug!(
                    "Skipping configuration '{}' for routing: status {}",
                    configuration.id,
                    health.status.as_str()
                );
                continue;
            }
            candidates.push(Candidate {
                configuration,
                capabilities,
                health,
            });
        }

        match self.strategy {
            RoutingStrategy::Priority => {
                candidates.sort_by_key(|c| c.configuration.priority);
            }
            RoutingStrategy::Performance => {
                candidates.sort_by(|a, b| {
                    b.performance_score()
                        .partial_cmp(&a.performance_score())
                        .unwrap_or(Ordering::Equal)
                });
            }
        }

        if bulk_first {
            let (bulk, single): (Vec<_>, Vec<_>) = candidates
                .into_iter()
                .partition(|c| c.capabilities.supports_bulk);
            candidates = bulk;
            candidates.extend(single);
        }

        if let Some(preferred) = preferred_provider_id {
            if let Some(position) = candidates
                .iter()
                .position(|c| c.configuration.id == preferred)
            {
                let candidate = candidates.remove(position);
                candidates.insert(0, candidate);
            }
        }

        Ok(candidates)
    }

    async fn persist_quote(&self, quote: &Quote) {
        if let Err(e) = self.quote_repository.append_quote_history(quote).await {
            warn!(
                "Failed to append price history for '{}': {}",
                quote.symbol, e
            );
        }
        if let Err(e) = self.quote_repository.upsert_current_quote(quote).await {
            warn!(
                "Failed to upsert current price for '{}': {}",
                quote.symbol, e
            );
        }
    }

    /// Propagate fresh prices into dependent portfolio valuations. A
    /// recalculation failure never fails the fetch that triggered it.
    async fn notify_valuation(&self, symbols: &[String], coalesced: bool) {
        let Some(valuation) = &self.valuation else {
            return;
        };
        let outcome = if coalesced || symbols.len() > 1 {
            valuation.on_symbols_updated(symbols).await.map(|_| ())
        } else if let Some(symbol) = symbols.first() {
            valuation.on_symbol_updated(symbol).await.map(|_| ())
        } else {
            return;
        };
        if let Err(e) = outcome {
            error!(
                "Portfolio recalculation after price update failed: {}",
                e
            );
        }
    }

    fn timeout_error(&self) -> MarketDataError {
        MarketDataError::Timeout(self.call_timeout.as_millis() as u64)
    }
}

#[async_trait]
impl MarketDataServiceTrait for MarketDataService {
    async fn get_price(
        &self,
        symbol: &str,
        preferred_provider_id: Option<&str>,
    ) -> Result<Quote> {
        let symbol = Self::normalize_symbol(symbol)?;
        self.note_request(&symbol);

        let candidates = self.routing_candidates(preferred_provider_id, false).await?;
        if candidates.is_empty() {
            return Err(MarketDataError::NoActiveProviders.into());
        }

        let mut last_error: Option<String> = None;
        for candidate in &candidates {
            let id = &candidate.configuration.id;
            let adapter = match self.configurations.get_adapter(id).await {
                Ok(Some(adapter)) => adapter,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not obtain adapter for '{}': {}. Trying next.", id, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let started = Instant::now();
            match tokio::time::timeout(self.call_timeout, adapter.get_latest_quote(&symbol)).await
            {
                Ok(Ok(mut quote)) => {
                    self.health
                        .record_success(id, started.elapsed().as_millis() as u64);
                    quote.symbol = quote.symbol.to_uppercase();
                    quote.provider_id = id.clone();
                    self.persist_quote(&quote).await;
                    self.notify_valuation(std::slice::from_ref(&quote.symbol), false)
                        .await;
                    return Ok(quote);
                }
                Ok(Err(e)) => {
                    self.health.record_failure(id, e.is_rate_limit());
                    warn!(
                        "Provider '{}' failed to quote '{}': {}. Trying next.",
                        id, symbol, e
                    );
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    self.health.record_failure(id, false);
                    let e = self.timeout_error();
                    warn!(
                        "Provider '{}' timed out quoting '{}'. Trying next.",
                        id, symbol
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(MarketDataError::AllProvidersFailed(
            last_error.unwrap_or_else(|| "No candidate could be attempted".to_string()),
        )
        .into())
    }

    async fn get_prices(
        &self,
        symbols: &[String],
        prefer_bulk: bool,
    ) -> Result<BulkPriceResponse> {
        let mut failed: Vec<(String, String)> = Vec::new();
        let mut remaining: Vec<String> = Vec::new();
        for raw in symbols {
            match Self::normalize_symbol(raw) {
                Ok(symbol) => {
                    if !remaining.contains(&symbol) {
                        remaining.push(symbol);
                    }
                }
                Err(e) => failed.push((raw.clone(), e.to_string())),
            }
        }

        if remaining.is_empty() {
            if failed.is_empty() {
                return Ok(BulkPriceResponse::default());
            }
            return Err(MarketDataError::InvalidSymbol(
                failed
                    .into_iter()
                    .map(|(s, _)| s)
                    .collect::<Vec<_>>()
                    .join(", "),
            )
            .into());
        }
        for symbol in &remaining {
            self.note_request(symbol);
        }

        let candidates = self.routing_candidates(None, prefer_bulk).await?;
        if candidates.is_empty() {
            return Err(MarketDataError::NoActiveProviders.into());
        }

        let mut quotes: HashMap<String, Quote> = HashMap::new();
        let mut last_error: Option<String> = None;

        for candidate in &candidates {
            if remaining.is_empty() {
                break;
            }
            let id = &candidate.configuration.id;
            let adapter = match self.configurations.get_adapter(id).await {
                Ok(Some(adapter)) => adapter,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not obtain adapter for '{}': {}. Trying next.", id, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            if prefer_bulk && candidate.capabilities.supports_bulk {
                let chunk_size = candidate.capabilities.max_symbols_per_request.max(1);
                let mut fetched: Vec<Quote> = Vec::new();
                for chunk in remaining.chunks(chunk_size) {
                    let started = Instant::now();
                    match tokio::time::timeout(
                        self.call_timeout,
                        adapter.get_latest_quotes(chunk),
                    )
                    .await
                    {
                        Ok(Ok((chunk_quotes, chunk_failed))) => {
                            self.health
                                .record_success(id, started.elapsed().as_millis() as u64);
                            fetched.extend(chunk_quotes);
                            // Symbols the provider reported as failed stay
                            // outstanding and fall through to later candidates.
                            if !chunk_failed.is_empty() {
                                last_error = chunk_failed.last().map(|(_, e)| e.clone());
                            }
                        }
                        Ok(Err(e)) => {
                            self.health.record_failure(id, e.is_rate_limit());
                            warn!(
                                "Provider '{}' bulk fetch failed: {}. Trying next.",
                                id, e
                            );
                            last_error = Some(e.to_string());
                            break;
                        }
                        Err(_) => {
                            self.health.record_failure(id, false);
                            warn!("Provider '{}' bulk fetch timed out. Trying next.", id);
                            last_error = Some(self.timeout_error().to_string());
                            break;
                        }
                    }
                }
                for mut quote in fetched {
                    quote.symbol = quote.symbol.to_uppercase();
                    quote.provider_id = id.clone();
                    self.persist_quote(&quote).await;
                    remaining.retain(|s| s != &quote.symbol);
                    quotes.insert(quote.symbol.clone(), quote);
                }
            } else {
                let mut outstanding: Vec<String> = Vec::new();
                for symbol in remaining.iter() {
                    let started = Instant::now();
                    match tokio::time::timeout(
                        self.call_timeout,
                        adapter.get_latest_quote(symbol),
                    )
                    .await
                    {
                        Ok(Ok(mut quote)) => {
                            self.health
                                .record_success(id, started.elapsed().as_millis() as u64);
                            quote.symbol = quote.symbol.to_uppercase();
                            quote.provider_id = id.clone();
                            self.persist_quote(&quote).await;
                            quotes.insert(quote.symbol.clone(), quote);
                        }
                        Ok(Err(e)) => {
                            self.health.record_failure(id, e.is_rate_limit());
                            last_error = Some(e.to_string());
                            outstanding.push(symbol.clone());
                        }
                        Err(_) => {
                            self.health.record_failure(id, false);
                            last_error = Some(self.timeout_error().to_string());
                            outstanding.push(symbol.clone());
                        }
                    }
                }
                remaining = outstanding;
            }
        }

        if quotes.is_empty() && !remaining.is_empty() {
            return Err(MarketDataError::AllProvidersFailed(
                last_error.unwrap_or_else(|| "No candidate could be attempted".to_string()),
            )
            .into());
        }

        for symbol in &remaining {
            failed.push((
                symbol.clone(),
                last_error
                    .clone()
                    .unwrap_or_else(|| "No provider returned this symbol".to_string()),
            ));
        }

        if !quotes.is_empty() {
            let updated: Vec<String> = quotes.keys().cloned().collect();
            self.notify_valuation(&updated, true).await;
        }

        Ok(BulkPriceResponse { quotes, failed })
    }

    async fn check_health(&self, config_id: &str) -> Result<ProviderHealth> {
        if self.configurations.get(config_id).await?.is_none() {
            return Err(MarketDataError::NotFound(config_id.to_string()).into());
        }
        Ok(self.health.get(config_id))
    }

    async fn all_health(&self) -> Result<HashMap<String, ProviderHealth>> {
        let active = self.configurations.list_active().await?;
        Ok(active
            .into_iter()
            .map(|c| {
                let health = self.health.get(&c.id);
                (c.id, health)
            })
            .collect())
    }

    async fn max_bulk_symbols(&self) -> Result<Option<usize>> {
        let active = self.configurations.list_active().await?;
        let mut best: Option<usize> = None;
        for configuration in active {
            if let Some(capabilities) =
                self.configurations.capabilities(&configuration.id).await?
            {
                if capabilities.supports_bulk {
                    best = Some(
                        best.map_or(capabilities.max_symbols_per_request, |b| {
                            b.max(capabilities.max_symbols_per_request)
                        }),
                    );
                }
            }
        }
        Ok(best)
    }

    fn recently_requested_symbols(&self) -> Vec<String> {
        let cutoff = Utc::now() - ChronoDuration::seconds(RECENT_REQUEST_WINDOW_SECS);
        self.recent_requests.retain(|_, seen| *seen >= cutoff);
        self.recent_requests
            .iter()
            .map(|e| e.key().clone())
            .collect()
    }
}
