use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::market_data::market_data_constants::PROVIDER_TYPE_MANUAL;
use crate::market_data::market_data_errors::MarketDataError;
use crate::market_data::market_data_model::Quote;
use crate::market_data::providers::market_data_provider::{HealthProbe, MarketDataProvider};
use crate::market_data::providers::models::{ProviderCapabilities, SettingKind, SettingSpec};

/// Adapter serving quotes embedded in its own configuration settings.
/// No network access; useful for offline deployments and as the
/// deterministic provider in tests.
#[derive(Debug)]
pub struct ManualProvider {
    config_id: String,
    quotes: HashMap<String, ManualQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManualQuote {
    symbol: String,
    price: Decimal,
    #[serde(default)]
    open: Option<Decimal>,
    #[serde(default)]
    high: Option<Decimal>,
    #[serde(default)]
    low: Option<Decimal>,
    #[serde(default)]
    previous_close: Option<Decimal>,
    #[serde(default)]
    volume: Option<Decimal>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl ManualProvider {
    pub fn capabilities() -> ProviderCapabilities {
        ProviderCapabilities::bulk(100, 6000)
    }

    pub fn settings_schema() -> Vec<SettingSpec> {
        vec![SettingSpec::required("quotes", SettingKind::Object)]
    }

    pub fn from_settings(
        config_id: &str,
        settings: &serde_json::Value,
    ) -> Result<Self, MarketDataError> {
        let raw = settings
            .get("quotes")
            .ok_or_else(|| MarketDataError::ProviderError("No quotes configured".to_string()))?;
        let entries: Vec<ManualQuote> = serde_json::from_value(raw.clone())
            .map_err(|e| MarketDataError::ParsingError(format!("Manual quote list: {}", e)))?;

        let quotes = entries
            .into_iter()
            .map(|q| (q.symbol.to_uppercase(), q))
            .collect();

        Ok(ManualProvider {
            config_id: config_id.to_string(),
            quotes,
        })
    }

    fn to_model_quote(&self, manual: &ManualQuote) -> Quote {
        Quote {
            id: Uuid::new_v4().to_string(),
            symbol: manual.symbol.clone(),
            price: manual.price,
            open: manual.open,
            high: manual.high,
            low: manual.low,
            previous_close: manual.previous_close,
            volume: manual.volume.unwrap_or(Decimal::ZERO),
            timestamp: manual.timestamp.unwrap_or_else(Utc::now),
            fetched_at: Utc::now(),
            provider_id: self.config_id.clone(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for ManualProvider {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE_MANUAL
    }

    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        self.quotes
            .get(&symbol.to_uppercase())
            .map(|q| self.to_model_quote(q))
            .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))
    }

    async fn get_latest_quotes(
        &self,
        symbols: &[String],
    ) -> Result<(Vec<Quote>, Vec<(String, String)>), MarketDataError> {
        let mut quotes = Vec::new();
        let mut failed = Vec::new();
        for symbol in symbols {
            match self.quotes.get(&symbol.to_uppercase()) {
                Some(q) => quotes.push(self.to_model_quote(q)),
                None => failed.push((symbol.clone(), "No manual quote configured".to_string())),
            }
        }
        Ok((quotes, failed))
    }

    async fn check_health(&self) -> Result<HealthProbe, MarketDataError> {
        Ok(HealthProbe {
            latency_ms: 0,
            detail: Some(format!("{} manual quotes loaded", self.quotes.len())),
        })
    }
}
