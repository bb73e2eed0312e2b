use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

use crate::market_data::market_data_constants::PROVIDER_TYPE_SPARK_FEED;
use crate::market_data::market_data_errors::MarketDataError;
use crate::market_data::market_data_model::Quote;
use crate::market_data::providers::market_data_provider::{HealthProbe, MarketDataProvider};
use crate::market_data::providers::models::{ProviderCapabilities, SettingKind, SettingSpec};

const DEFAULT_BASE_URL: &str = "https://api.sparkfeed.io";
const MAX_SYMBOLS_PER_REQUEST: usize = 50;

/// HTTP JSON adapter for the SparkFeed quote API.
#[derive(Debug)]
pub struct SparkFeedProvider {
    client: Client,
    config_id: String,
    base_url: String,
    api_key: String,
}

impl SparkFeedProvider {
    pub fn capabilities() -> ProviderCapabilities {
        ProviderCapabilities::bulk(MAX_SYMBOLS_PER_REQUEST, 120).with_historical()
    }

    pub fn settings_schema() -> Vec<SettingSpec> {
        vec![
            SettingSpec::required("api_key", SettingKind::Secret),
            SettingSpec::optional("base_url", SettingKind::Text),
        ]
    }

    pub fn from_settings(
        config_id: &str,
        settings: &serde_json::Value,
    ) -> Result<Self, MarketDataError> {
        let api_key = settings
            .get("api_key")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MarketDataError::AuthenticationFailed("api_key is not configured".to_string())
            })?;
        let base_url = settings
            .get("base_url")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(SparkFeedProvider {
            client: Client::new(),
            config_id: config_id.to_string(),
            base_url,
            api_key: api_key.to_string(),
        })
    }

    async fn fetch_quotes_payload(
        &self,
        symbols: &[String],
    ) -> Result<QuotesResponse, MarketDataError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/quotes", self.base_url),
            &[
                ("symbols", symbols.join(",").as_str()),
                ("apikey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| MarketDataError::ProviderError(format!("Failed to build URL: {}", e)))?;

        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(MarketDataError::AuthenticationFailed(
                    "SparkFeed rejected the API key".to_string(),
                ));
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(MarketDataError::RateLimitExceeded),
            status if !status.is_success() => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(MarketDataError::ProviderError(format!(
                    "SparkFeed API error ({}): {}",
                    status, body
                )));
            }
            _ => {}
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| MarketDataError::ParsingError(format!("SparkFeed quotes payload: {}", e)))
    }

    fn to_model_quote(&self, wire: SparkFeedQuote) -> Result<Quote, MarketDataError> {
        let price = parse_decimal("price", &wire.price)?;
        let timestamp = DateTime::<Utc>::from_timestamp(wire.timestamp, 0).ok_or_else(|| {
            MarketDataError::ParsingError(format!(
                "Invalid timestamp {} for symbol {}",
                wire.timestamp, wire.symbol
            ))
        })?;

        Ok(Quote {
            id: Uuid::new_v4().to_string(),
            symbol: wire.symbol,
            price,
            open: parse_optional_decimal("open", wire.open.as_deref())?,
            high: parse_optional_decimal("high", wire.high.as_deref())?,
            low: parse_optional_decimal("low", wire.low.as_deref())?,
            previous_close: parse_optional_decimal(
                "previous_close",
                wire.previous_close.as_deref(),
            )?,
            volume: wire
                .volume
                .as_deref()
                .map(|v| parse_decimal("volume", v))
                .transpose()?
                .unwrap_or(Decimal::ZERO),
            timestamp,
            fetched_at: Utc::now(),
            provider_id: self.config_id.clone(),
        })
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, MarketDataError> {
    raw.parse::<Decimal>()
        .map_err(|e| MarketDataError::ParsingError(format!("Field '{}' = '{}': {}", field, raw, e)))
}

fn parse_optional_decimal(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<Decimal>, MarketDataError> {
    raw.map(|r| parse_decimal(field, r)).transpose()
}

#[derive(Debug, Deserialize)]
struct SparkFeedQuote {
    symbol: String,
    price: String,
    open: Option<String>,
    high: Option<String>,
    low: Option<String>,
    #[serde(rename = "prevClose")]
    previous_close: Option<String>,
    volume: Option<String>,
    #[serde(rename = "ts")]
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    quotes: Vec<SparkFeedQuote>,
    #[serde(default)]
    errors: Vec<QuoteError>,
}

#[derive(Debug, Deserialize)]
struct QuoteError {
    symbol: String,
    message: String,
}

#[async_trait]
impl MarketDataProvider for SparkFeedProvider {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE_SPARK_FEED
    }

    async fn connect(&self) -> Result<(), MarketDataError> {
        // A status round-trip validates reachability and the API key before
        // the adapter is handed out of the cache.
        self.check_health().await.map(|_| ())
    }

    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let payload = self
            .fetch_quotes_payload(std::slice::from_ref(&symbol.to_string()))
            .await?;

        let wire = payload
            .quotes
            .into_iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))?;
        self.to_model_quote(wire)
    }

    async fn get_latest_quotes(
        &self,
        symbols: &[String],
    ) -> Result<(Vec<Quote>, Vec<(String, String)>), MarketDataError> {
        let mut quotes = Vec::new();
        let mut failed: Vec<(String, String)> = Vec::new();

        for chunk in symbols.chunks(MAX_SYMBOLS_PER_REQUEST) {
            let payload = self.fetch_quotes_payload(chunk).await?;

            for error in payload.errors {
                failed.push((error.symbol, error.message));
            }
            let mut returned: Vec<String> = Vec::with_capacity(payload.quotes.len());
            for wire in payload.quotes {
                returned.push(wire.symbol.clone());
                match self.to_model_quote(wire) {
                    Ok(quote) => quotes.push(quote),
                    Err(e) => log::warn!("Discarding malformed SparkFeed quote: {}", e),
                }
            }
            for symbol in chunk {
                let seen = returned.iter().any(|s| s.eq_ignore_ascii_case(symbol))
                    || failed.iter().any(|(s, _)| s.eq_ignore_ascii_case(symbol));
                if !seen {
                    failed.push((symbol.clone(), "Symbol not returned by provider".to_string()));
                }
            }
        }

        Ok((quotes, failed))
    }

    async fn check_health(&self) -> Result<HealthProbe, MarketDataError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/status", self.base_url),
            &[("apikey", self.api_key.as_str())],
        )
        .map_err(|e| MarketDataError::ProviderError(format!("Failed to build URL: {}", e)))?;

        let started = Instant::now();
        let response = self.client.get(url).send().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                MarketDataError::AuthenticationFailed("SparkFeed rejected the API key".to_string()),
            ),
            StatusCode::TOO_MANY_REQUESTS => Err(MarketDataError::RateLimitExceeded),
            status if status.is_success() => Ok(HealthProbe {
                latency_ms,
                detail: None,
            }),
            status => Err(MarketDataError::ProviderError(format!(
                "SparkFeed status endpoint returned {}",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_settings_requires_api_key() {
        let err = SparkFeedProvider::from_settings("cfg-1", &json!({})).unwrap_err();
        assert!(matches!(err, MarketDataError::AuthenticationFailed(_)));

        let err = SparkFeedProvider::from_settings("cfg-1", &json!({"api_key": ""})).unwrap_err();
        assert!(matches!(err, MarketDataError::AuthenticationFailed(_)));
    }

    #[test]
    fn from_settings_trims_base_url() {
        let provider = SparkFeedProvider::from_settings(
            "cfg-1",
            &json!({"api_key": "k", "base_url": "https://mirror.example.com/"}),
        )
        .unwrap();
        assert_eq!(provider.base_url, "https://mirror.example.com");
    }

    #[test]
    fn wire_quote_converts_to_model() {
        let provider =
            SparkFeedProvider::from_settings("cfg-1", &json!({"api_key": "k"})).unwrap();
        let wire = SparkFeedQuote {
            symbol: "AAPL".to_string(),
            price: "195.50".to_string(),
            open: Some("193.00".to_string()),
            high: None,
            low: None,
            previous_close: Some("192.75".to_string()),
            volume: Some("1200".to_string()),
            timestamp: 1_700_000_000,
        };
        let quote = provider.to_model_quote(wire).unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price.to_string(), "195.50");
        assert_eq!(quote.open.unwrap().to_string(), "193.00");
        assert_eq!(quote.provider_id, "cfg-1");
    }

    #[test]
    fn malformed_price_is_a_parsing_error() {
        let provider =
            SparkFeedProvider::from_settings("cfg-1", &json!({"api_key": "k"})).unwrap();
        let wire = SparkFeedQuote {
            symbol: "AAPL".to_string(),
            price: "not-a-number".to_string(),
            open: None,
            high: None,
            low: None,
            previous_close: None,
            volume: None,
            timestamp: 1_700_000_000,
        };
        let err = provider.to_model_quote(wire).unwrap_err();
        assert!(matches!(err, MarketDataError::ParsingError(_)));
    }
}
