use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single price snapshot for one symbol, as fetched from one provider.
///
/// Snapshots are appended to an immutable per-symbol history; the latest one
/// is additionally upserted as the symbol's "current" record, which is the
/// only record valuation ever consults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub symbol: String,
    pub price: Decimal,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub volume: Decimal,
    /// Timestamp reported by the provider for the quoted price
    pub timestamp: DateTime<Utc>,
    /// When this process fetched the quote
    pub fetched_at: DateTime<Utc>,
    /// Configuration id of the provider that produced this quote
    pub provider_id: String,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: Decimal, provider_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Quote {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            price,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            volume: Decimal::ZERO,
            timestamp: now,
            fetched_at: now,
            provider_id: provider_id.into(),
        }
    }
}

/// Routing order used when ranking candidate providers
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RoutingStrategy {
    /// Ascending configured priority (lower number wins)
    Priority,
    /// `success_rate - latency_ms / 1000`, descending
    Performance,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        RoutingStrategy::Priority
    }
}

/// Per-symbol outcome of a multi-symbol fetch
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BulkPriceResponse {
    pub quotes: HashMap<String, Quote>,
    /// Symbols that could not be fetched, with the last error message seen
    pub failed: Vec<(String, String)>,
}

impl BulkPriceResponse {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
