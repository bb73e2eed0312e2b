use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One position inside a portfolio. Holdings with quantity reduced to zero
/// are removed by the owning repository, never returned as zero rows.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub portfolio_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

/// A portfolio with its holdings, as loaded from the holdings repository.
/// The derived valuation fields live in `PortfolioValuation`; they are
/// computed, never hand-edited.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: String,
    pub name: String,
    pub holdings: Vec<Holding>,
}

/// Derived portfolio figures persisted after each recalculation. The save
/// is atomic with the refreshed timestamp by repository contract.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioValuation {
    pub portfolio_id: String,
    pub total_value: Decimal,
    pub daily_change: Decimal,
    pub daily_change_percent: Decimal,
    pub unrealized_gain: Decimal,
    pub unrealized_gain_percent: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecalculationTrigger {
    SingleSymbol,
    BulkUpdate,
}

impl RecalculationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecalculationTrigger::SingleSymbol => "single_symbol",
            RecalculationTrigger::BulkUpdate => "bulk_update",
        }
    }
}

/// Observability summary of one recalculation invocation
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationSummary {
    pub symbols: Vec<String>,
    pub portfolios_updated: usize,
    pub portfolios_failed: usize,
    pub duration_ms: u64,
    pub trigger: RecalculationTrigger,
    /// Number of symbols coalesced into this single pass
    pub coalesced_count: usize,
}
