use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, error, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::portfolio_model::{
    Portfolio, PortfolioValuation, RecalculationSummary, RecalculationTrigger,
};
use super::portfolio_traits::{HoldingsRepositoryTrait, ValuationServiceTrait};
use crate::errors::Result;
use crate::events::{record_best_effort, ActivityEventType, ActivityRecord, ActivitySinkTrait, Severity};
use crate::market_data::market_data_model::Quote;
use crate::market_data::market_data_traits::QuoteRepositoryTrait;

/// Recomputes derived portfolio figures whenever fresh prices land. The
/// bulk entry point exists specifically so a batch of symbol updates
/// touches each affected portfolio exactly once.
pub struct ValuationService {
    holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
    quote_repository: Arc<dyn QuoteRepositoryTrait>,
    activity_sink: Arc<dyn ActivitySinkTrait>,
    /// Serializes overlapping recalculations of the same portfolio
    portfolio_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ValuationService {
    pub fn new(
        holdings_repository: Arc<dyn HoldingsRepositoryTrait>,
        quote_repository: Arc<dyn QuoteRepositoryTrait>,
        activity_sink: Arc<dyn ActivitySinkTrait>,
    ) -> Self {
        ValuationService {
            holdings_repository,
            quote_repository,
            activity_sink,
            portfolio_locks: DashMap::new(),
        }
    }

    async fn recalculate(
        &self,
        symbols: &[String],
        trigger: RecalculationTrigger,
    ) -> Result<RecalculationSummary> {
        let started = Instant::now();

        let mut updated_symbols: Vec<String> = Vec::new();
        for raw in symbols {
            let symbol = raw.trim().to_uppercase();
            if !symbol.is_empty() && !updated_symbols.contains(&symbol) {
                updated_symbols.push(symbol);
            }
        }

        let mut portfolios_updated = 0usize;
        let mut portfolios_failed = 0usize;

        if !updated_symbols.is_empty() {
            let portfolios = self
                .holdings_repository
                .portfolios_holding_symbols(&updated_symbols)
                .await?;

            // Each affected portfolio is recomputed once, regardless of how
            // many of its symbols changed in this batch.
            let mut seen: Vec<String> = Vec::with_capacity(portfolios.len());
            for portfolio in portfolios {
                if seen.contains(&portfolio.id) {
                    continue;
                }
                seen.push(portfolio.id.clone());

                match self.recalculate_portfolio(&portfolio).await {
                    Ok(()) => portfolios_updated += 1,
                    Err(e) => {
                        error!(
                            "Failed to recalculate portfolio '{}': {}",
                            portfolio.id, e
                        );
                        portfolios_failed += 1;
                    }
                }
            }
        }

        let summary = RecalculationSummary {
            coalesced_count: updated_symbols.len(),
            symbols: updated_symbols,
            portfolios_updated,
            portfolios_failed,
            duration_ms: started.elapsed().as_millis() as u64,
            trigger,
        };
        self.record_metrics(&summary).await;
        Ok(summary)
    }

    async fn recalculate_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        let lock = self
            .portfolio_locks
            .entry(portfolio.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let held_symbols: Vec<String> = portfolio
            .holdings
            .iter()
            .filter(|h| h.quantity > Decimal::ZERO)
            .map(|h| h.symbol.clone())
            .collect();

        let current_quotes: HashMap<String, Quote> = self
            .quote_repository
            .get_current_quotes(&held_symbols)
            .await?;

        let mut total_value = Decimal::ZERO;
        let mut daily_change = Decimal::ZERO;
        let mut cost_basis = Decimal::ZERO;

        for holding in &portfolio.holdings {
            if holding.quantity <= Decimal::ZERO {
                continue;
            }
            cost_basis += holding.quantity * holding.average_cost;

            match current_quotes.get(&holding.symbol) {
                Some(quote) => {
                    total_value += holding.quantity * quote.price;
                    // A missing opening price contributes zero day change,
                    // never a computation error.
                    if let Some(open) = quote.open {
                        daily_change += holding.quantity * (quote.price - open);
                    }
                }
                None => {
                    warn!(
                        "No current price for '{}' held by portfolio '{}'; it contributes nothing to the valuation",
                        holding.symbol, portfolio.id
                    );
                }
            }
        }

        let opening_value = total_value - daily_change;
        let daily_change_percent = if opening_value > Decimal::ZERO {
            (daily_change / opening_value * dec!(100)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let unrealized_gain = total_value - cost_basis;
        let unrealized_gain_percent = if cost_basis > Decimal::ZERO {
            (unrealized_gain / cost_basis * dec!(100)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let valuation = PortfolioValuation {
            portfolio_id: portfolio.id.clone(),
            total_value,
            daily_change,
            daily_change_percent,
            unrealized_gain,
            unrealized_gain_percent,
            updated_at: Utc::now(),
        };
        self.holdings_repository.save_valuation(&valuation).await?;

        debug!(
            "Recalculated portfolio '{}': total {}, day change {} ({}%)",
            portfolio.id, total_value, daily_change, daily_change_percent
        );
        Ok(())
    }

    /// Metrics are best-effort: a sink failure never fails the
    /// recalculation that produced them.
    async fn record_metrics(&self, summary: &RecalculationSummary) {
        record_best_effort(
            self.activity_sink.as_ref(),
            ActivityRecord::new(
                ActivityEventType::PortfolioRecalculated,
                if summary.portfolios_failed > 0 {
                    Severity::Warning
                } else {
                    Severity::Info
                },
                format!(
                    "Recalculated {} portfolio(s) for {} symbol(s)",
                    summary.portfolios_updated, summary.coalesced_count
                ),
            )
            .with_metadata(json!({
                "symbols": summary.symbols,
                "portfoliosUpdated": summary.portfolios_updated,
                "portfoliosFailed": summary.portfolios_failed,
                "durationMs": summary.duration_ms,
                "trigger": summary.trigger.as_str(),
                "coalescedCount": summary.coalesced_count,
            })),
        )
        .await;
    }
}

#[async_trait]
impl ValuationServiceTrait for ValuationService {
    async fn on_symbol_updated(&self, symbol: &str) -> Result<RecalculationSummary> {
        self.recalculate(
            std::slice::from_ref(&symbol.to_string()),
            RecalculationTrigger::SingleSymbol,
        )
        .await
    }

    async fn on_symbols_updated(&self, symbols: &[String]) -> Result<RecalculationSummary> {
        self.recalculate(symbols, RecalculationTrigger::BulkUpdate).await
    }
}
