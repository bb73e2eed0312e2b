pub(crate) mod portfolio_errors;
pub(crate) mod portfolio_model;
pub(crate) mod portfolio_traits;
pub(crate) mod valuation_service;

#[cfg(test)]
pub(crate) mod tests;

// Re-export the public interface
pub use portfolio_errors::PortfolioError;
pub use portfolio_model::{
    Holding, Portfolio, PortfolioValuation, RecalculationSummary, RecalculationTrigger,
};
pub use portfolio_traits::{HoldingsRepositoryTrait, ValuationServiceTrait};
pub use valuation_service::ValuationService;
