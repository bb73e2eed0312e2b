use thiserror::Error;

use crate::configuration::ConfigurationError;
use crate::market_data::{MarketDataError, RegistryError};
use crate::portfolio::PortfolioError;
use crate::scheduler::SchedulerError;

// Create a type alias for Result using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the price feed core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Provider registry operation failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration operation failed: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Scheduler operation failed: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Portfolio operation failed: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error("Repository operation failed: {0}")]
    Repository(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Unexpected(err.to_string())
    }
}
