use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketDataError>;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("No active providers available")]
    NoActiveProviders,

    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),
}

impl MarketDataError {
    /// True when the provider explicitly signalled throttling.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, MarketDataError::RateLimitExceeded)
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(String),

    #[error("Provider '{0}' is not registered")]
    ProviderNotFound(String),

    #[error("Failed to construct adapter for '{name}': {message}")]
    ConstructionFailed { name: String, message: String },
}
