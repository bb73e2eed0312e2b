use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}
