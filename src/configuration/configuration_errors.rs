use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One invalid settings field. Validation reports every offending field,
/// not just the first.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Configuration not found: {0}")]
    NotFound(String),

    #[error("Adapter construction failed: {0}")]
    AdapterConstruction(String),

    #[error("Repository error: {0}")]
    Repository(String),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
