pub(crate) mod configuration_errors;
pub(crate) mod configuration_model;
pub(crate) mod configuration_service;
pub(crate) mod configuration_traits;

#[cfg(test)]
pub(crate) mod tests;

// Re-export the public interface
pub use configuration_errors::{ConfigurationError, FieldError};
pub use configuration_model::{
    NewProviderConfiguration, ProviderConfiguration, ProviderConfigurationUpdate,
};
pub use configuration_service::ConfigurationService;
pub use configuration_traits::{ConfigurationRepositoryTrait, ConfigurationServiceTrait};
