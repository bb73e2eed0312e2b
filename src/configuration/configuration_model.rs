use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One persisted provider configuration. Secrets inside `settings` are
/// stored encrypted at the persistence boundary and decrypted on read.
/// Deactivation is a soft flag so historical metrics keep their referent.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfiguration {
    pub id: String,
    /// Provider type name as registered in the capability registry
    pub provider_type: String,
    pub name: String,
    pub settings: Value,
    /// Ascending priority: lower number is tried first
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input model for creating a configuration
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewProviderConfiguration {
    pub provider_type: String,
    pub name: String,
    pub settings: Value,
    pub priority: i32,
}

impl NewProviderConfiguration {
    pub fn into_configuration(self) -> ProviderConfiguration {
        let now = Utc::now();
        ProviderConfiguration {
            id: Uuid::new_v4().to_string(),
            provider_type: self.provider_type,
            name: self.name,
            settings: self.settings,
            priority: self.priority,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input model for updating a configuration. `settings` is merged per key
/// into the existing settings object rather than replacing it.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigurationUpdate {
    pub name: Option<String>,
    pub settings: Option<Value>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}
