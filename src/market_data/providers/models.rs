use serde::{Deserialize, Serialize};

/// Capabilities declared once per provider type at registration time.
/// Immutable; the routing layer reads them to pick bulk-vs-single strategy
/// and the scheduler to cap its batch size.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub supports_real_time: bool,
    pub supports_historical: bool,
    pub supports_bulk: bool,
    pub max_symbols_per_request: usize,
    pub requests_per_minute: u32,
}

impl ProviderCapabilities {
    pub fn single_symbol(requests_per_minute: u32) -> Self {
        ProviderCapabilities {
            supports_real_time: true,
            supports_historical: false,
            supports_bulk: false,
            max_symbols_per_request: 1,
            requests_per_minute,
        }
    }

    pub fn bulk(max_symbols_per_request: usize, requests_per_minute: u32) -> Self {
        ProviderCapabilities {
            supports_real_time: true,
            supports_historical: false,
            supports_bulk: true,
            max_symbols_per_request,
            requests_per_minute,
        }
    }

    pub fn with_historical(mut self) -> Self {
        self.supports_historical = true;
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SettingKind {
    Text,
    Secret,
    Number,
    Boolean,
    Object,
}

/// One entry of a provider type's declared settings schema. Configuration
/// validation checks stored settings against these before constructing an
/// adapter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingSpec {
    pub key: &'static str,
    pub required: bool,
    pub kind: SettingKind,
}

impl SettingSpec {
    pub const fn required(key: &'static str, kind: SettingKind) -> Self {
        SettingSpec {
            key,
            required: true,
            kind,
        }
    }

    pub const fn optional(key: &'static str, kind: SettingKind) -> Self {
        SettingSpec {
            key,
            required: false,
            kind,
        }
    }
}
