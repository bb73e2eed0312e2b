use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity attached to an activity record
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEventType {
    HealthStatusChanged,
    HealthCheckError,
    ProviderFailureAlert,
    ProviderRecoveryAlert,
    ProviderPerformanceAlert,
    ScheduledFetchCompleted,
    SchedulerStateChanged,
    PortfolioRecalculated,
    AdapterReleased,
    ConfigurationDeactivated,
}

impl ActivityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityEventType::HealthStatusChanged => "health_status_changed",
            ActivityEventType::HealthCheckError => "health_check_error",
            ActivityEventType::ProviderFailureAlert => "provider_failure_alert",
            ActivityEventType::ProviderRecoveryAlert => "provider_recovery_alert",
            ActivityEventType::ProviderPerformanceAlert => "provider_performance_alert",
            ActivityEventType::ScheduledFetchCompleted => "scheduled_fetch_completed",
            ActivityEventType::SchedulerStateChanged => "scheduler_state_changed",
            ActivityEventType::PortfolioRecalculated => "portfolio_recalculated",
            ActivityEventType::AdapterReleased => "adapter_released",
            ActivityEventType::ConfigurationDeactivated => "configuration_deactivated",
        }
    }
}

/// Structured record handed to the external activity/alert sink
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub provider_id: Option<String>,
    pub event_type: ActivityEventType,
    pub severity: Severity,
    pub description: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        event_type: ActivityEventType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        ActivityRecord {
            id: Uuid::new_v4().to_string(),
            provider_id: None,
            event_type,
            severity,
            description: description.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
