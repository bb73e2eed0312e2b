use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling probe history capacity per adapter id (oldest evicted)
pub const HEALTH_HISTORY_CAPACITY: usize = 10;

/// Below this smoothed success rate a provider is considered degraded
pub const DEGRADED_SUCCESS_RATE: f64 = 0.8;

/// Consecutive errors before a provider is marked unhealthy
pub const UNHEALTHY_CONSECUTIVE_ERRORS: u32 = 3;

/// Consecutive errors before the circuit opens
pub const CIRCUIT_OPEN_CONSECUTIVE_ERRORS: u32 = 5;

/// Failing probes in a row that raise one failure alert
pub const FAILURE_ALERT_STREAK: usize = 3;

/// Healthy probes in a row, after a failing run, that raise one recovery alert
pub const RECOVERY_ALERT_STREAK: usize = 2;

/// Average latency above which a performance alert is raised
pub const LATENCY_ALERT_CEILING_MS: f64 = 5_000.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    CircuitOpen,
    RateLimited,
}

impl HealthStatus {
    /// Whether the routing layer may send live traffic to this provider.
    /// Unhealthy and circuit-open providers are still probed by the health
    /// loop, just not routed to.
    pub fn is_routable(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy | HealthStatus::CircuitOpen)
    }

    pub fn is_failing(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy | HealthStatus::CircuitOpen)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::CircuitOpen => "circuit_open",
            HealthStatus::RateLimited => "rate_limited",
        }
    }
}

/// Point-in-time health of one configured provider. An approximate signal:
/// concurrent writers follow last-writer-wins, but a record is never
/// partially visible.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub last_checked: Option<DateTime<Utc>>,
    /// Exponentially nudged success rate, clamped to [0, 1]
    pub success_rate: f64,
    /// Two-point moving average of observed latency
    pub avg_latency_ms: f64,
    pub consecutive_errors: u32,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        ProviderHealth {
            status: HealthStatus::Healthy,
            last_checked: None,
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            consecutive_errors: 0,
        }
    }
}

/// Derive a status from the measured signals. An explicit rate-limit signal
/// from the adapter overrides the measured thresholds.
pub(crate) fn derive_status(
    success_rate: f64,
    consecutive_errors: u32,
    rate_limited: bool,
) -> HealthStatus {
    if rate_limited {
        HealthStatus::RateLimited
    } else if consecutive_errors >= CIRCUIT_OPEN_CONSECUTIVE_ERRORS {
        HealthStatus::CircuitOpen
    } else if consecutive_errors >= UNHEALTHY_CONSECUTIVE_ERRORS {
        HealthStatus::Unhealthy
    } else if success_rate < DEGRADED_SUCCESS_RATE {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// One entry of the bounded rolling probe history
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: u64,
    /// Status recorded after applying this probe
    pub status: HealthStatus,
    pub detail: Option<String>,
}

/// Result of applying one probe: the status before and after, plus a
/// snapshot of the rolling history used for alert evaluation.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub history: Vec<ProbeOutcome>,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
