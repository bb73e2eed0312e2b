use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};

use super::health_model::{
    derive_status, ProbeOutcome, ProviderHealth, StatusTransition, HEALTH_HISTORY_CAPACITY,
};
use crate::market_data::market_data_constants::SUCCESS_RATE_STEP;

/// Shared in-memory health state per configured provider. Written by the
/// routing layer (per-attempt feedback) and by the health-check loop
/// (probe outcomes); read by routing for candidate selection.
pub struct HealthTracker {
    records: DashMap<String, ProviderHealth>,
    history: DashMap<String, VecDeque<ProbeOutcome>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        HealthTracker {
            records: DashMap::new(),
            history: DashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> ProviderHealth {
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn all(&self) -> HashMap<String, ProviderHealth> {
        self.records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Positive routing feedback from a served request.
    pub fn record_success(&self, id: &str, latency_ms: u64) {
        let mut record = self.records.entry(id.to_string()).or_default();
        record.success_rate = (record.success_rate + SUCCESS_RATE_STEP).min(1.0);
        record.avg_latency_ms = smooth_latency(record.avg_latency_ms, latency_ms);
        record.consecutive_errors = 0;
        record.status = derive_status(record.success_rate, 0, false);
    }

    /// Negative routing feedback from a failed attempt.
    pub fn record_failure(&self, id: &str, rate_limited: bool) {
        let mut record = self.records.entry(id.to_string()).or_default();
        record.success_rate = (record.success_rate - SUCCESS_RATE_STEP).max(0.0);
        record.consecutive_errors = record.consecutive_errors.saturating_add(1);
        record.status = derive_status(
            record.success_rate,
            record.consecutive_errors,
            rate_limited,
        );
    }

    /// Apply one health-check probe: update the record, append to the
    /// bounded rolling history, and report the status transition.
    pub fn apply_probe(
        &self,
        id: &str,
        success: bool,
        latency_ms: u64,
        rate_limited: bool,
        detail: Option<String>,
    ) -> StatusTransition {
        let now = Utc::now();

        let (previous, current) = {
            let mut record = self.records.entry(id.to_string()).or_default();
            let previous = record.status;

            if success {
                record.success_rate = (record.success_rate + SUCCESS_RATE_STEP).min(1.0);
                record.consecutive_errors = 0;
            } else {
                record.success_rate = (record.success_rate - SUCCESS_RATE_STEP).max(0.0);
                record.consecutive_errors = record.consecutive_errors.saturating_add(1);
            }
            record.avg_latency_ms = smooth_latency(record.avg_latency_ms, latency_ms);
            record.last_checked = Some(now);
            record.status = derive_status(
                record.success_rate,
                record.consecutive_errors,
                rate_limited,
            );
            (previous, record.status)
        };

        let history = {
            let mut entries = self.history.entry(id.to_string()).or_default();
            entries.push_back(ProbeOutcome {
                checked_at: now,
                success,
                latency_ms,
                status: current,
                detail,
            });
            while entries.len() > HEALTH_HISTORY_CAPACITY {
                entries.pop_front();
            }
            entries.iter().cloned().collect()
        };

        StatusTransition {
            previous,
            current,
            history,
        }
    }

    pub fn history(&self, id: &str) -> Vec<ProbeOutcome> {
        self.history
            .get(id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn smooth_latency(current_avg: f64, observed_ms: u64) -> f64 {
    if current_avg == 0.0 {
        observed_ms as f64
    } else {
        (current_avg + observed_ms as f64) / 2.0
    }
}
