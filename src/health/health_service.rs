use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::health_model::{
    HealthStatus, StatusTransition, DEGRADED_SUCCESS_RATE, FAILURE_ALERT_STREAK,
    LATENCY_ALERT_CEILING_MS, RECOVERY_ALERT_STREAK,
};
use super::health_tracker::HealthTracker;
use crate::configuration::{ConfigurationServiceTrait, ProviderConfiguration};
use crate::events::{record_best_effort, ActivityEventType, ActivityRecord, ActivitySinkTrait, Severity};

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub check_interval: Duration,
    pub probe_timeout: Duration,
    pub max_concurrent_probes: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            max_concurrent_probes: 8,
        }
    }
}

/// Everything one probe cycle needs; shared between the service handle and
/// the spawned loop task.
struct HealthCheckWorker {
    configurations: Arc<dyn ConfigurationServiceTrait>,
    tracker: Arc<HealthTracker>,
    activity_sink: Arc<dyn ActivitySinkTrait>,
    config: HealthCheckConfig,
    /// Edge-trigger state for the performance alert, per configuration id
    perf_alerted: DashMap<String, bool>,
}

/// Background probe loop, independent of request traffic. Probes every
/// active configuration on a fixed interval, maintains the rolling health
/// history, and raises alerts on sustained failure, recovery, and
/// performance degradation.
pub struct HealthCheckService {
    worker: Arc<HealthCheckWorker>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthCheckService {
    pub fn new(
        configurations: Arc<dyn ConfigurationServiceTrait>,
        tracker: Arc<HealthTracker>,
        activity_sink: Arc<dyn ActivitySinkTrait>,
        config: HealthCheckConfig,
    ) -> Self {
        HealthCheckService {
            worker: Arc::new(HealthCheckWorker {
                configurations,
                tracker,
                activity_sink,
                config,
                perf_alerted: DashMap::new(),
            }),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the probe loop. A no-op if the loop is already running.
    pub fn start(&self) {
        let mut guard = self.shutdown_tx.lock().unwrap();
        if guard.is_some() {
            warn!("Health check loop is already running");
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *guard = Some(tx);
        drop(guard);

        let worker = self.worker.clone();
        let handle = tokio::spawn(async move {
            info!(
                "Health check loop started (interval {:?})",
                worker.config.check_interval
            );
            loop {
                worker.run_check_cycle().await;
                tokio::select! {
                    _ = tokio::time::sleep(worker.config.check_interval) => {}
                    _ = rx.changed() => {}
                }
                if *rx.borrow() {
                    break;
                }
            }
            info!("Health check loop exited");
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Signal the loop to stop and wait until it has fully exited. No probe
    /// iteration survives this call.
    pub async fn stop(&self) {
        let tx = self.shutdown_tx.lock().unwrap().take();
        let Some(tx) = tx else {
            return;
        };
        let _ = tx.send(true);

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Health check loop task failed: {}", e);
            }
        }
    }

    /// One full probe pass over every active configuration. Public so the
    /// loop cadence and the probe logic can be exercised independently.
    pub async fn run_check_cycle(&self) {
        self.worker.run_check_cycle().await;
    }
}

impl HealthCheckWorker {
    async fn run_check_cycle(&self) {
        let configurations = match self.configurations.list_active().await {
            Ok(c) => c,
            Err(e) => {
                error!("Health check cycle could not list configurations: {}", e);
                return;
            }
        };

        stream::iter(configurations)
            .for_each_concurrent(self.config.max_concurrent_probes, |configuration| async move {
                self.probe_configuration(&configuration).await;
            })
            .await;
    }

    async fn probe_configuration(&self, configuration: &ProviderConfiguration) {
        let adapter = match self.configurations.get_adapter(&configuration.id).await {
            Ok(Some(adapter)) => adapter,
            Ok(None) => return,
            Err(e) => {
                warn!(
                    "Health check could not obtain adapter for '{}': {}",
                    configuration.id, e
                );
                record_best_effort(
                    self.activity_sink.as_ref(),
                    ActivityRecord::new(
                        ActivityEventType::HealthCheckError,
                        Severity::Warning,
                        format!("Health check failed to obtain adapter: {}", e),
                    )
                    .with_provider(&configuration.id),
                )
                .await;
                return;
            }
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.config.probe_timeout, adapter.check_health()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (success, latency_ms, rate_limited, detail) = match result {
            Ok(Ok(probe)) => {
                let latency = if probe.latency_ms > 0 {
                    probe.latency_ms
                } else {
                    elapsed_ms
                };
                (true, latency, false, probe.detail)
            }
            Ok(Err(e)) => (false, elapsed_ms, e.is_rate_limit(), Some(e.to_string())),
            Err(_) => (
                false,
                self.config.probe_timeout.as_millis() as u64,
                false,
                Some("Probe timed out".to_string()),
            ),
        };

        let transition =
            self.tracker
                .apply_probe(&configuration.id, success, latency_ms, rate_limited, detail);

        if transition.changed() {
            let severity = if transition.current.is_failing() {
                Severity::Warning
            } else {
                Severity::Info
            };
            record_best_effort(
                self.activity_sink.as_ref(),
                ActivityRecord::new(
                    ActivityEventType::HealthStatusChanged,
                    severity,
                    format!(
                        "Provider '{}' health changed: {} -> {}",
                        configuration.name,
                        transition.previous.as_str(),
                        transition.current.as_str()
                    ),
                )
                .with_provider(&configuration.id),
            )
            .await;
        }

        self.evaluate_alerts(configuration, &transition).await;
    }

    /// The three alert conditions, each evaluated independently from the
    /// rolling history.
    async fn evaluate_alerts(
        &self,
        configuration: &ProviderConfiguration,
        transition: &StatusTransition,
    ) {
        let history = &transition.history;

        let failing_streak = history.iter().rev().take_while(|o| !o.success).count();
        if failing_streak == FAILURE_ALERT_STREAK {
            record_best_effort(
                self.activity_sink.as_ref(),
                ActivityRecord::new(
                    ActivityEventType::ProviderFailureAlert,
                    Severity::Critical,
                    format!(
                        "Provider '{}' failed {} consecutive health checks",
                        configuration.name, failing_streak
                    ),
                )
                .with_provider(&configuration.id),
            )
            .await;
        }

        let healthy_streak = history.iter().rev().take_while(|o| o.success).count();
        if healthy_streak == RECOVERY_ALERT_STREAK && history.len() > healthy_streak {
            let preceding = &history[history.len() - healthy_streak - 1];
            if !preceding.success {
                record_best_effort(
                    self.activity_sink.as_ref(),
                    ActivityRecord::new(
                        ActivityEventType::ProviderRecoveryAlert,
                        Severity::Info,
                        format!(
                            "Provider '{}' recovered after {} consecutive healthy checks",
                            configuration.name, healthy_streak
                        ),
                    )
                    .with_provider(&configuration.id),
                )
                .await;
            }
        }

        let health = self.tracker.get(&configuration.id);
        let breached = matches!(
            health.status,
            HealthStatus::Healthy | HealthStatus::Degraded
        ) && (health.success_rate < DEGRADED_SUCCESS_RATE
            || health.avg_latency_ms > LATENCY_ALERT_CEILING_MS);

        let previously_breached = self
            .perf_alerted
            .insert(configuration.id.clone(), breached)
            .unwrap_or(false);
        if breached && !previously_breached {
            record_best_effort(
                self.activity_sink.as_ref(),
                ActivityRecord::new(
                    ActivityEventType::ProviderPerformanceAlert,
                    Severity::Warning,
                    format!(
                        "Provider '{}' is responding but degraded (success rate {:.2}, avg latency {:.0} ms)",
                        configuration.name, health.success_rate, health.avg_latency_ms
                    ),
                )
                .with_provider(&configuration.id)
                .with_metadata(json!({
                    "successRate": health.success_rate,
                    "avgLatencyMs": health.avg_latency_ms,
                })),
            )
            .await;
        }
    }
}
