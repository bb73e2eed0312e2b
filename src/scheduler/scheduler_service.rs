use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::scheduler_errors::SchedulerError;
use super::scheduler_model::{
    SchedulerAction, SchedulerConfig, SchedulerState, SchedulerStatus, DEFAULT_SAMPLE_SYMBOLS,
    DEFAULT_SYMBOL_CAP,
};
use super::scheduler_traits::ActiveSymbolsTrait;
use crate::errors::Result;
use crate::events::{record_best_effort, ActivityEventType, ActivityRecord, ActivitySinkTrait, Severity};
use crate::market_data::market_data_traits::MarketDataServiceTrait;

#[derive(Debug)]
struct RunState {
    state: SchedulerState,
    paused_until: Option<chrono::DateTime<Utc>>,
    last_run: Option<chrono::DateTime<Utc>>,
    next_run: Option<chrono::DateTime<Utc>>,
}

/// State shared between the control surface and the spawned refresh loop.
struct SchedulerCore {
    market_data: Arc<dyn MarketDataServiceTrait>,
    symbols: Arc<dyn ActiveSymbolsTrait>,
    activity_sink: Arc<dyn ActivitySinkTrait>,
    config: SchedulerConfig,
    run_state: RwLock<RunState>,
}

/// Background poller with an explicit stopped/running/paused state machine.
/// On its own cadence it refreshes prices for the actively monitored symbol
/// set through the routing layer. One process-wide instance.
pub struct SchedulerService {
    core: Arc<SchedulerCore>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerService {
    pub fn new(
        market_data: Arc<dyn MarketDataServiceTrait>,
        symbols: Arc<dyn ActiveSymbolsTrait>,
        activity_sink: Arc<dyn ActivitySinkTrait>,
        config: SchedulerConfig,
    ) -> Self {
        SchedulerService {
            core: Arc::new(SchedulerCore {
                market_data,
                symbols,
                activity_sink,
                config,
                run_state: RwLock::new(RunState {
                    state: SchedulerState::Stopped,
                    paused_until: None,
                    last_run: None,
                    next_run: None,
                }),
            }),
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.core.status()
    }

    /// stopped -> running. Spawns the refresh loop.
    pub async fn start(&self) -> Result<SchedulerStatus> {
        {
            let mut state = self.core.run_state.write().unwrap();
            if state.state != SchedulerState::Stopped {
                return Err(SchedulerError::InvalidTransition {
                    action: SchedulerAction::Start,
                    state: state.state,
                }
                .into());
            }
            state.state = SchedulerState::Running;
            state.paused_until = None;
            state.next_run = Some(Utc::now() + to_chrono(self.core.config.initial_delay));
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown_tx.lock().unwrap() = Some(tx);
        let core = self.core.clone();
        *self.handle.lock().unwrap() = Some(tokio::spawn(async move {
            core.run_loop(rx).await;
        }));

        info!(
            "Scheduler started (interval {:?}, initial delay {:?})",
            self.core.config.interval, self.core.config.initial_delay
        );
        self.core.record_state_change("started").await;
        Ok(self.status())
    }

    /// running|paused -> stopped. Returns only after the loop has fully
    /// exited; no detached iteration survives this call.
    pub async fn stop(&self, reason: Option<&str>) -> Result<SchedulerStatus> {
        {
            let mut state = self.core.run_state.write().unwrap();
            if state.state == SchedulerState::Stopped {
                return Err(SchedulerError::InvalidTransition {
                    action: SchedulerAction::Stop,
                    state: state.state,
                }
                .into());
            }
            state.state = SchedulerState::Stopped;
            state.paused_until = None;
            state.next_run = None;
        }

        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Scheduler loop task failed: {}", e);
            }
        }

        info!(
            "Scheduler stopped{}",
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        );
        self.core.record_state_change(reason.unwrap_or("stopped")).await;
        Ok(self.status())
    }

    /// running -> paused, with an optional auto-resume window.
    pub async fn pause(&self, duration: Option<Duration>) -> Result<SchedulerStatus> {
        {
            let mut state = self.core.run_state.write().unwrap();
            if state.state != SchedulerState::Running {
                return Err(SchedulerError::InvalidTransition {
                    action: SchedulerAction::Pause,
                    state: state.state,
                }
                .into());
            }
            state.state = SchedulerState::Paused;
            state.paused_until = duration.map(|d| Utc::now() + to_chrono(d));
        }
        info!("Scheduler paused{}", match duration {
            Some(d) => format!(" for {:?}", d),
            None => String::new(),
        });
        self.core.record_state_change("paused").await;
        Ok(self.status())
    }

    /// paused -> running.
    pub async fn resume(&self) -> Result<SchedulerStatus> {
        {
            let mut state = self.core.run_state.write().unwrap();
            if state.state != SchedulerState::Paused {
                return Err(SchedulerError::InvalidTransition {
                    action: SchedulerAction::Resume,
                    state: state.state,
                }
                .into());
            }
            state.state = SchedulerState::Running;
            state.paused_until = None;
        }
        info!("Scheduler resumed");
        self.core.record_state_change("resumed").await;
        Ok(self.status())
    }
}

impl SchedulerCore {
    fn status(&self) -> SchedulerStatus {
        let state = self.run_state.read().unwrap();
        SchedulerStatus {
            state: state.state,
            paused_until: state.paused_until,
            last_run: state.last_run,
            next_run: state.next_run,
            interval_secs: self.config.interval.as_secs(),
            use_bulk: self.config.use_bulk,
        }
    }

    async fn run_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Scheduler loop started");
        if interruptible_sleep(&mut shutdown_rx, self.config.initial_delay).await {
            info!("Scheduler loop exited");
            return;
        }
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            // The pause flag is re-checked here, after every wait, so a
            // pause requested mid-wait is observed before the next fetch.
            if self.should_fetch_now() {
                self.run_iteration().await;
                let now = Utc::now();
                let mut state = self.run_state.write().unwrap();
                state.last_run = Some(now);
                state.next_run = Some(now + to_chrono(self.config.interval));
            }
            if interruptible_sleep(&mut shutdown_rx, self.config.interval).await {
                break;
            }
        }
        info!("Scheduler loop exited");
    }

    fn should_fetch_now(&self) -> bool {
        let mut state = self.run_state.write().unwrap();
        match state.state {
            SchedulerState::Running => true,
            SchedulerState::Stopped => false,
            SchedulerState::Paused => {
                if let Some(until) = state.paused_until {
                    if Utc::now() >= until {
                        state.state = SchedulerState::Running;
                        state.paused_until = None;
                        info!("Scheduler auto-resumed after pause window elapsed");
                        return true;
                    }
                }
                false
            }
        }
    }

    /// One refresh pass. Every failure inside is caught and logged; the
    /// loop always proceeds to the next iteration.
    async fn run_iteration(&self) {
        let discovered = match self.symbols.active_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("Symbol discovery failed: {}", e);
                Vec::new()
            }
        };

        let mut symbols: Vec<String> = Vec::new();
        for raw in discovered {
            let symbol = raw.trim().to_uppercase();
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        if symbols.is_empty() {
            debug!("No monitored symbols discovered; refreshing the sample set");
            symbols = DEFAULT_SAMPLE_SYMBOLS.iter().map(|s| s.to_string()).collect();
        }

        let cap = match self.market_data.max_bulk_symbols().await {
            Ok(Some(limit)) => limit,
            _ => DEFAULT_SYMBOL_CAP,
        };
        if symbols.len() > cap {
            debug!(
                "Capping scheduled refresh from {} to {} symbols",
                symbols.len(),
                cap
            );
            symbols.truncate(cap);
        }

        let requested = symbols.len();
        let started = Instant::now();
        match self
            .market_data
            .get_prices(&symbols, self.config.use_bulk)
            .await
        {
            Ok(response) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Scheduled refresh: {} of {} symbols fetched ({} failed) in {} ms",
                    response.quotes.len(),
                    requested,
                    response.failed.len(),
                    duration_ms
                );
                record_best_effort(
                    self.activity_sink.as_ref(),
                    ActivityRecord::new(
                        ActivityEventType::ScheduledFetchCompleted,
                        if response.failed.is_empty() {
                            Severity::Info
                        } else {
                            Severity::Warning
                        },
                        format!(
                            "Scheduled refresh fetched {} of {} symbols",
                            response.quotes.len(),
                            requested
                        ),
                    )
                    .with_metadata(json!({
                        "requested": requested,
                        "fetched": response.quotes.len(),
                        "failed": response.failed.len(),
                        "durationMs": duration_ms,
                    })),
                )
                .await;
            }
            Err(e) => {
                warn!("Scheduled refresh failed: {}", e);
                record_best_effort(
                    self.activity_sink.as_ref(),
                    ActivityRecord::new(
                        ActivityEventType::ScheduledFetchCompleted,
                        Severity::Warning,
                        format!("Scheduled refresh failed: {}", e),
                    ),
                )
                .await;
            }
        }
    }

    async fn record_state_change(&self, detail: &str) {
        record_best_effort(
            self.activity_sink.as_ref(),
            ActivityRecord::new(
                ActivityEventType::SchedulerStateChanged,
                Severity::Info,
                format!("Scheduler {}", detail),
            ),
        )
        .await;
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown_rx.changed() => *shutdown_rx.borrow(),
    }
}
