//! Monitoring scheduler - the top-level control loop
//!
//! Owns the start/stop lifecycle and orchestrates one full sweep per tick:
//! fleet scan, transition detection, alert lifecycle, notification
//! dispatch. One scheduler instance runs at most one loop; `start` is
//! idempotent and `stop` wakes the loop immediately, then waits a bounded
//! grace period for the in-flight sweep.
//!
//! ## Tick flow
//!
//! ```text
//! tick ──> FleetScanner::sweep ──> per device:
//!            classify transition ──> persist status ──> alert lifecycle
//!                                                          │ (Created)
//!                                                          ▼
//!                                               NotificationDispatcher
//! ```
//!
//! Per-device failures are logged and skipped; they never fail the sweep.
//! An unexpected sweep-level error puts the loop into a cool-down instead
//! of killing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::alerts::AlertManager;
use crate::config::MonitorConfig;
use crate::notify::DispatcherHandle;
use crate::repository::{AlertRepository, DeviceRepository, UpsertOutcome};
use crate::scanner::FleetScanner;
use crate::transition;
use crate::{Device, DeviceStatus, ProbeResult};

/// Actor name stamped as `resolved_by` on automatic resolutions.
const SYSTEM_ACTOR: &str = "monitor";

/// What one sweep did to one device.
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub device_id: String,
    pub name: String,
    pub old_status: DeviceStatus,
    pub new_status: DeviceStatus,
    pub changed: bool,
    pub response_time_ms: Option<f64>,
    pub alert_opened: bool,
    pub alert_resolved: bool,
}

/// Aggregate result of one sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub outcomes: Vec<DeviceOutcome>,

    /// Devices whose update failed and was skipped until the next tick.
    pub skipped: usize,
}

impl SweepSummary {
    pub fn changed(&self) -> impl Iterator<Item = &DeviceOutcome> {
        self.outcomes.iter().filter(|o| o.changed)
    }

    pub fn alerts_opened(&self) -> usize {
        self.outcomes.iter().filter(|o| o.alert_opened).count()
    }

    pub fn alerts_resolved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.alert_resolved).count()
    }
}

/// Executes one full sweep: scan, detect, persist, alert, notify.
pub struct SweepEngine {
    devices: Arc<dyn DeviceRepository>,
    alerts: AlertManager,
    dispatcher: DispatcherHandle,
    scanner: FleetScanner,
}

impl SweepEngine {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        alerts: AlertManager,
        dispatcher: DispatcherHandle,
        scanner: FleetScanner,
    ) -> Self {
        Self {
            devices,
            alerts,
            dispatcher,
            scanner,
        }
    }

    /// Run one sweep over every monitored device.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<SweepSummary> {
        let fleet = self
            .devices
            .list_monitored()
            .await
            .context("failed to list monitored devices")?;

        if fleet.is_empty() {
            debug!("no devices configured for monitoring");
            return Ok(SweepSummary::default());
        }

        debug!("starting sweep of {} devices", fleet.len());
        let results = self.scanner.sweep(&fleet).await;

        let by_id: HashMap<&str, &Device> = fleet.iter().map(|d| (d.id.as_str(), d)).collect();

        let mut summary = SweepSummary::default();
        for result in &results {
            let Some(device) = by_id.get(result.device_id.as_str()).copied() else {
                continue;
            };

            match self.apply(device, result).await {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(e) => {
                    // Isolated per device: retried on the next tick.
                    warn!("skipping update for {}: {e:#}", device.name);
                    summary.skipped += 1;
                }
            }
        }

        let changed: Vec<&DeviceOutcome> = summary.changed().collect();
        if changed.is_empty() {
            debug!("sweep completed: no status changes detected");
        } else {
            info!("sweep completed: {} devices changed status", changed.len());
            for outcome in changed {
                info!(
                    "  {}: {} -> {}",
                    outcome.name, outcome.old_status, outcome.new_status
                );
            }
        }

        Ok(summary)
    }

    /// Apply one probe result: persist the status and drive the alert
    /// lifecycle. The read-modify-write here is the per-device unit of
    /// atomicity; nothing else touches this device within the sweep.
    async fn apply(&self, device: &Device, result: &ProbeResult) -> Result<DeviceOutcome> {
        let transition = transition::classify(device.status, result);

        let last_seen = result.reachable.then_some(result.timestamp);
        let response_time_ms = if result.reachable {
            result.latency_ms
        } else {
            None
        };

        self.devices
            .update_status(&device.id, transition.new_status, last_seen, response_time_ms)
            .await
            .context("failed to persist device status")?;

        let mut alert_opened = false;
        let mut alert_resolved = false;

        if result.reachable {
            if let Some(alert) = self.alerts.on_device_online(device, SYSTEM_ACTOR).await? {
                alert_resolved = true;
                debug!("{}: resolved alert {}", device.name, alert.id);
            }
        } else {
            match self
                .alerts
                .on_device_offline(device, result.error.as_deref())
                .await?
            {
                UpsertOutcome::Created(alert) => {
                    alert_opened = true;
                    self.dispatcher.dispatch(alert).await;
                }
                UpsertOutcome::Bumped(_) => {}
            }
        }

        Ok(DeviceOutcome {
            device_id: device.id.clone(),
            name: device.name.clone(),
            old_status: device.status,
            new_status: transition.new_status,
            changed: transition.changed,
            response_time_ms,
            alert_opened,
            alert_resolved,
        })
    }
}

/// Commands understood by the monitor loop.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a sweep immediately, outside the cadence.
    SweepNow {
        respond_to: oneshot::Sender<Result<SweepSummary>>,
    },

    /// Exit the loop after the current sweep.
    Shutdown,
}

struct MonitorActor {
    engine: Arc<SweepEngine>,
    interval: Duration,
    cooldown: Duration,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl MonitorActor {
    #[instrument(skip(self))]
    async fn run(mut self) {
        debug!("monitor loop started");

        'ticks: loop {
            let tick_start = tokio::time::Instant::now();

            let wait = match self.engine.run_sweep().await {
                Ok(_) => {
                    let elapsed = tick_start.elapsed();
                    if elapsed > self.interval {
                        warn!(
                            "sweep took {elapsed:?}, exceeding the {:?} cadence; skipping missed ticks",
                            self.interval
                        );
                    }
                    self.interval.saturating_sub(elapsed)
                }
                Err(e) => {
                    // The loop must survive anything a sweep throws at it.
                    error!("sweep failed: {e:#}");
                    self.cooldown
                }
            };

            let deadline = tokio::time::Instant::now() + wait;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,

                    cmd = self.command_rx.recv() => match cmd {
                        Some(SchedulerCommand::SweepNow { respond_to }) => {
                            let _ = respond_to.send(self.engine.run_sweep().await);
                        }

                        Some(SchedulerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break 'ticks;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break 'ticks;
                        }
                    },
                }
            }
        }

        debug!("monitor loop stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Snapshot of the scheduler for status reporting.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

struct MonitorRuntime {
    command_tx: mpsc::Sender<SchedulerCommand>,
    handle: JoinHandle<()>,
}

/// The monitoring service: an owned scheduler with explicit lifecycle.
///
/// Instantiated once by the process entry point with its dependencies
/// injected; there is no ambient global instance.
pub struct MonitorService {
    engine: Arc<SweepEngine>,
    interval: Duration,
    cooldown: Duration,
    stop_grace: Duration,
    probe_timeout: Duration,
    runtime: Option<MonitorRuntime>,
}

impl MonitorService {
    pub fn new(
        config: &MonitorConfig,
        devices: Arc<dyn DeviceRepository>,
        alert_repo: Arc<dyn AlertRepository>,
        dispatcher: DispatcherHandle,
    ) -> Self {
        let scanner = FleetScanner::new(
            config.max_concurrent_probes,
            config.probe_timeout(),
            config.sweep_timeout(),
        );
        let engine = SweepEngine::new(
            devices,
            AlertManager::new(alert_repo),
            dispatcher,
            scanner,
        );

        Self {
            engine: Arc::new(engine),
            interval: config.interval(),
            cooldown: config.cooldown(),
            stop_grace: config.stop_grace(),
            probe_timeout: config.probe_timeout(),
            runtime: None,
        }
    }

    /// Start the background loop. A no-op if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("monitoring is already active");
            return;
        }

        let (command_tx, command_rx) = mpsc::channel(8);
        let actor = MonitorActor {
            engine: self.engine.clone(),
            interval: self.interval,
            cooldown: self.cooldown,
            command_rx,
        };
        let handle = tokio::spawn(actor.run());

        self.runtime = Some(MonitorRuntime { command_tx, handle });
        info!(
            "device monitoring started - checking every {}s",
            self.interval.as_secs()
        );
    }

    /// Signal the loop to exit and wait (bounded) for the in-flight
    /// sweep. In-flight probes are allowed to finish or hit their own
    /// timeout; nothing is hard-killed unless the grace period expires.
    pub async fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            debug!("monitor is not running");
            return;
        };

        info!("stopping monitoring service");
        let _ = runtime.command_tx.send(SchedulerCommand::Shutdown).await;

        let abort = runtime.handle.abort_handle();
        if tokio::time::timeout(self.stop_grace, runtime.handle)
            .await
            .is_err()
        {
            warn!("in-flight sweep did not finish within the grace period, aborting");
            abort.abort();
        }

        info!("device monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn state(&self) -> MonitorState {
        if self.is_running() {
            MonitorState::Running
        } else {
            MonitorState::Stopped
        }
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            state: self.state(),
            interval: self.interval,
            probe_timeout: self.probe_timeout,
        }
    }

    /// Run one sweep immediately.
    ///
    /// Goes through the running loop when there is one (so sweeps for a
    /// device are never pipelined), otherwise runs inline - which is how
    /// the single-run mode of the binary uses it.
    pub async fn sweep_now(&self) -> Result<SweepSummary> {
        match &self.runtime {
            Some(runtime) => {
                let (tx, rx) = oneshot::channel();
                runtime
                    .command_tx
                    .send(SchedulerCommand::SweepNow { respond_to: tx })
                    .await
                    .context("monitor loop is gone")?;
                rx.await.context("monitor loop dropped the sweep request")?
            }
            None => self.engine.run_sweep().await,
        }
    }
}
