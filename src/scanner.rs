//! Fleet scanner - fan-out/fan-in probing of the whole fleet
//!
//! One sweep probes every monitored device concurrently, with a bounded
//! worker budget and a per-probe timeout. A slow or hung probe never stalls
//! the rest of the sweep: outstanding probes are abandoned at a hard
//! sweep-level deadline and reported as timed out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::prober::{self, ProbeError};
use crate::{Device, ProbeResult};

/// Concurrency and deadline budget for one sweep.
#[derive(Debug, Clone)]
pub struct FleetScanner {
    max_concurrent: usize,
    probe_timeout: Duration,
    sweep_timeout: Duration,
}

impl FleetScanner {
    pub fn new(max_concurrent: usize, probe_timeout: Duration, sweep_timeout: Duration) -> Self {
        Self {
            // A zero budget would deadlock the semaphore.
            max_concurrent: max_concurrent.max(1),
            probe_timeout,
            sweep_timeout,
        }
    }

    /// Probe every device in `devices`, returning one result per device.
    ///
    /// Ordering of the results is unspecified. Devices whose address fails
    /// validation are skipped for this sweep (logged, no result); every
    /// other device gets a result, even if its probe had to be abandoned
    /// at the sweep deadline.
    #[instrument(skip_all, fields(devices = devices.len()))]
    pub async fn sweep(&self, devices: &[Device]) -> Vec<ProbeResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for device in devices {
            let semaphore = semaphore.clone();
            let device_id = device.id.clone();
            let address = device.address.clone();
            let port = device.port;
            let timeout = self.probe_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    // Semaphore closed: sweep is being torn down.
                    return (device_id, None);
                };

                let result = match prober::probe(&address, port, timeout).await {
                    Ok(outcome) => Some(ProbeResult {
                        device_id: device_id.clone(),
                        reachable: outcome.reachable,
                        latency_ms: outcome.latency_ms,
                        error: outcome.error,
                        timestamp: Utc::now(),
                    }),
                    Err(e @ ProbeError::InvalidAddress(_)) => {
                        warn!("skipping device {device_id} for this sweep: {e}");
                        None
                    }
                };

                (device_id, result)
            });
        }

        let mut results = Vec::with_capacity(devices.len());
        let mut seen = HashSet::new();

        let deadline = tokio::time::sleep(self.sweep_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((device_id, result))) => {
                        seen.insert(device_id);
                        if let Some(result) = result {
                            results.push(result);
                        }
                    }
                    Some(Err(e)) => {
                        // A panicked probe task; its device is synthesized
                        // below as unreachable.
                        warn!("probe task failed: {e}");
                    }
                    None => break,
                },

                _ = &mut deadline => {
                    warn!(
                        "sweep deadline reached with {} probes outstanding",
                        tasks.len()
                    );
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }

        // Every abandoned or crashed probe still owes the sweep a result.
        let timestamp = Utc::now();
        for device in devices {
            if !seen.contains(&device.id) {
                results.push(ProbeResult {
                    device_id: device.id.clone(),
                    reachable: false,
                    latency_ms: None,
                    error: Some("probe abandoned at sweep deadline".to_string()),
                    timestamp,
                });
            }
        }

        debug!("sweep complete: {} results", results.len());
        results
    }
}
