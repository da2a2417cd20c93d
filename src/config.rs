use std::time::Duration;

use tracing::trace;

use crate::notify::Recipient;
use crate::{Device, DeviceClass, DeviceStatus};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub devices: Option<Vec<DeviceConfig>>,

    /// Scheduler and probing knobs (optional - sensible defaults)
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Notification delivery (optional - defaults to log-only)
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeviceConfig {
    /// Stable identifier; defaults to the address
    pub id: Option<String>,
    pub name: String,
    pub address: String,
    #[serde(default = "crate::util::get_default_probe_port")]
    pub port: u16,
    #[serde(default)]
    pub class: DeviceClass,
    #[serde(default = "default_monitoring_enabled")]
    pub monitoring: bool,
    pub location: Option<String>,
}

impl DeviceConfig {
    pub fn into_device(self) -> Device {
        Device {
            id: self.id.unwrap_or_else(|| self.address.clone()),
            name: self.name,
            address: self.address,
            port: self.port,
            class: self.class,
            monitoring_enabled: self.monitoring,
            status: DeviceStatus::Unknown,
            last_seen: None,
            response_time_ms: None,
            location: self.location,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Sweep cadence in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Worker budget for concurrent probes within one sweep
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Hard deadline for a whole sweep, in seconds
    #[serde(default = "default_sweep_timeout")]
    pub sweep_timeout_secs: u64,

    /// Back-off after a failed sweep, in seconds
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// How long `stop` waits for an in-flight sweep, in seconds
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn sweep_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            probe_timeout_secs: default_probe_timeout(),
            max_concurrent_probes: default_max_concurrent_probes(),
            sweep_timeout_secs: default_sweep_timeout(),
            cooldown_secs: default_cooldown(),
            stop_grace_secs: default_stop_grace(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationConfig {
    /// HTTP gateway that performs the actual email/SMS delivery.
    /// Notifications are logged locally when unset.
    pub gateway: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay of the retry backoff, in seconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl NotificationConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            gateway: None,
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            recipients: Vec::new(),
        }
    }
}

fn default_interval() -> u64 {
    300
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_max_concurrent_probes() -> usize {
    10
}

fn default_sweep_timeout() -> u64 {
    60
}

fn default_cooldown() -> u64 {
    60
}

fn default_stop_grace() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    30
}

fn default_monitoring_enabled() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
