pub mod alerts;
pub mod config;
pub mod notify;
pub mod prober;
pub mod repository;
pub mod scanner;
pub mod scheduler;
pub mod transition;
pub mod util;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability classification of a monitored device.
///
/// Only `Online` and `Offline` are ever set by the monitor itself;
/// the remaining states are entered through manual or configuration
/// actions and are merely observed (and left) by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
    #[default]
    Unknown,
    Maintenance,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Warning => "warning",
            DeviceStatus::Unknown => "unknown",
            DeviceStatus::Maintenance => "maintenance",
        };
        write!(f, "{s}")
    }
}

/// Classification of a device, used to derive alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Server,
    Router,
    Switch,
    AccessPoint,
    Firewall,
    #[default]
    Other,
}

/// A network device under monitoring.
///
/// Owned by the external inventory store; the monitor reads the fleet and
/// writes back `status`, `last_seen` and `response_time_ms` after each sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,

    /// IP address, kept as text since it arrives from external inventory
    /// data and may be malformed (probing validates it per sweep).
    pub address: String,

    /// TCP port probed for reachability.
    pub port: u16,

    pub class: DeviceClass,
    pub monitoring_enabled: bool,
    pub status: DeviceStatus,

    /// Updated only on a successful probe.
    pub last_seen: Option<DateTime<Utc>>,

    /// Cleared whenever the device is offline.
    pub response_time_ms: Option<f64>,

    pub location: Option<String>,
}

/// Outcome of probing a single device during one sweep.
///
/// Ephemeral: consumed by the transition detector, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub device_id: String,
    pub reachable: bool,

    /// Round-trip time of the probe. `Some` iff `reachable`.
    pub latency_ms: Option<f64>,

    /// Failure description. `Some` iff not `reachable`.
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}
