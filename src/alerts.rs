//! Alert lifecycle management
//!
//! Translates device transitions into alert state and guarantees the
//! dedup invariant: at most one ACTIVE alert per
//! `(device, metric, value)` tuple at any time.
//!
//! ## State machine
//!
//! ```text
//! ACTIVE ──acknowledge──> ACKNOWLEDGED ──resolve──> RESOLVED
//!    │                                                 ▲
//!    └────────────────────resolve──────────────────────┘
//! ```
//!
//! RESOLVED is terminal. A repeat of a condition while its alert is
//! ACTIVE bumps counters in place; a repeat after acknowledgement or
//! resolution opens a fresh alert and the old row stands as history.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::repository::{AlertRepository, RepositoryError, UpsertOutcome};
use crate::{Device, DeviceClass};

/// Metric name used for reachability alerts.
pub const DEVICE_STATUS_METRIC: &str = "device_status";

const VALUE_OFFLINE: &str = "offline";
const VALUE_ONLINE: &str = "online";

pub type AlertId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Severity of an offline alert, derived from the device class at
    /// creation time: losing a server is critical, anything else warns.
    pub fn for_class(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Server => Severity::Critical,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        };
        write!(f, "{s}")
    }
}

/// Errors from alert lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertError {
    /// The requested action is not legal from the alert's current state.
    InvalidTransition {
        from: AlertStatus,
        action: &'static str,
    },

    /// The persistence layer failed; the operation may be retried.
    Repository(RepositoryError),
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertError::InvalidTransition { from, action } => {
                write!(f, "cannot {action} an alert in the {from} state")
            }
            AlertError::Repository(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AlertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AlertError::Repository(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepositoryError> for AlertError {
    fn from(e: RepositoryError) -> Self {
        AlertError::Repository(e)
    }
}

/// One open-or-closed condition on one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub device_id: String,
    pub device_name: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub metric_name: String,
    pub current_value: String,
    pub threshold_value: String,
    pub occurrence_count: u32,
    pub first_occurred: DateTime<Utc>,
    pub last_occurred: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledgement_note: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
}

impl Alert {
    /// Acknowledge this alert. Legal only from ACTIVE.
    pub fn acknowledge(&mut self, actor: &str, note: Option<&str>) -> Result<(), AlertError> {
        match self.status {
            AlertStatus::Active => {
                self.status = AlertStatus::Acknowledged;
                self.acknowledged_by = Some(actor.to_string());
                self.acknowledged_at = Some(Utc::now());
                self.acknowledgement_note = note.map(str::to_string);
                Ok(())
            }
            from => Err(AlertError::InvalidTransition {
                from,
                action: "acknowledge",
            }),
        }
    }

    /// Resolve this alert. Legal from ACTIVE or ACKNOWLEDGED.
    pub fn resolve(&mut self, actor: &str, note: Option<&str>) -> Result<(), AlertError> {
        match self.status {
            AlertStatus::Active | AlertStatus::Acknowledged => {
                self.status = AlertStatus::Resolved;
                self.resolved_by = Some(actor.to_string());
                self.resolved_at = Some(Utc::now());
                self.resolution_note = note.map(str::to_string);
                Ok(())
            }
            from => Err(AlertError::InvalidTransition {
                from,
                action: "resolve",
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Resolved
    }
}

/// Candidate for a new alert, before the repository assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: String,
    pub device_name: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub metric_name: String,
    pub current_value: String,
    pub threshold_value: String,
}

impl NewAlert {
    /// Materialize the candidate as a fresh ACTIVE alert.
    pub fn into_alert(self, id: AlertId, now: DateTime<Utc>) -> Alert {
        Alert {
            id,
            device_id: self.device_id,
            device_name: self.device_name,
            title: self.title,
            message: self.message,
            severity: self.severity,
            status: AlertStatus::Active,
            metric_name: self.metric_name,
            current_value: self.current_value,
            threshold_value: self.threshold_value,
            occurrence_count: 1,
            first_occurred: now,
            last_occurred: now,
            acknowledged_by: None,
            acknowledged_at: None,
            acknowledgement_note: None,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        }
    }
}

/// Outcome of a bulk acknowledge/resolve operation.
///
/// Bulk operations never abort on the first failure; every alert is
/// attempted and failures are reported per alert.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failures: Vec<(AlertId, AlertError)>,
}

/// Owns alert creation, deduplication, occurrence bumping and resolution.
#[derive(Clone)]
pub struct AlertManager {
    repo: Arc<dyn AlertRepository>,
}

impl AlertManager {
    pub fn new(repo: Arc<dyn AlertRepository>) -> Self {
        Self { repo }
    }

    /// Record that a device was found offline.
    ///
    /// Returns `Created` when this opens a new incident (the caller is
    /// expected to dispatch notifications for it) and `Bumped` when an
    /// ACTIVE alert already covered the condition — a re-confirmation,
    /// not a new incident.
    #[instrument(skip(self, device), fields(device = %device.name))]
    pub async fn on_device_offline(
        &self,
        device: &Device,
        error: Option<&str>,
    ) -> Result<UpsertOutcome, AlertError> {
        let mut message = format!(
            "Device {} ({}) has gone offline.",
            device.name, device.address
        );
        if let Some(error) = error {
            message.push_str(&format!(" Error: {error}"));
        }

        let candidate = NewAlert {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            title: format!("Device Offline: {}", device.name),
            message,
            severity: Severity::for_class(device.class),
            metric_name: DEVICE_STATUS_METRIC.to_string(),
            current_value: VALUE_OFFLINE.to_string(),
            threshold_value: VALUE_ONLINE.to_string(),
        };

        let outcome = self.repo.upsert_active(candidate).await?;
        match &outcome {
            UpsertOutcome::Created(alert) => {
                debug!("opened alert {} ({})", alert.id, alert.severity);
            }
            UpsertOutcome::Bumped(alert) => {
                debug!(
                    "alert {} re-confirmed, occurrence {}",
                    alert.id, alert.occurrence_count
                );
            }
        }

        Ok(outcome)
    }

    /// Record that a device was found online again.
    ///
    /// Resolves the open offline alert if one exists; coming online with
    /// no open alert is not itself alert-worthy.
    #[instrument(skip(self, device), fields(device = %device.name))]
    pub async fn on_device_online(
        &self,
        device: &Device,
        resolved_by: &str,
    ) -> Result<Option<Alert>, AlertError> {
        let Some(mut alert) = self
            .repo
            .find_active(&device.id, DEVICE_STATUS_METRIC, VALUE_OFFLINE)
            .await?
        else {
            return Ok(None);
        };

        alert.resolve(resolved_by, Some("Device is back online and responding."))?;
        self.repo.save(&alert).await?;

        debug!("resolved alert {} for {}", alert.id, device.name);
        Ok(Some(alert))
    }

    /// Acknowledge a single alert.
    pub async fn acknowledge(
        &self,
        alert_id: AlertId,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Alert, AlertError> {
        let mut alert = self.repo.get(alert_id).await?;
        alert.acknowledge(actor, note)?;
        self.repo.save(&alert).await?;
        Ok(alert)
    }

    /// Resolve a single alert.
    pub async fn resolve(
        &self,
        alert_id: AlertId,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Alert, AlertError> {
        let mut alert = self.repo.get(alert_id).await?;
        alert.resolve(actor, note)?;
        self.repo.save(&alert).await?;
        Ok(alert)
    }

    /// Acknowledge every currently ACTIVE alert.
    pub async fn acknowledge_all(
        &self,
        actor: &str,
        note: Option<&str>,
    ) -> Result<BulkOutcome, AlertError> {
        let active = self.repo.list_active().await?;
        let ids: Vec<AlertId> = active.iter().map(|a| a.id).collect();
        Ok(self.bulk_acknowledge(&ids, actor, note).await)
    }

    /// Acknowledge each of `ids` independently, continuing past failures.
    pub async fn bulk_acknowledge(
        &self,
        ids: &[AlertId],
        actor: &str,
        note: Option<&str>,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            match self.acknowledge(id, actor, note).await {
                Ok(_) => outcome.succeeded += 1,
                Err(e) => outcome.failures.push((id, e)),
            }
        }
        outcome
    }

    /// Resolve each of `ids` independently, continuing past failures.
    pub async fn bulk_resolve(
        &self,
        ids: &[AlertId],
        actor: &str,
        note: Option<&str>,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            match self.resolve(id, actor, note).await {
                Ok(_) => outcome.succeeded += 1,
                Err(e) => outcome.failures.push((id, e)),
            }
        }
        outcome
    }
}
