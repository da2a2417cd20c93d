//! In-memory repositories (no persistence)
//!
//! Hash-map backed implementations of the repository traits, used for
//! tests and for deployments where the fleet is loaded from the config
//! file at startup. All data is lost on restart.
//!
//! The alert store takes a single write lock for the whole
//! `upsert_active` operation, which is what makes the find-or-create of
//! an ACTIVE alert atomic here.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::error::{RepositoryError, RepositoryResult};
use super::{AlertRepository, DeviceRepository, UpsertOutcome};
use crate::alerts::{Alert, AlertId, AlertStatus, NewAlert};
use crate::notify::{AlertNotification, NewNotification, NotificationStatus};
use crate::{Device, DeviceStatus};

/// In-memory device inventory.
pub struct MemoryDeviceRepository {
    devices: RwLock<HashMap<String, Device>>,
}

impl MemoryDeviceRepository {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the inventory, e.g. from the config file.
    pub fn with_devices(devices: Vec<Device>) -> Self {
        let map = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self {
            devices: RwLock::new(map),
        }
    }

    /// Fetch a single device (not part of the trait; used by callers that
    /// need to inspect state, e.g. tests and the single-run report).
    pub async fn get(&self, device_id: &str) -> Option<Device> {
        self.devices.read().await.get(device_id).cloned()
    }
}

impl Default for MemoryDeviceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRepository for MemoryDeviceRepository {
    async fn list_monitored(&self) -> RepositoryResult<Vec<Device>> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .filter(|d| d.monitoring_enabled)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        last_seen: Option<DateTime<Utc>>,
        response_time_ms: Option<f64>,
    ) -> RepositoryResult<()> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("device {device_id}")))?;

        device.status = status;
        if let Some(seen) = last_seen {
            device.last_seen = Some(seen);
        }
        device.response_time_ms = response_time_ms;

        Ok(())
    }
}

#[derive(Default)]
struct AlertStore {
    alerts: HashMap<AlertId, Alert>,
    notifications: HashMap<u64, AlertNotification>,
    next_alert_id: AlertId,
    next_notification_id: u64,
}

/// In-memory alert and notification store.
pub struct MemoryAlertRepository {
    inner: RwLock<AlertStore>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AlertStore::default()),
        }
    }

    /// All alerts, in no particular order (test/report helper).
    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.values().cloned().collect()
    }

    /// Notification records for one alert (test/report helper).
    pub async fn notifications_for(&self, alert_id: AlertId) -> Vec<AlertNotification> {
        self.inner
            .read()
            .await
            .notifications
            .values()
            .filter(|n| n.alert_id == alert_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAlertRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn find_active(
        &self,
        device_id: &str,
        metric_name: &str,
        current_value: &str,
    ) -> RepositoryResult<Option<Alert>> {
        let store = self.inner.read().await;
        Ok(store
            .alerts
            .values()
            .find(|a| {
                a.status == AlertStatus::Active
                    && a.device_id == device_id
                    && a.metric_name == metric_name
                    && a.current_value == current_value
            })
            .cloned())
    }

    async fn upsert_active(&self, candidate: NewAlert) -> RepositoryResult<UpsertOutcome> {
        let mut store = self.inner.write().await;
        let now = Utc::now();

        let existing = store.alerts.values_mut().find(|a| {
            a.status == AlertStatus::Active
                && a.device_id == candidate.device_id
                && a.metric_name == candidate.metric_name
                && a.current_value == candidate.current_value
        });

        if let Some(alert) = existing {
            alert.occurrence_count += 1;
            alert.last_occurred = now;
            return Ok(UpsertOutcome::Bumped(alert.clone()));
        }

        store.next_alert_id += 1;
        let alert = candidate.into_alert(store.next_alert_id, now);
        store.alerts.insert(alert.id, alert.clone());

        Ok(UpsertOutcome::Created(alert))
    }

    async fn get(&self, alert_id: AlertId) -> RepositoryResult<Alert> {
        self.inner
            .read()
            .await
            .alerts
            .get(&alert_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("alert {alert_id}")))
    }

    async fn save(&self, alert: &Alert) -> RepositoryResult<()> {
        let mut store = self.inner.write().await;
        if !store.alerts.contains_key(&alert.id) {
            return Err(RepositoryError::NotFound(format!("alert {}", alert.id)));
        }
        store.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn list_active(&self) -> RepositoryResult<Vec<Alert>> {
        let store = self.inner.read().await;
        Ok(store
            .alerts
            .values()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> RepositoryResult<AlertNotification> {
        let mut store = self.inner.write().await;
        store.next_notification_id += 1;

        let record = AlertNotification {
            id: store.next_notification_id,
            alert_id: notification.alert_id,
            channel: notification.channel,
            recipient: notification.recipient,
            status: NotificationStatus::Pending,
            attempts: 0,
            max_attempts: notification.max_attempts,
            last_attempt: None,
            next_retry: None,
            created_at: Utc::now(),
        };

        store.notifications.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_notification(&self, notification: &AlertNotification) -> RepositoryResult<()> {
        let mut store = self.inner.write().await;
        if !store.notifications.contains_key(&notification.id) {
            return Err(RepositoryError::NotFound(format!(
                "notification {}",
                notification.id
            )));
        }
        store.notifications.insert(notification.id, notification.clone());
        Ok(())
    }
}
