//! Repositories for device and alert persistence
//!
//! The monitor treats storage as an external collaborator behind two
//! trait seams. Implementations must be `Send + Sync`; all operations are
//! async for compatibility with the Tokio actors.
//!
//! ## Atomicity
//!
//! Per-device writes are independent: concurrent sweeps of *different*
//! devices never contend on the same row. The one operation that must be
//! atomic within a device is [`AlertRepository::upsert_active`] — the
//! find-or-create of the single ACTIVE alert for a condition. Doing the
//! lookup and the insert as one repository operation closes the race that
//! a query-then-create pattern would leave open.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alerts::{Alert, AlertId, NewAlert};
use crate::notify::{AlertNotification, NewNotification};
use crate::{Device, DeviceStatus};

pub use error::{RepositoryError, RepositoryResult};
pub use memory::{MemoryAlertRepository, MemoryDeviceRepository};

/// Outcome of [`AlertRepository::upsert_active`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No ACTIVE alert existed for the condition; a new one was created.
    Created(Alert),

    /// An ACTIVE alert already existed; its occurrence count and
    /// `last_occurred` were bumped in place.
    Bumped(Alert),
}

impl UpsertOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            UpsertOutcome::Created(alert) | UpsertOutcome::Bumped(alert) => alert,
        }
    }
}

/// Read/write access to the device inventory.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// All devices with monitoring enabled.
    async fn list_monitored(&self) -> RepositoryResult<Vec<Device>>;

    /// Persist the outcome of a sweep for one device.
    ///
    /// `last_seen` is only passed on a successful probe; `response_time_ms`
    /// is `None` whenever the device is offline. The write is scoped to a
    /// single device so sweeps never merge state across devices.
    async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        last_seen: Option<DateTime<Utc>>,
        response_time_ms: Option<f64>,
    ) -> RepositoryResult<()>;
}

/// Read/write access to alerts and their notification records.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Find the ACTIVE alert for `(device, metric, value)`, if any.
    async fn find_active(
        &self,
        device_id: &str,
        metric_name: &str,
        current_value: &str,
    ) -> RepositoryResult<Option<Alert>>;

    /// Atomically bump the existing ACTIVE alert for the candidate's
    /// condition, or create a new one if none is open.
    ///
    /// Implementations must execute the lookup and the write as one
    /// operation so that concurrent sweeps can never leave two ACTIVE
    /// alerts for the same `(device, metric, value)` tuple.
    async fn upsert_active(&self, candidate: NewAlert) -> RepositoryResult<UpsertOutcome>;

    async fn get(&self, alert_id: AlertId) -> RepositoryResult<Alert>;

    /// Persist a mutated alert. Alerts are never deleted, only saved in
    /// their RESOLVED terminal state.
    async fn save(&self, alert: &Alert) -> RepositoryResult<()>;

    /// All alerts currently in the ACTIVE state.
    async fn list_active(&self) -> RepositoryResult<Vec<Alert>>;

    /// Create a notification record in its initial PENDING state.
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> RepositoryResult<AlertNotification>;

    /// Persist the attempt bookkeeping of a notification.
    async fn save_notification(&self, notification: &AlertNotification) -> RepositoryResult<()>;
}
