//! Helper functions and test doubles for integration tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use network_monitoring::config::MonitorConfig;
use network_monitoring::notify::{
    DispatcherHandle, NotificationChannel, NotificationDispatcher, NotificationTransport,
    Recipient, TransportError,
};
use network_monitoring::repository::{
    DeviceRepository, MemoryAlertRepository, RepositoryError, RepositoryResult,
};
use network_monitoring::scheduler::MonitorService;
use network_monitoring::{Device, DeviceClass, DeviceStatus};

pub fn test_device(id: &str, address: &str, port: u16, class: DeviceClass) -> Device {
    Device {
        id: id.to_string(),
        name: format!("Device {id}"),
        address: address.to_string(),
        port,
        class,
        monitoring_enabled: true,
        status: DeviceStatus::Unknown,
        last_seen: None,
        response_time_ms: None,
        location: Some("lab".to_string()),
    }
}

/// Device at a TEST-NET-1 address: never answers, probes time out or get
/// an unreachable route. Either way the device is classified offline.
pub fn offline_device(id: &str, class: DeviceClass) -> Device {
    test_device(id, "192.0.2.1", 80, class)
}

pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        interval_secs: 3600,
        probe_timeout_secs: 1,
        max_concurrent_probes: 8,
        sweep_timeout_secs: 15,
        cooldown_secs: 1,
        stop_grace_secs: 5,
    }
}

pub fn email_recipient(address: &str) -> Recipient {
    Recipient {
        channel: NotificationChannel::Email,
        address: address.to_string(),
    }
}

/// Transport double that records every delivery and fails on demand for
/// selected recipients.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(NotificationChannel, String, String)>>,
    failing_recipients: HashSet<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_recipients: HashSet::new(),
        }
    }

    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), TransportError> {
        if self.failing_recipients.contains(recipient) {
            return Err(TransportError::Network("simulated outage".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel, recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Device repository whose addresses can be rewired mid-test, to simulate
/// a device going away and coming back.
pub struct SwitchboardRepository {
    devices: tokio::sync::RwLock<HashMap<String, Device>>,
    fail_updates_for: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
}

impl SwitchboardRepository {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: tokio::sync::RwLock::new(
                devices.into_iter().map(|d| (d.id.clone(), d)).collect(),
            ),
            fail_updates_for: Mutex::new(HashSet::new()),
            fail_listing: AtomicBool::new(false),
        }
    }

    pub async fn get(&self, device_id: &str) -> Option<Device> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn set_address(&self, device_id: &str, address: &str, port: u16) {
        let mut devices = self.devices.write().await;
        let device = devices.get_mut(device_id).expect("unknown device");
        device.address = address.to_string();
        device.port = port;
    }

    /// Make `update_status` fail for one device (a partial storage outage).
    pub fn fail_updates_for(&self, device_id: &str) {
        self.fail_updates_for
            .lock()
            .unwrap()
            .insert(device_id.to_string());
    }

    /// Make `list_monitored` fail entirely until restored.
    pub fn set_listing_failure(&self, failing: bool) {
        self.fail_listing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceRepository for SwitchboardRepository {
    async fn list_monitored(&self) -> RepositoryResult<Vec<Device>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "simulated database outage".to_string(),
            ));
        }
        Ok(self
            .devices
            .read()
            .await
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
        if self.fail_updates_for.lock().unwrap().contains(device_id) {
            return Err(RepositoryError::Unavailable(
                "simulated row-level failure".to_string(),
            ));
        }

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

/// Everything a pipeline test needs, wired together.
pub struct TestRig {
    pub service: MonitorService,
    pub devices: Arc<SwitchboardRepository>,
    pub alerts: Arc<MemoryAlertRepository>,
    pub transport: Arc<RecordingTransport>,
    pub dispatcher: DispatcherHandle,
}

pub fn build_rig(
    devices: Vec<Device>,
    transport: RecordingTransport,
    recipients: Vec<Recipient>,
) -> TestRig {
    let device_repo = Arc::new(SwitchboardRepository::new(devices));
    let alert_repo = Arc::new(MemoryAlertRepository::new());
    let transport = Arc::new(transport);

    let dispatcher = DispatcherHandle::spawn(NotificationDispatcher::new(
        transport.clone(),
        alert_repo.clone(),
        recipients,
        3,
        Duration::from_millis(1),
    ));

    let service = MonitorService::new(
        &fast_config(),
        device_repo.clone(),
        alert_repo.clone(),
        dispatcher.clone(),
    );

    TestRig {
        service,
        devices: device_repo,
        alerts: alert_repo,
        transport,
        dispatcher,
    }
}
