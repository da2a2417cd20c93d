//! Failure isolation tests
//!
//! Per-device failures stay per-device, storage outages are survived,
//! and notification transport failures end in bookkeeping, not crashes.

use network_monitoring::alerts::AlertStatus;
use network_monitoring::notify::NotificationStatus;
use network_monitoring::{DeviceClass, DeviceStatus};

use crate::helpers::*;

#[tokio::test]
async fn test_row_level_storage_failure_skips_only_that_device() {
    let mut healthy = offline_device("healthy", DeviceClass::Router);
    healthy.address = "192.0.2.10".to_string();

    let rig = build_rig(
        vec![offline_device("cursed", DeviceClass::Router), healthy],
        RecordingTransport::new(),
        vec![],
    );
    rig.devices.fail_updates_for("cursed");

    let summary = rig.service.sweep_now().await.unwrap();

    // The failing device is skipped until the next tick...
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        rig.devices.get("cursed").await.unwrap().status,
        DeviceStatus::Unknown
    );

    // ...while the healthy one is fully processed.
    assert_eq!(
        rig.devices.get("healthy").await.unwrap().status,
        DeviceStatus::Offline
    );
    let alerts = rig.alerts.all_alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].device_id, "healthy");
}

#[tokio::test]
async fn test_invalid_address_skips_device_but_not_sweep() {
    let rig = build_rig(
        vec![
            test_device("typo", "not-an-address", 80, DeviceClass::Router),
            offline_device("down", DeviceClass::Router),
        ],
        RecordingTransport::new(),
        vec![],
    );

    let summary = rig.service.sweep_now().await.unwrap();

    // The malformed device produced no result and keeps its old status.
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(
        rig.devices.get("typo").await.unwrap().status,
        DeviceStatus::Unknown
    );

    // The rest of the fleet is still swept.
    assert_eq!(
        rig.devices.get("down").await.unwrap().status,
        DeviceStatus::Offline
    );
}

#[tokio::test]
async fn test_transport_outage_is_bookkept_not_fatal() {
    let rig = build_rig(
        vec![offline_device("down", DeviceClass::Server)],
        RecordingTransport::failing_for(&["ops@example.com"]),
        vec![email_recipient("ops@example.com")],
    );

    rig.service.sweep_now().await.unwrap();
    rig.dispatcher.drain().await;

    // The alert exists regardless of delivery problems.
    let alerts = rig.alerts.all_alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Active);

    // The notification exhausted its attempts into terminal FAILED.
    let notifications = rig.alerts.notifications_for(alerts[0].id).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].status, NotificationStatus::Failed);
    assert_eq!(notifications[0].attempts, notifications[0].max_attempts);
    assert_eq!(notifications[0].next_retry, None);
}

#[tokio::test]
async fn test_partial_transport_outage_leaves_other_recipients_served() {
    let rig = build_rig(
        vec![offline_device("down", DeviceClass::Server)],
        RecordingTransport::failing_for(&["broken@example.com"]),
        vec![
            email_recipient("broken@example.com"),
            email_recipient("working@example.com"),
        ],
    );

    rig.service.sweep_now().await.unwrap();
    rig.dispatcher.drain().await;

    let alerts = rig.alerts.all_alerts().await;
    let mut notifications = rig.alerts.notifications_for(alerts[0].id).await;
    notifications.sort_by(|a, b| a.recipient.cmp(&b.recipient));

    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].recipient, "broken@example.com");
    assert_eq!(notifications[0].status, NotificationStatus::Failed);
    assert_eq!(notifications[1].recipient, "working@example.com");
    assert_eq!(notifications[1].status, NotificationStatus::Sent);
}

#[tokio::test]
async fn test_inventory_outage_fails_sweep_but_recovers() {
    let rig = build_rig(
        vec![offline_device("down", DeviceClass::Router)],
        RecordingTransport::new(),
        vec![],
    );

    rig.devices.set_listing_failure(true);
    let result = rig.service.sweep_now().await;
    assert!(result.is_err());

    // The engine is unharmed: the next sweep works once storage is back.
    rig.devices.set_listing_failure(false);
    let summary = rig.service.sweep_now().await.unwrap();
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(
        rig.devices.get("down").await.unwrap().status,
        DeviceStatus::Offline
    );
}

#[tokio::test]
async fn test_running_loop_survives_inventory_outage() {
    let mut rig = build_rig(
        vec![offline_device("down", DeviceClass::Router)],
        RecordingTransport::new(),
        vec![],
    );

    rig.devices.set_listing_failure(true);
    rig.service.start();

    // The initial tick fails; the loop must still be alive and serving.
    let failed = rig.service.sweep_now().await;
    assert!(failed.is_err());
    assert!(rig.service.is_running());

    rig.devices.set_listing_failure(false);
    let summary = rig.service.sweep_now().await.unwrap();
    assert_eq!(summary.outcomes.len(), 1);

    rig.service.stop().await;
}
