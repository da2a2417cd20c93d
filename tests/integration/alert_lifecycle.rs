//! Alert lifecycle tests across the operator-facing operations

use network_monitoring::alerts::{AlertError, AlertId, AlertManager, AlertStatus};
use network_monitoring::DeviceClass;
use assert_matches::assert_matches;

use crate::helpers::*;

/// Open one alert per device by sweeping a fleet of unreachable devices.
async fn open_alerts(rig: &TestRig) -> Vec<AlertId> {
    rig.service.sweep_now().await.unwrap();
    let mut ids: Vec<AlertId> = rig.alerts.all_alerts().await.iter().map(|a| a.id).collect();
    ids.sort_unstable();
    ids
}

fn offline_fleet(count: usize) -> Vec<network_monitoring::Device> {
    (0..count)
        .map(|i| {
            let mut device = offline_device(&format!("dev-{i}"), DeviceClass::Router);
            // Distinct TEST-NET-1 hosts so probes stay per-device.
            device.address = format!("192.0.2.{}", i + 1);
            device
        })
        .collect()
}

#[tokio::test]
async fn test_operator_acknowledge_then_resolve() {
    let rig = build_rig(offline_fleet(1), RecordingTransport::new(), vec![]);
    let ids = open_alerts(&rig).await;
    let manager = AlertManager::new(rig.alerts.clone());

    let acked = manager
        .acknowledge(ids[0], "operator", Some("investigating"))
        .await
        .unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(acked.acknowledgement_note.as_deref(), Some("investigating"));

    let resolved = manager
        .resolve(ids[0], "operator", Some("power restored"))
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.resolved_by.as_deref(), Some("operator"));
}

#[tokio::test]
async fn test_bulk_acknowledge_partial_success_without_rollback() {
    let rig = build_rig(offline_fleet(5), RecordingTransport::new(), vec![]);
    let ids = open_alerts(&rig).await;
    assert_eq!(ids.len(), 5);

    let manager = AlertManager::new(rig.alerts.clone());

    // One alert of the batch is already acknowledged.
    manager.acknowledge(ids[1], "operator", None).await.unwrap();

    let outcome = manager
        .bulk_acknowledge(&ids, "operator", Some("bulk ack"))
        .await;

    assert_eq!(outcome.succeeded, 4);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, ids[1]);
    assert_matches!(outcome.failures[0].1, AlertError::InvalidTransition { .. });

    // The four successes stand; nothing was rolled back.
    let acknowledged = rig
        .alerts
        .all_alerts()
        .await
        .into_iter()
        .filter(|a| a.status == AlertStatus::Acknowledged)
        .count();
    assert_eq!(acknowledged, 5);
}

#[tokio::test]
async fn test_bulk_resolve_from_mixed_states() {
    let rig = build_rig(offline_fleet(3), RecordingTransport::new(), vec![]);
    let ids = open_alerts(&rig).await;
    let manager = AlertManager::new(rig.alerts.clone());

    manager.acknowledge(ids[0], "operator", None).await.unwrap();
    manager.resolve(ids[1], "operator", None).await.unwrap();

    // ACTIVE and ACKNOWLEDGED resolve fine; RESOLVED fails.
    let outcome = manager.bulk_resolve(&ids, "operator", None).await;
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, ids[1]);
}

#[tokio::test]
async fn test_reoccurrence_after_acknowledgement_opens_new_alert() {
    let rig = build_rig(
        offline_fleet(1),
        RecordingTransport::new(),
        vec![email_recipient("ops@example.com")],
    );
    let ids = open_alerts(&rig).await;
    let manager = AlertManager::new(rig.alerts.clone());

    manager.acknowledge(ids[0], "operator", None).await.unwrap();

    // The device is still down on the next sweep: the acknowledged alert
    // stands as history and a fresh ACTIVE alert is opened and notified.
    rig.service.sweep_now().await.unwrap();
    rig.dispatcher.drain().await;

    let alerts = rig.alerts.all_alerts().await;
    assert_eq!(alerts.len(), 2);

    let old = alerts.iter().find(|a| a.id == ids[0]).unwrap();
    assert_eq!(old.status, AlertStatus::Acknowledged);
    assert_eq!(old.occurrence_count, 1);

    let fresh = alerts.iter().find(|a| a.id != ids[0]).unwrap();
    assert_eq!(fresh.status, AlertStatus::Active);
    assert_eq!(fresh.occurrence_count, 1);

    assert_eq!(rig.transport.sent_count(), 2);
}
