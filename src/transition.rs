//! Status transition detection
//!
//! Pure classification of probe results against the previously recorded
//! device status. Holds no state and performs no side effects, so it is
//! safe to call concurrently for different devices.

use crate::{DeviceStatus, ProbeResult};

/// Result of comparing a probe against the previous device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub new_status: DeviceStatus,
    pub changed: bool,
}

/// Classify a probe result relative to the previous status.
///
/// A reachable device is `Online`, an unreachable one is `Offline` —
/// `Warning`, `Maintenance` and `Unknown` are never produced here, they
/// only appear as the *previous* status (set by manual actions) and are
/// left as soon as a probe completes.
pub fn classify(old: DeviceStatus, result: &ProbeResult) -> Transition {
    let new_status = if result.reachable {
        DeviceStatus::Online
    } else {
        DeviceStatus::Offline
    };

    Transition {
        new_status,
        changed: old != new_status,
    }
}
