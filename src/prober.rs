//! Reachability probing
//!
//! A probe is a single TCP connect against a device's address, bounded by a
//! timeout. There is no retry at this layer — retry policy belongs to the
//! scheduler's cadence, not to an individual probe.

use std::fmt;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::trace;

/// Errors raised before a probe touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The configured address does not parse as an IP address.
    /// The network is never attempted for such a device.
    InvalidAddress(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::InvalidAddress(addr) => {
                write!(f, "invalid device address: {addr}")
            }
        }
    }
}

impl std::error::Error for ProbeError {}

/// Result of a single reachability check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub reachable: bool,

    /// Round-trip time in milliseconds. `Some` iff `reachable`.
    pub latency_ms: Option<f64>,

    /// Failure description. `Some` iff not `reachable`.
    pub error: Option<String>,
}

impl ProbeOutcome {
    fn up(latency_ms: f64) -> Self {
        Self {
            reachable: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn down(reason: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency_ms: None,
            error: Some(reason.into()),
        }
    }
}

/// Check whether `address:port` is reachable within `timeout`.
///
/// A completed TCP handshake proves reachability, but so does an active
/// refusal: a RST reply means the host answered, only the port is closed.
/// Anything that produces no answer at all (timeout, unreachable routes)
/// counts as offline.
pub async fn probe(
    address: &str,
    port: u16,
    timeout: Duration,
) -> Result<ProbeOutcome, ProbeError> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| ProbeError::InvalidAddress(address.to_string()))?;

    let start = Instant::now();

    let outcome = match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(_stream)) => ProbeOutcome::up(elapsed_ms(start)),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            // The refusal itself is a live reply from the device.
            ProbeOutcome::up(elapsed_ms(start))
        }
        Ok(Err(e)) => ProbeOutcome::down(describe_error(&e)),
        Err(_) => ProbeOutcome::down("timeout"),
    };

    trace!(
        "probe {ip}:{port} -> reachable={} ({:?})",
        outcome.reachable, outcome.latency_ms
    );

    Ok(outcome)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn describe_error(e: &std::io::Error) -> String {
    match e.kind() {
        ErrorKind::HostUnreachable => "host unreachable".to_string(),
        ErrorKind::NetworkUnreachable => "network unreachable".to_string(),
        ErrorKind::TimedOut => "timeout".to_string(),
        _ => format!("network error: {e}"),
    }
}
