const DEFAULT_PROBE_PORT: u16 = 80;

pub fn get_default_probe_port() -> u16 {
    DEFAULT_PROBE_PORT
}

const MONITOR_INTERVAL: &str = "MONITOR_INTERVAL";

/// Sweep cadence override in seconds, if set in the environment.
pub fn get_interval_override() -> Option<u64> {
    let interval_from_env = std::env::var(MONITOR_INTERVAL);
    interval_from_env.ok().and_then(|res| res.parse().ok())
}

const NOTIFY_GATEWAY: &str = "NOTIFY_GATEWAY";

/// Notification gateway URL from the environment, if set.
pub fn get_gateway() -> Option<String> {
    let gateway_from_env = std::env::var(NOTIFY_GATEWAY);
    gateway_from_env.ok()
}
