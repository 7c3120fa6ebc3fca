//! Engine configuration.
//!
//! Plain struct with defaults plus environment overrides. Retry bounds are
//! deliberately configuration inputs rather than constants; deployments
//! differ on how aggressively a candidate is retried before the walk moves
//! on.

use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_INTERFACES: usize = 4;
pub const DEFAULT_COMMAND_POOL: usize = 32;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of interfaces the session arena holds
    pub max_interfaces: usize,
    /// Total commands (active + pending) the queue accepts before refusing
    /// submissions with NoResources
    pub command_pool_size: usize,
    /// Deadline for connect/reassociate commands
    pub connect_timeout: Duration,
    /// Deadline for disconnect and forced teardown commands
    pub disconnect_timeout: Duration,
    /// Deadline for AP start/stop commands
    pub ap_timeout: Duration,
    /// Watchdog interval for a firmware roam that never reaches a terminal
    /// event
    pub roam_watchdog: Duration,
    /// Same-candidate retries after a credential rejection
    pub credential_retry_limit: u32,
    /// Same-candidate retries after an association timeout, applied only to
    /// strong-authentication profiles
    pub assoc_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_interfaces: DEFAULT_MAX_INTERFACES,
            command_pool_size: DEFAULT_COMMAND_POOL,
            connect_timeout: Duration::from_secs(30),
            disconnect_timeout: Duration::from_secs(5),
            ap_timeout: Duration::from_secs(10),
            roam_watchdog: Duration::from_secs(4),
            credential_retry_limit: 1,
            assoc_retry_limit: 2,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden from `WLANROAM_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_usize("WLANROAM_MAX_INTERFACES") {
            config.max_interfaces = v;
        }
        if let Some(v) = env_usize("WLANROAM_COMMAND_POOL") {
            config.command_pool_size = v;
        }
        if let Some(v) = env_ms("WLANROAM_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = v;
        }
        if let Some(v) = env_ms("WLANROAM_DISCONNECT_TIMEOUT_MS") {
            config.disconnect_timeout = v;
        }
        if let Some(v) = env_ms("WLANROAM_AP_TIMEOUT_MS") {
            config.ap_timeout = v;
        }
        if let Some(v) = env_ms("WLANROAM_ROAM_WATCHDOG_MS") {
            config.roam_watchdog = v;
        }
        if let Some(v) = env_u32("WLANROAM_CREDENTIAL_RETRIES") {
            config.credential_retry_limit = v;
        }
        if let Some(v) = env_u32("WLANROAM_ASSOC_RETRIES") {
            config.assoc_retry_limit = v;
        }
        config
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_ms(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.credential_retry_limit, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.max_interfaces, DEFAULT_MAX_INTERFACES);
    }
}
