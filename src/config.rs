//! Engine tuning knobs

use std::time::Duration;

use crate::types::FirmwareVersion;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 50;
pub const DEFAULT_TRANSFER_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long `execute` waits for the matching response
    pub response_timeout: Duration,
    /// Sleep between polls while waiting for a response
    pub poll_interval: Duration,
    /// Timeout handed to each transport read made by `poll`
    pub read_timeout_ms: u32,
    /// Inactivity window after which a block transfer is abandoned
    pub transfer_idle_timeout: Duration,
    /// Oldest events are dropped once this many are queued
    pub event_queue_capacity: usize,
    /// Version of the image the host is running
    pub host_version: FirmwareVersion,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            transfer_idle_timeout: DEFAULT_TRANSFER_IDLE_TIMEOUT,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            host_version: FirmwareVersion::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_read_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    pub fn with_transfer_idle_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_idle_timeout = timeout;
        self
    }

    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_host_version(mut self, version: FirmwareVersion) -> Self {
        self.host_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.response_timeout, Duration::from_secs(2));
        assert_eq!(config.transfer_idle_timeout, Duration::from_secs(30));
        assert_eq!(config.host_version, FirmwareVersion::new(0, 0, 0));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_response_timeout(Duration::from_millis(500))
            .with_event_queue_capacity(0)
            .with_host_version(FirmwareVersion::new(1, 4, 0));
        assert_eq!(config.response_timeout, Duration::from_millis(500));
        assert_eq!(config.event_queue_capacity, 1);
        assert_eq!(config.host_version.to_string(), "1.4.0");
    }
}
