//! Network configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Tunables for the coordinator, its delivery lanes and spawned actors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Mailbox capacity for newly spawned actors
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Heartbeat and sweep period in milliseconds (0 disables both tickers)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Consecutive missed sweeps before an actor is unreachable
    #[serde(default = "default_heartbeat_miss_threshold")]
    pub heartbeat_miss_threshold: u32,

    /// How long a put waits for sync link acknowledgements
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Delivery attempts per message before the link degrades
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Backoff multiplier between retries
    #[serde(default = "default_retry_factor")]
    pub retry_factor: u32,

    /// Envelopes a delivery lane holds before routing reports backpressure
    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,

    /// Channel buffer size for coordinator requests
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Channel buffer size for actor commands
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_mailbox_capacity() -> usize {
    debug!("default_mailbox_capacity: called");
    256
}

fn default_heartbeat_interval_ms() -> u64 {
    debug!("default_heartbeat_interval_ms: called");
    2000
}

fn default_heartbeat_miss_threshold() -> u32 {
    debug!("default_heartbeat_miss_threshold: called");
    3
}

fn default_sync_timeout_ms() -> u64 {
    debug!("default_sync_timeout_ms: called");
    5000
}

fn default_retry_max_attempts() -> u32 {
    debug!("default_retry_max_attempts: called");
    5
}

fn default_retry_base_ms() -> u64 {
    debug!("default_retry_base_ms: called");
    100
}

fn default_retry_factor() -> u32 {
    debug!("default_retry_factor: called");
    2
}

fn default_lane_capacity() -> usize {
    debug!("default_lane_capacity: called");
    256
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    1024
}

fn default_command_buffer() -> usize {
    debug!("default_command_buffer: called");
    64
}

impl Default for NetworkConfig {
    fn default() -> Self {
        debug!("NetworkConfig::default: called");
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_miss_threshold: default_heartbeat_miss_threshold(),
            sync_timeout_ms: default_sync_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_factor: default_retry_factor(),
            lane_capacity: default_lane_capacity(),
            channel_buffer: default_channel_buffer(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl NetworkConfig {
    /// Heartbeat period, `None` when heartbeats are driven manually
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    /// Settings for deterministic tests: no background tickers, short retries
    pub fn manual() -> Self {
        Self {
            heartbeat_interval_ms: 0,
            sync_timeout_ms: 1000,
            retry_base_ms: 5,
            ..Default::default()
        }
    }
}
