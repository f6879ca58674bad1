use std::path::Path;
use std::time::Duration;

use rnsnow_transport::{validate_channel, MAX_CHANNEL, MIN_CHANNEL};
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::fragment::{DEFAULT_REASSEMBLY_CAPACITY, DEFAULT_REASSEMBLY_TIMEOUT};
use crate::packet::{GroupId, DEFAULT_GROUP_ID};

/// Channel used when nothing better is found.
pub const DEFAULT_CHANNEL: u8 = 1;

/// Channels probed before the default one.
pub const DEFAULT_PREFERRED_CHANNELS: [u8; 2] = [6, 11];

/// Controls the channel discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Run discovery when the bridge starts.
    pub enabled: bool,
    /// How long to listen for acks after each probe.
    pub listen_window_ms: u64,
    /// Probe rounds sent on each candidate channel.
    pub probes_per_channel: u32,
    /// Acks on one channel that end the scan immediately.
    pub early_accept_threshold: u32,
    /// Full scans attempted before falling back to the default channel.
    pub max_attempts: u32,
    /// Wait after the first scan with no responses. Doubles per attempt.
    pub backoff_ms: u64,
    /// Upper bound for the backoff wait.
    pub backoff_max_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_window_ms: 500,
            probes_per_channel: 3,
            early_accept_threshold: 3,
            max_attempts: 3,
            backoff_ms: 1000,
            backoff_max_ms: 8000,
        }
    }
}

impl DiscoveryConfig {
    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_window_ms)
    }

    /// Backoff before scan number `attempt + 1`, where `attempt >= 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self
            .backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_window_ms == 0 {
            return Err(LinkError::Config(
                "discovery.listen_window_ms must be greater than 0".into(),
            ));
        }
        if self.probes_per_channel == 0 {
            return Err(LinkError::Config(
                "discovery.probes_per_channel must be greater than 0".into(),
            ));
        }
        if self.early_accept_threshold == 0 {
            return Err(LinkError::Config(
                "discovery.early_accept_threshold must be greater than 0".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(LinkError::Config(
                "discovery.max_attempts must be greater than 0".into(),
            ));
        }
        if self.backoff_max_ms < self.backoff_ms {
            return Err(LinkError::Config(
                "discovery.backoff_max_ms must not be less than discovery.backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Link-layer configuration.
///
/// Loaded from JSON; every field is optional and falls back to its default.
/// A configuration is only ever applied whole, between discovery runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Group id stamped on every packet; others are ignored.
    pub group_id: GroupId,
    /// Operating channel, and the fallback when discovery finds nobody.
    pub channel: u8,
    /// Channels probed first, in order.
    pub preferred_channels: Vec<u8>,
    /// Age after which a partial frame is dropped.
    pub reassembly_timeout_ms: u64,
    /// Partial frames held at once.
    pub reassembly_capacity: usize,
    /// Extra attempts for a failed radio send.
    pub send_retries: u32,
    /// Peers not heard from for this long are forgotten.
    pub peer_timeout_ms: u64,
    /// Broadcast a ping this often, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,
    pub discovery: DiscoveryConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            group_id: DEFAULT_GROUP_ID,
            channel: DEFAULT_CHANNEL,
            preferred_channels: DEFAULT_PREFERRED_CHANNELS.to_vec(),
            reassembly_timeout_ms: DEFAULT_REASSEMBLY_TIMEOUT.as_millis() as u64,
            reassembly_capacity: DEFAULT_REASSEMBLY_CAPACITY,
            send_retries: 2,
            peer_timeout_ms: 60_000,
            ping_interval_ms: None,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a JSON configuration.
    pub fn parse(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_channel(self.channel).map_err(|_| {
            LinkError::Config(format!(
                "channel {} outside {MIN_CHANNEL}..={MAX_CHANNEL}",
                self.channel
            ))
        })?;
        for &ch in &self.preferred_channels {
            validate_channel(ch).map_err(|_| {
                LinkError::Config(format!(
                    "preferred channel {ch} outside {MIN_CHANNEL}..={MAX_CHANNEL}"
                ))
            })?;
        }
        if self.reassembly_timeout_ms == 0 {
            return Err(LinkError::Config(
                "reassembly_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.reassembly_capacity == 0 {
            return Err(LinkError::Config(
                "reassembly_capacity must be greater than 0".into(),
            ));
        }
        if self.peer_timeout_ms == 0 {
            return Err(LinkError::Config(
                "peer_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.ping_interval_ms == Some(0) {
            return Err(LinkError::Config(
                "ping_interval_ms must be greater than 0 when set".into(),
            ));
        }
        self.discovery.validate()
    }

    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_millis(self.reassembly_timeout_ms)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms.map(Duration::from_millis)
    }
}
