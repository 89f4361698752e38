use std::time::Duration;

use serde::Deserialize;
use pushwire_core::error::{Result, PushwireError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub bus: BusSection,

    #[serde(default)]
    pub control: ControlSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            bus: BusSection::default(),
            control: ControlSection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PushwireError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.bus.validate()?;
        self.control.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Body limit for `POST /v1/publish`.
    #[serde(default = "default_max_publish_bytes")]
    pub max_publish_bytes: usize,

    /// A socket write making no progress for this long fails the connection.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_publish_bytes: default_max_publish_bytes(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=300_000).contains(&self.heartbeat_interval_ms) {
            return Err(PushwireError::BadRequest(
                "gateway.heartbeat_interval_ms must be between 1000 and 300000".into(),
            ));
        }
        if self.max_publish_bytes == 0 {
            return Err(PushwireError::BadRequest(
                "gateway.max_publish_bytes must be positive".into(),
            ));
        }
        if !(100..=600_000).contains(&self.write_timeout_ms) {
            return Err(PushwireError::BadRequest(
                "gateway.write_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusSection {
    /// Frames buffered per subscriber before it is evicted.
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

impl BusSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=1_000_000).contains(&self.subscriber_queue) {
            return Err(PushwireError::BadRequest(
                "bus.subscriber_queue must be between 1 and 1000000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSection {
    /// How long `next` holds a request open when nothing is queued.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// How long a submitter waits for the consumer's result.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl ControlSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=300_000).contains(&self.poll_timeout_ms) {
            return Err(PushwireError::BadRequest(
                "control.poll_timeout_ms must be between 100 and 300000".into(),
            ));
        }
        if self.response_timeout_ms < 100 {
            return Err(PushwireError::BadRequest(
                "control.response_timeout_ms must be at least 100".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

fn default_listen() -> String {
    "127.0.0.1:4096".into()
}
fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_max_publish_bytes() -> usize {
    64 * 1024 * 1024
}
fn default_write_timeout_ms() -> u64 {
    30_000
}
fn default_subscriber_queue() -> usize {
    1024
}
fn default_poll_timeout_ms() -> u64 {
    30_000
}
fn default_response_timeout_ms() -> u64 {
    60_000
}
