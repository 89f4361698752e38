//! Client config (strict parsing, same rules as the gateway's).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use pushwire_core::error::{PushwireError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Gateway origin, e.g. `http://127.0.0.1:4096`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Decoded envelopes buffered between the decode and dispatch tasks.
    #[serde(default = "default_dispatch_queue")]
    pub dispatch_queue: usize,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Control channel identifier sent with every `next` poll.
    #[serde(default = "default_connection_id")]
    pub connection_id: String,

    /// Per-request timeout for control calls. Must outlast the gateway's
    /// long-poll hold time.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Silence on the event stream after which the connection is treated
    /// as dead. Keep it a few gateway heartbeat intervals long.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            dispatch_queue: default_dispatch_queue(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            connection_id: default_connection_id(),
            request_timeout_ms: default_request_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(PushwireError::BadRequest(
                "base_url must start with http:// or https://".into(),
            ));
        }
        if self.dispatch_queue == 0 {
            return Err(PushwireError::BadRequest("dispatch_queue must be > 0".into()));
        }
        if self.backoff_initial_ms == 0 || self.backoff_initial_ms > self.backoff_max_ms {
            return Err(PushwireError::BadRequest(
                "backoff_initial_ms must be > 0 and <= backoff_max_ms".into(),
            ));
        }
        if self.connection_id.trim().is_empty() {
            return Err(PushwireError::BadRequest("connection_id must not be empty".into()));
        }
        if self.request_timeout_ms < 1000 {
            return Err(PushwireError::BadRequest("request_timeout_ms must be >= 1000".into()));
        }
        if self.idle_timeout_ms < 100 {
            return Err(PushwireError::BadRequest("idle_timeout_ms must be >= 100".into()));
        }
        Ok(())
    }

    /// Absolute URL for a gateway path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        PushwireError::Internal(format!("read config failed ({}): {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| PushwireError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

fn default_base_url() -> String {
    "http://127.0.0.1:4096".to_string()
}
fn default_dispatch_queue() -> usize {
    4096
}
fn default_backoff_initial_ms() -> u64 {
    100
}
fn default_backoff_max_ms() -> u64 {
    10_000
}
fn default_connection_id() -> String {
    "default".to_string()
}
fn default_request_timeout_ms() -> u64 {
    90_000
}
fn default_idle_timeout_ms() -> u64 {
    90_000
}
