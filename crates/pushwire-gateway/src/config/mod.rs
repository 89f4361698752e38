//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use pushwire_core::error::{Result, PushwireError};

pub use schema::{BusSection, ControlSection, GatewayConfig, GatewaySection};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<GatewayConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        PushwireError::Internal(format!("read config failed ({}): {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| PushwireError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
