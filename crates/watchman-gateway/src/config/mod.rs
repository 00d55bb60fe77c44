//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use watchman_core::error::{Result, WatchmanError};

pub use schema::{GatewayConfig, GatewaySection, PresenceSection, UserConfig};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "WATCHMAN_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "watchman.yaml";

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| WatchmanError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| WatchmanError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load from `$WATCHMAN_CONFIG`, falling back to `watchman.yaml`.
pub fn load_from_env() -> Result<GatewayConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from_file(&path)
}
