//! CLI command implementations

pub mod nvme;

use anyhow::Result;
use nvprep_core::ServerConfig;
use std::path::Path;
use tracing::info;

/// Load the server config for this invocation.
///
/// An explicit path must exist. Without one the default location is tried
/// and a missing file means running without config.
pub fn load_config(path: Option<&Path>, ignore: bool) -> Result<Option<ServerConfig>> {
    if ignore {
        info!("Ignoring server config");
        return Ok(None);
    }

    let config = match path {
        Some(path) => Some(ServerConfig::load(path)?),
        None => ServerConfig::load_default()?,
    };
    if config.is_none() {
        info!("No server config found, using defaults");
    }
    Ok(config)
}
