//! Centralized path configuration for nvprep.

use std::path::PathBuf;

/// System-wide configuration file location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/nvprep/server.json";

/// Get the server configuration file path.
///
/// Resolution order:
/// 1. `NVPREP_CONFIG` environment variable
/// 2. `/etc/nvprep/server.json` if it exists (system install)
/// 3. `~/.config/nvprep/server.json` for user-only installs
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("NVPREP_CONFIG") {
        return PathBuf::from(path);
    }

    let system_path = PathBuf::from(SYSTEM_CONFIG_PATH);
    if system_path.exists() {
        return system_path;
    }

    dirs::config_dir().map(|d| d.join("nvprep").join("server.json")).unwrap_or(system_path)
}
