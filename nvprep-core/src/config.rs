//! Server configuration consumed by the NVMe commands.
//!
//! The configuration is loaded once per invocation and is read-only from then
//! on. Running with `--ignore-config` is modelled as having no configuration
//! at all (`Option<ServerConfig>` is `None`).

use crate::error::{NvprepError, Result};
use crate::paths;
use crate::types::pci::PciAddressList;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Minimum number of hugepages allocated when preparing devices for a scan or
/// an unsized prepare. Enough for device auto-detection, independent of the
/// engine's runtime memory needs.
pub const SCAN_MIN_HUGEPAGE_COUNT: u64 = 128;

/// Class of a storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Nvme,
    File,
    Kdev,
    Ram,
}

/// One storage tier of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub class: StorageClass,
    /// Bdev device list. PCI addresses for `nvme` tiers, paths otherwise.
    #[serde(default)]
    pub bdev_list: Vec<String>,
}

impl TierConfig {
    pub fn new(class: StorageClass) -> Self {
        Self { class, bdev_list: Vec::new() }
    }

    pub fn with_bdev_list<S: Into<String>>(mut self, devices: impl IntoIterator<Item = S>) -> Self {
        self.bdev_list = devices.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: Vec<TierConfig>,
}

impl EngineConfig {
    pub fn with_storage(mut self, tiers: impl IntoIterator<Item = TierConfig>) -> Self {
        self.storage = tiers.into_iter().collect();
        self
    }
}

/// Persistent server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub engines: Vec<EngineConfig>,
    /// Global bdev exclude list (PCI addresses never touched)
    pub bdev_exclude: Vec<String>,
    /// Hugepage count for engine runtime. Not used when sizing prepare.
    pub nr_hugepages: u64,
    pub disable_hugepages: bool,
    /// None means not specified, which leaves VMD enabled
    pub disable_vmd: Option<bool>,
    pub disable_vfio: bool,
}

impl ServerConfig {
    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NvprepError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let cfg: Self = serde_json::from_str(&content).map_err(|e| NvprepError::ConfigLoad {
            path: path.to_path_buf(),
            reason: format!("parse: {}", e),
        })?;
        cfg.validate()?;

        debug!(path = %path.display(), engines = cfg.engines.len(), "Loaded server config");
        Ok(cfg)
    }

    /// Load from the default location, returning `None` if no file exists there.
    pub fn load_default() -> Result<Option<Self>> {
        let path = Self::config_path();
        if !path.exists() {
            debug!(path = %path.display(), "No server config found");
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        paths::config_path()
    }

    /// Check that NVMe tiers only list valid PCI addresses.
    pub fn validate(&self) -> Result<()> {
        for (idx, engine) in self.engines.iter().enumerate() {
            for tier in engine.storage.iter().filter(|t| t.class == StorageClass::Nvme) {
                PciAddressList::from_strings(&tier.bdev_list).map_err(|e| {
                    NvprepError::InvalidConfig { reason: format!("engine {}: {}", idx, e) }
                })?;
            }
        }
        PciAddressList::from_strings(&self.bdev_exclude).map_err(|e| {
            NvprepError::InvalidConfig { reason: format!("bdev_exclude: {}", e) }
        })?;
        Ok(())
    }

    /// Device lists of all NVMe tiers, in engine then tier order.
    pub fn nvme_bdev_list(&self) -> impl Iterator<Item = &String> {
        self.engines
            .iter()
            .flat_map(|e| e.storage.iter())
            .filter(|t| t.class == StorageClass::Nvme)
            .flat_map(|t| t.bdev_list.iter())
    }

    pub fn with_engines(mut self, engines: impl IntoIterator<Item = EngineConfig>) -> Self {
        self.engines = engines.into_iter().collect();
        self
    }

    pub fn with_bdev_exclude<S: Into<String>>(
        mut self,
        devices: impl IntoIterator<Item = S>,
    ) -> Self {
        self.bdev_exclude = devices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nr_hugepages(mut self, count: u64) -> Self {
        self.nr_hugepages = count;
        self
    }

    pub fn with_disable_hugepages(mut self, disabled: bool) -> Self {
        self.disable_hugepages = disabled;
        self
    }

    pub fn with_disable_vmd(mut self, disabled: bool) -> Self {
        self.disable_vmd = Some(disabled);
        self
    }

    pub fn with_disable_vfio(mut self, disabled: bool) -> Self {
        self.disable_vfio = disabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(
            &path,
            r#"{
                "engines": [
                    {"storage": [
                        {"class": "ram"},
                        {"class": "nvme", "bdev_list": ["0000:81:00.0", "0000:82:00.0"]}
                    ]},
                    {"storage": [{"class": "nvme", "bdev_list": ["0000:83:00.0"]}]}
                ],
                "bdev_exclude": ["0000:84:00.0"],
                "nr_hugepages": 4096,
                "disable_vmd": true
            }"#,
        )
        .unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.engines.len(), 2);
        assert_eq!(cfg.nr_hugepages, 4096);
        assert_eq!(cfg.disable_vmd, Some(true));
        assert!(!cfg.disable_hugepages);
        let list: Vec<&String> = cfg.nvme_bdev_list().collect();
        assert_eq!(list, vec!["0000:81:00.0", "0000:82:00.0", "0000:83:00.0"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/nvprep.json")).unwrap_err();
        assert!(err.to_string().starts_with("failed to load config from"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_bad_tier_address() {
        let cfg = ServerConfig::default().with_engines([EngineConfig::default()
            .with_storage([TierConfig::new(StorageClass::Nvme).with_bdev_list(["0000:00:00"])])]);
        assert!(matches!(cfg.validate(), Err(NvprepError::InvalidConfig { .. })));
    }

    #[test]
    fn test_validate_ignores_non_nvme_tiers() {
        let cfg = ServerConfig::default().with_engines([EngineConfig::default()
            .with_storage([TierConfig::new(StorageClass::File).with_bdev_list(["/tmp/bdev1"])])]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.nvme_bdev_list().count(), 0);
    }
}
