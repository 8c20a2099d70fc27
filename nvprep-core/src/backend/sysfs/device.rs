//! PCI device abstraction over sysfs.

use crate::error::{NvprepError, Result};
use crate::types::pci::is_valid_pci_address;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// PCI device class codes.
pub mod class {
    /// Non-volatile memory controller, NVM Express programming interface
    pub const NVME: &str = "0x010802";
}

/// Known vendor IDs.
pub mod vendor {
    pub const INTEL: &str = "8086";
}

/// Intel VMD endpoint device IDs.
const VMD_DEVICE_IDS: &[&str] = &["201d", "28c0", "467f", "4c3d", "7d0b", "ad0b", "9a0b"];

/// PCI device information.
#[derive(Debug, Clone)]
pub struct PciDevice {
    /// PCI address (e.g., "0000:01:00.0")
    pub address: String,
    /// Vendor ID (e.g., "8086" for Intel)
    pub vendor_id: String,
    /// Device ID (e.g., "0a54")
    pub device_id: String,
    /// Device class (e.g., "0x010802" for NVMe)
    pub class: String,
    /// Current driver (None if unbound)
    pub driver: Option<String>,
    /// IOMMU group ID
    pub iommu_group: Option<String>,
    /// NUMA node (-1 if not applicable)
    pub numa_node: i32,
    /// Sysfs path to this device
    pub sysfs_path: PathBuf,
}

impl PciDevice {
    /// Read device information from its sysfs directory.
    pub fn from_sysfs(sysfs_path: &Path) -> Result<Self> {
        let address = sysfs_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !is_valid_pci_address(&address) {
            return Err(NvprepError::InvalidPciAddress { address });
        }
        if !sysfs_path.exists() {
            return Err(NvprepError::DeviceNotFound { pci_address: address });
        }

        let vendor_id = read_sysfs_value(&sysfs_path.join("vendor"))?
            .trim_start_matches("0x")
            .to_lowercase();
        let device_id = read_sysfs_value(&sysfs_path.join("device"))?
            .trim_start_matches("0x")
            .to_lowercase();
        let class = read_sysfs_value(&sysfs_path.join("class"))?;

        let driver = read_link_name(&sysfs_path.join("driver"));
        let iommu_group = read_link_name(&sysfs_path.join("iommu_group"));
        let numa_node = read_numa_node(sysfs_path);

        Ok(Self {
            address,
            vendor_id,
            device_id,
            class,
            driver,
            iommu_group,
            numa_node,
            sysfs_path: sysfs_path.to_path_buf(),
        })
    }

    /// Re-read the device, e.g. after a driver change.
    pub fn refresh(&self) -> Result<Self> {
        Self::from_sysfs(&self.sysfs_path)
    }

    /// Check if this device is an NVMe controller.
    pub fn is_nvme(&self) -> bool {
        self.class.starts_with(class::NVME)
    }

    /// Check if this device is a VMD endpoint.
    pub fn is_vmd(&self) -> bool {
        self.vendor_id == vendor::INTEL && VMD_DEVICE_IDS.contains(&self.device_id.as_str())
    }

    pub fn is_bound_to(&self, driver: &str) -> bool {
        self.driver.as_deref() == Some(driver)
    }
}

/// List every PCI device under `devices_root`, sorted by address.
///
/// Entries that are not valid devices are skipped.
pub fn list_devices(devices_root: &Path) -> Result<Vec<PciDevice>> {
    if !devices_root.exists() {
        return Err(NvprepError::Internal(format!(
            "PCI sysfs not found at {}",
            devices_root.display()
        )));
    }

    let mut devices = Vec::new();
    for entry in fs::read_dir(devices_root)
        .map_err(|e| NvprepError::IoError { path: devices_root.to_path_buf(), source: e })?
    {
        let entry = entry.map_err(NvprepError::internal)?;
        match PciDevice::from_sysfs(&entry.path()) {
            Ok(d) => devices.push(d),
            Err(e) => debug!(path = %entry.path().display(), error = %e, "Skipping PCI entry"),
        }
    }

    devices.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(devices)
}

/// Read a value from a sysfs file.
pub(crate) fn read_sysfs_value(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| NvprepError::IoError { path: path.to_path_buf(), source: e })
}

/// Resolve a sysfs symlink (driver, iommu_group) to its final component.
fn read_link_name(link: &Path) -> Option<String> {
    fs::read_link(link)
        .ok()
        .and_then(|target| target.file_name().map(|n| n.to_string_lossy().to_string()))
}

/// Read the NUMA node for a device.
fn read_numa_node(device_path: &Path) -> i32 {
    fs::read_to_string(device_path.join("numa_node"))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(-1)
}
