//! PCI driver (re)binding through sysfs.
//!
//! A device is moved to a new driver by unbinding it from its current one,
//! pinning the target with `driver_override`, writing its address to the
//! target driver's `bind` file and finally clearing the override again.

use crate::backend::sysfs::device::PciDevice;
use crate::error::{NvprepError, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// VFIO-PCI driver name.
pub const VFIO_PCI_DRIVER: &str = "vfio-pci";

/// Generic UIO driver, used when VFIO is disabled.
pub const UIO_PCI_DRIVER: &str = "uio_pci_generic";

/// Kernel NVMe driver.
pub const NVME_DRIVER: &str = "nvme";

/// Kernel VMD driver.
pub const VMD_DRIVER: &str = "vmd";

/// Whether `driver` hands the device to userspace.
pub fn is_userspace_driver(driver: &str) -> bool {
    driver == VFIO_PCI_DRIVER || driver == UIO_PCI_DRIVER
}

/// Rebinds PCI devices under a sysfs `bus/pci` directory.
#[derive(Debug, Clone)]
pub struct DriverBinder {
    pci_bus_path: PathBuf,
    load_modules: bool,
}

impl DriverBinder {
    pub fn new(pci_bus_path: impl Into<PathBuf>, load_modules: bool) -> Self {
        Self { pci_bus_path: pci_bus_path.into(), load_modules }
    }

    fn driver_path(&self, driver: &str) -> PathBuf {
        self.pci_bus_path.join("drivers").join(driver)
    }

    /// Ensure the kernel module backing `driver` is loaded.
    pub fn ensure_driver(&self, driver: &str) -> Result<()> {
        if self.load_modules {
            // This is a no-op if already loaded
            match std::process::Command::new("modprobe").arg(driver).status() {
                Ok(status) if !status.success() => {
                    warn!(driver = %driver, "modprobe returned non-zero (may be built in)");
                }
                Ok(_) => {}
                Err(e) => warn!(driver = %driver, error = %e, "Failed to run modprobe"),
            }
        }

        let driver_path = self.driver_path(driver);
        if !driver_path.exists() {
            return Err(NvprepError::DriverBind {
                pci_address: "-".to_string(),
                driver: driver.to_string(),
                reason: format!("driver not available at {}", driver_path.display()),
            });
        }

        Ok(())
    }

    /// Bind `device` to `driver`.
    ///
    /// Returns `false` if the device was already bound to it.
    pub fn bind(&self, device: &PciDevice, driver: &str) -> Result<bool> {
        if device.is_bound_to(driver) {
            debug!(address = %device.address, driver = %driver, "Device already bound");
            return Ok(false);
        }

        if let Some(current) = &device.driver {
            self.unbind_from_driver(&device.address, current)?;
        }

        let override_path = device.sysfs_path.join("driver_override");
        write_sysfs(&override_path, driver)?;

        let bind_path = self.driver_path(driver).join("bind");
        debug!(address = %device.address, driver = %driver, "Binding to driver");
        let bound = fs::write(&bind_path, &device.address);

        // Clear the override so later probes behave normally
        if let Err(e) = fs::write(&override_path, "\n") {
            warn!(address = %device.address, error = %e, "Failed to clear driver_override");
        }

        if let Err(e) = bound {
            // Check if device is now bound (may have been auto-probed)
            let refreshed = device.refresh()?;
            if !refreshed.is_bound_to(driver) {
                return Err(NvprepError::DriverBind {
                    pci_address: device.address.clone(),
                    driver: driver.to_string(),
                    reason: e.to_string(),
                });
            }
            debug!(address = %device.address, driver = %driver, "Device auto-bound");
        }

        info!(
            address = %device.address,
            from = ?device.driver,
            to = %driver,
            "Device driver rebound"
        );
        Ok(true)
    }

    /// Unbind device from its current driver.
    fn unbind_from_driver(&self, pci_address: &str, driver: &str) -> Result<()> {
        let unbind_path = self.driver_path(driver).join("unbind");

        debug!(address = %pci_address, driver = %driver, "Unbinding from driver");

        match fs::write(&unbind_path, pci_address) {
            Ok(()) => Ok(()),
            // Driver may have been unloaded, not an error
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(driver = %driver, "Driver unbind file missing");
                Ok(())
            }
            Err(e) => Err(NvprepError::IoError { path: unbind_path, source: e }),
        }
    }
}

fn write_sysfs(path: &PathBuf, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|e| NvprepError::IoError { path: path.clone(), source: e })
}
