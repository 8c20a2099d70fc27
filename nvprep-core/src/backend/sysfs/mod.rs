//! Bdev backend that works directly on procfs/sysfs.
//!
//! # Operations
//!
//! - **clean**: remove stale hugepage files and PCI lockfiles
//! - **prepare**: size the node 0 hugepage pool, bind NVMe controllers (and
//!   VMD endpoints when requested) to `vfio-pci`, or `uio_pci_generic` when
//!   VFIO is disabled, and hand VFIO group nodes to the target user
//! - **reset**: bind userspace-owned controllers back to `nvme`, VMD
//!   endpoints back to `vmd`
//! - **scan**: enumerate NVMe controllers
//!
//! All paths hang off a configurable root so the backend can run against a
//! fake tree.

mod clean;
mod device;
mod driver;
mod hugepages;

pub use clean::address_selected;
pub use device::PciDevice;
pub use driver::{NVME_DRIVER, UIO_PCI_DRIVER, VFIO_PCI_DRIVER, VMD_DRIVER};

use crate::backend::BdevBackend;
use crate::error::{NvprepError, Result};
use crate::host::{lookup_user, ROOT_USER};
use crate::meminfo::read_mem_info;
use crate::types::bdev::{
    BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse, BdevScanRequest, BdevScanResponse,
    HugeNodes, NvmeController,
};
use async_trait::async_trait;
use device::{list_devices, read_sysfs_value};
use driver::{is_userspace_driver, DriverBinder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Backend operating on the host's sysfs.
#[derive(Debug, Clone)]
pub struct SysfsBackend {
    root: PathBuf,
    binder: DriverBinder,
}

impl Default for SysfsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsBackend {
    /// Backend for the running system. Loads driver modules on demand.
    pub fn new() -> Self {
        Self::build(PathBuf::from("/"), true)
    }

    /// Backend rooted at `root` instead of `/`. Never runs modprobe.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::build(root.into(), false)
    }

    fn build(root: PathBuf, load_modules: bool) -> Self {
        let binder = DriverBinder::new(root.join("sys/bus/pci"), load_modules);
        Self { root, binder }
    }

    fn sys_root(&self) -> PathBuf {
        self.root.join("sys")
    }

    fn devices_root(&self) -> PathBuf {
        self.root.join("sys/bus/pci/devices")
    }

    fn hugepage_size_kib(&self) -> u64 {
        match read_mem_info(&self.root.join("proc/meminfo")) {
            Ok(mi) if mi.hugepage_size_kib > 0 => mi.hugepage_size_kib,
            Ok(_) => hugepages::DEFAULT_HUGEPAGE_SIZE_KIB,
            Err(e) => {
                warn!(error = %e, "Unable to read hugepage size, using default");
                hugepages::DEFAULT_HUGEPAGE_SIZE_KIB
            }
        }
    }

    fn selected_devices<F>(&self, req: &BdevPrepareRequest, want: F) -> Result<Vec<PciDevice>>
    where
        F: Fn(&PciDevice) -> bool,
    {
        let allow = req.pci_allow_list.as_ref();
        let block = req.pci_block_list.as_ref();
        Ok(list_devices(&self.devices_root())?
            .into_iter()
            .filter(|d| want(d) && address_selected(&d.address, allow, block))
            .collect())
    }

    fn clean(&self, req: &BdevPrepareRequest, any_lockfiles: bool) -> Result<BdevPrepareResponse> {
        let hugepage_files =
            clean::clean_hugepage_files(&self.root.join("dev/hugepages"), &self.root.join("proc"))?;
        let lockfiles = clean::clean_lockfiles(
            &self.root.join("var/tmp"),
            req.pci_allow_list.as_ref(),
            req.pci_block_list.as_ref(),
            any_lockfiles,
        )?;

        info!(hugepage_files, lockfiles, "Removed stale bdev state");
        Ok(BdevPrepareResponse::default())
    }

    fn prepare_devices(
        &self,
        req: &BdevPrepareRequest,
        huge_nodes: HugeNodes,
        enable_vmd: bool,
    ) -> Result<BdevPrepareResponse> {
        let owner = match req.target_user.as_deref() {
            Some(user) if user != ROOT_USER && !req.disable_vfio => Some(lookup_user(user)?),
            _ => None,
        };

        hugepages::set_node_hugepages(&self.sys_root(), huge_nodes, self.hugepage_size_kib())?;

        let driver = if req.disable_vfio { UIO_PCI_DRIVER } else { VFIO_PCI_DRIVER };
        let targets = self.selected_devices(req, |d| d.is_nvme() || (enable_vmd && d.is_vmd()))?;
        if targets.is_empty() {
            info!("No NVMe devices selected for prepare");
            return Ok(BdevPrepareResponse::default());
        }

        self.binder.ensure_driver(driver)?;

        let mut resp = BdevPrepareResponse::default();
        for dev in &targets {
            self.binder.bind(dev, driver)?;
            resp.vmd_prepared |= dev.is_vmd();

            if let (Some(ids), Some(group)) = (owner, dev.iommu_group.as_deref()) {
                let group_path = self.root.join("dev/vfio").join(group);
                if group_path.exists() {
                    std::os::unix::fs::chown(&group_path, Some(ids.uid), Some(ids.gid))
                        .map_err(|e| NvprepError::IoError { path: group_path.clone(), source: e })?;
                    debug!(group = %group, uid = ids.uid, "VFIO group ownership handed over");
                }
            }
        }

        info!(devices = targets.len(), driver = %driver, "Devices prepared");
        Ok(resp)
    }

    fn reset_devices(
        &self,
        req: &BdevPrepareRequest,
        enable_vmd: bool,
    ) -> Result<BdevPrepareResponse> {
        let targets = self.selected_devices(req, |d| {
            (d.is_nvme() || (enable_vmd && d.is_vmd()))
                && d.driver.as_deref().is_some_and(is_userspace_driver)
        })?;

        let mut resp = BdevPrepareResponse::default();
        for dev in &targets {
            let kernel_driver = if dev.is_vmd() { VMD_DRIVER } else { NVME_DRIVER };
            self.binder.bind(dev, kernel_driver)?;
            resp.vmd_prepared |= dev.is_vmd();
        }

        info!(devices = targets.len(), vmd_prepared = resp.vmd_prepared, "Devices reset");
        Ok(resp)
    }

    fn scan_devices(&self, req: &BdevScanRequest) -> Result<BdevScanResponse> {
        let controllers = list_devices(&self.devices_root())?
            .into_iter()
            .filter(|d| d.is_nvme())
            .filter(|d| req.device_list.as_ref().map_or(true, |l| l.contains_str(&d.address)))
            .map(|d| controller_from_device(&d))
            .collect::<Result<Vec<_>>>()?;

        debug!(count = controllers.len(), "Scanned NVMe controllers");
        Ok(BdevScanResponse { controllers })
    }
}

/// Build a controller description, pulling identify strings from the kernel
/// driver's class directory when the device is kernel-bound.
fn controller_from_device(dev: &PciDevice) -> Result<NvmeController> {
    let class_dir = kernel_controller_dir(&dev.sysfs_path);
    let attr = |name: &str| {
        class_dir
            .as_ref()
            .and_then(|dir| read_sysfs_value(&dir.join(name)).ok())
            .unwrap_or_default()
    };

    Ok(NvmeController {
        pci_addr: dev.address.parse()?,
        model: attr("model"),
        serial: attr("serial"),
        fw_rev: attr("firmware_rev"),
        vendor_id: dev.vendor_id.clone(),
        device_id: dev.device_id.clone(),
        socket_id: dev.numa_node,
        driver: dev.driver.clone(),
    })
}

fn kernel_controller_dir(device_path: &Path) -> Option<PathBuf> {
    let nvme_dir = device_path.join("nvme");
    fs::read_dir(nvme_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.file_name().is_some_and(|n| n.to_string_lossy().starts_with("nvme")))
}

// Driver binds can block for seconds, so sysfs work runs off the async threads
#[async_trait]
impl BdevBackend for SysfsBackend {
    #[instrument(skip(self), fields(op = req.op.name()))]
    async fn prepare(&self, req: &BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        let backend = self.clone();
        let req = req.clone();
        tokio::task::spawn_blocking(move || match req.op {
            BdevPrepareOp::Clean { any_lockfiles } => backend.clean(&req, any_lockfiles),
            BdevPrepareOp::Prepare { huge_nodes, enable_vmd } => {
                backend.prepare_devices(&req, huge_nodes, enable_vmd)
            }
            BdevPrepareOp::Reset { enable_vmd } => backend.reset_devices(&req, enable_vmd),
        })
        .await
        .map_err(NvprepError::internal)?
    }

    #[instrument(skip(self))]
    async fn scan(&self, req: &BdevScanRequest) -> Result<BdevScanResponse> {
        let backend = self.clone();
        let req = req.clone();
        tokio::task::spawn_blocking(move || backend.scan_devices(&req))
            .await
            .map_err(NvprepError::internal)?
    }

    fn name(&self) -> &str {
        "sysfs"
    }
}
