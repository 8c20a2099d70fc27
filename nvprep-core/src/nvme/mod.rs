//! NVMe prepare, reset and scan orchestration.
//!
//! Each operation builds its requests from scratch, then drives the backend
//! one call at a time:
//!
//! - **prepare**: clean, prepare
//! - **reset**: clean, reset, and an unfiltered reset if VMD was prepared
//! - **scan**: clean, prepare, scan, clean, reset (plus the VMD reset).
//!   With `skip_prep` only the scan call is made.
//!
//! Nothing is retried and nothing is unwound: the first error ends the
//! invocation.

pub mod hugepages;
pub mod pci_lists;
pub mod security;
pub mod vmd;

mod prepare;
mod reset;
mod scan;

use crate::backend::BdevBackend;
use crate::config::ServerConfig;
use crate::error::{BackendPhase, NvprepError, Result};
use crate::host::HostEnv;
use crate::meminfo::MemInfoProvider;
use crate::types::bdev::BdevPrepareRequest;
use crate::types::meminfo::SysMemInfo;
use pci_lists::PciLists;
use std::sync::Arc;
use tracing::debug;

/// Options shared by the prepare and reset commands.
#[derive(Debug, Clone, Default)]
pub struct NvmeOpts {
    /// Comma-separated PCI addresses to act on
    pub pci_allow_list: Option<String>,
    /// Comma-separated PCI addresses to leave alone
    pub pci_block_list: Option<String>,
    /// User that should own the devices afterwards
    pub target_user: Option<String>,
    pub disable_vfio: bool,
    pub disable_vmd: bool,
}

impl NvmeOpts {
    pub fn with_pci_allow_list(mut self, list: impl Into<String>) -> Self {
        self.pci_allow_list = Some(list.into());
        self
    }

    pub fn with_pci_block_list(mut self, list: impl Into<String>) -> Self {
        self.pci_block_list = Some(list.into());
        self
    }

    pub fn with_target_user(mut self, user: impl Into<String>) -> Self {
        self.target_user = Some(user.into());
        self
    }

    pub fn with_disable_vfio(mut self, disabled: bool) -> Self {
        self.disable_vfio = disabled;
        self
    }

    pub fn with_disable_vmd(mut self, disabled: bool) -> Self {
        self.disable_vmd = disabled;
        self
    }
}

/// Options for the scan command.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOpts {
    pub disable_vmd: bool,
    /// Scan without binding devices first or restoring them afterwards
    pub skip_prep: bool,
}

/// Command options after the configuration and security rules were applied.
#[derive(Debug, Clone)]
struct ResolvedOpts {
    /// Target user, the current user unless given on the command
    target_user: String,
    lists: PciLists,
    disable_vfio: bool,
    enable_vmd: bool,
}

/// Drives a [`BdevBackend`] through the NVMe workflows.
pub struct NvmeOrchestrator {
    backend: Arc<dyn BdevBackend>,
    host: Arc<dyn HostEnv>,
    meminfo: Arc<dyn MemInfoProvider>,
    config: Option<ServerConfig>,
}

impl NvmeOrchestrator {
    /// Create an orchestrator. `config` is `None` when the server configuration
    /// is ignored.
    pub fn new(
        backend: Arc<dyn BdevBackend>,
        host: Arc<dyn HostEnv>,
        meminfo: Arc<dyn MemInfoProvider>,
        config: Option<ServerConfig>,
    ) -> Self {
        Self { backend, host, meminfo, config }
    }

    pub fn config(&self) -> Option<&ServerConfig> {
        self.config.as_ref()
    }

    fn check_hugepages_enabled(&self) -> Result<()> {
        if self.config.as_ref().is_some_and(|c| c.disable_hugepages) {
            return Err(NvprepError::HugepagesDisabled);
        }
        Ok(())
    }

    fn resolve(&self, opts: &NvmeOpts) -> Result<ResolvedOpts> {
        let config = self.config.as_ref();
        let disable_vfio = security::apply_config_vfio(&*self.host, config, opts.disable_vfio)?;

        let target_user = match opts.target_user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => user.to_string(),
            None => self.host.current_username()?,
        };
        self.host.resolve_user(&target_user)?;
        security::check_vfio_policy(&*self.host, &target_user, disable_vfio)?;

        let lists = pci_lists::resolve_pci_lists(
            opts.pci_allow_list.as_deref(),
            opts.pci_block_list.as_deref(),
            config,
        )?;

        // The VMD domain is only usable through VFIO
        let enable_vmd = !disable_vfio && vmd::vmd_enabled(opts.disable_vmd, config);

        debug!(
            target_user = %target_user,
            disable_vfio,
            enable_vmd,
            allow = ?lists.allow,
            block = ?lists.block,
            "Resolved NVMe options"
        );
        Ok(ResolvedOpts { target_user, lists, disable_vfio, enable_vmd })
    }

    /// Remove stale hugepage files and lockfiles from a previous run.
    async fn clean(&self, opts: &ResolvedOpts) -> Result<()> {
        let req = BdevPrepareRequest::clean(opts.lists.allow.clone(), opts.lists.block.clone());
        self.backend
            .prepare(&req)
            .await
            .map_err(|e| NvprepError::backend(BackendPhase::Clean, e))?;
        Ok(())
    }

    fn mem_info(&self) -> Result<SysMemInfo> {
        self.meminfo.sys_mem_info()?.ok_or(NvprepError::MemInfoUnavailable)
    }
}
