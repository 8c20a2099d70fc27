//! Request and response types exchanged with the bdev backend.

use crate::types::pci::{PciAddress, PciAddressList};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-NUMA-node hugepage allocation, rendered as `nodes_hp[<node>]=<count>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HugeNodes {
    pub node: u32,
    pub count: u64,
}

impl HugeNodes {
    pub fn node0(count: u64) -> Self {
        Self { node: 0, count }
    }
}

impl fmt::Display for HugeNodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nodes_hp[{}]={}", self.node, self.count)
    }
}

/// What a prepare request asks the backend to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BdevPrepareOp {
    /// Remove hugepage files and PCI lockfiles left behind by a previous run.
    ///
    /// `any_lockfiles` removes lockfiles regardless of address and is only
    /// set when the request carries no allow list.
    Clean { any_lockfiles: bool },
    /// Allocate hugepages and bind devices to a userspace driver.
    Prepare { huge_nodes: HugeNodes, enable_vmd: bool },
    /// Return devices to their kernel driver.
    Reset { enable_vmd: bool },
}

impl BdevPrepareOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clean { .. } => "clean",
            Self::Prepare { .. } => "prepare",
            Self::Reset { .. } => "reset",
        }
    }
}

/// Request sent to [`BdevBackend::prepare`](crate::backend::BdevBackend::prepare).
///
/// One request shape serves clean, prepare and reset; the operation kind
/// decides which fields the backend acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdevPrepareRequest {
    pub op: BdevPrepareOp,
    /// User that should own the prepared resources
    pub target_user: Option<String>,
    pub pci_allow_list: Option<PciAddressList>,
    pub pci_block_list: Option<PciAddressList>,
    /// Bind to a UIO driver instead of vfio-pci
    pub disable_vfio: bool,
}

impl BdevPrepareRequest {
    /// Build a cleanup request. The target user and VFIO settings are never
    /// carried on a clean.
    pub fn clean(
        pci_allow_list: Option<PciAddressList>,
        pci_block_list: Option<PciAddressList>,
    ) -> Self {
        Self {
            op: BdevPrepareOp::Clean { any_lockfiles: pci_allow_list.is_none() },
            target_user: None,
            pci_allow_list,
            pci_block_list,
            disable_vfio: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self.op, BdevPrepareOp::Clean { .. })
    }

    pub fn is_reset(&self) -> bool {
        matches!(self.op, BdevPrepareOp::Reset { .. })
    }

    /// Whether VMD handling was requested. Always false for clean requests.
    pub fn enable_vmd(&self) -> bool {
        match self.op {
            BdevPrepareOp::Prepare { enable_vmd, .. } | BdevPrepareOp::Reset { enable_vmd } => {
                enable_vmd
            }
            BdevPrepareOp::Clean { .. } => false,
        }
    }
}

/// Result of a prepare call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdevPrepareResponse {
    /// A VMD domain was acted on. Only meaningful for reset.
    pub vmd_prepared: bool,
}

/// Request sent to [`BdevBackend::scan`](crate::backend::BdevBackend::scan).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BdevScanRequest {
    /// Restrict the scan to these devices (None scans everything visible)
    pub device_list: Option<PciAddressList>,
}

/// An NVMe controller discovered by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvmeController {
    pub pci_addr: PciAddress,
    pub model: String,
    pub serial: String,
    pub fw_rev: String,
    pub vendor_id: String,
    pub device_id: String,
    /// NUMA node of the controller (-1 if not reported)
    pub socket_id: i32,
    /// Driver currently bound (None if unbound)
    pub driver: Option<String>,
}

/// Result of a scan call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdevScanResponse {
    pub controllers: Vec<NvmeController>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_nodes_format() {
        assert_eq!(HugeNodes::node0(128).to_string(), "nodes_hp[0]=128");
        assert_eq!(HugeNodes { node: 1, count: 4 }.to_string(), "nodes_hp[1]=4");
    }

    #[test]
    fn test_clean_any_lockfiles_only_without_allow_list() {
        let any = BdevPrepareRequest::clean(None, None);
        assert_eq!(any.op, BdevPrepareOp::Clean { any_lockfiles: true });
        assert!(any.target_user.is_none());

        let allow = PciAddressList::from_strings(&["0000:01:00.0"]).unwrap();
        let block = PciAddressList::from_strings(&["0000:02:00.0"]).unwrap();
        let filtered = BdevPrepareRequest::clean(Some(allow.clone()), Some(block.clone()));
        assert_eq!(filtered.op, BdevPrepareOp::Clean { any_lockfiles: false });
        assert_eq!(filtered.pci_allow_list, Some(allow));
        assert_eq!(filtered.pci_block_list, Some(block));
    }

    #[test]
    fn test_block_list_alone_still_cleans_any() {
        let block = PciAddressList::from_strings(&["0000:02:00.0"]).unwrap();
        let req = BdevPrepareRequest::clean(None, Some(block));
        assert_eq!(req.op, BdevPrepareOp::Clean { any_lockfiles: true });
        assert!(!req.enable_vmd());
    }
}
