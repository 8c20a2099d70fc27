//! Core domain types for nvprep.

pub mod bdev;
pub mod meminfo;
pub mod pci;

// Re-exports
pub use bdev::{
    BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse, BdevScanRequest, BdevScanResponse,
    HugeNodes, NvmeController,
};
pub use meminfo::{MemInfo, SysMemInfo};
pub use pci::{PciAddress, PciAddressList};
