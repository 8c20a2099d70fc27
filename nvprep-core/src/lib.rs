//! nvprep core library
//!
//! Prepares, resets and scans NVMe devices for a userspace storage engine:
//! sizes hugepages, moves controllers between kernel and userspace drivers,
//! and enumerates them.

pub mod backend;
pub mod config;
pub mod error;
pub mod host;
pub mod meminfo;
pub mod nvme;
pub mod observability;
pub mod paths;
pub mod types;

// Re-export commonly used items
pub use backend::{BdevBackend, SysfsBackend};
pub use config::{ServerConfig, SCAN_MIN_HUGEPAGE_COUNT};
pub use error::{BackendPhase, NvprepError, Result};
pub use host::{HostEnv, SystemHost, UserIds};
pub use meminfo::{MemInfoProvider, StaticMemInfo, SystemMemInfo};
pub use nvme::{NvmeOpts, NvmeOrchestrator, ScanOpts};
pub use observability::{init as init_logging, LogOptions};
pub use types::{
    BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse, BdevScanRequest, BdevScanResponse,
    HugeNodes, MemInfo, NvmeController, PciAddress, PciAddressList, SysMemInfo,
};
