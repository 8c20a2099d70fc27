//! Bdev backend abstraction.
//!
//! The orchestrators never touch the OS directly. They hand a request to a
//! [`BdevBackend`] and inspect the response. [`SysfsBackend`] is the
//! implementation for real hosts: it rebinds PCI drivers and sizes hugepages
//! through sysfs.

use crate::error::Result;
use crate::types::bdev::{
    BdevPrepareRequest, BdevPrepareResponse, BdevScanRequest, BdevScanResponse,
};
use async_trait::async_trait;

/// Bdev backend trait.
///
/// Calls are issued one at a time and each is awaited before the next. The
/// backend is assumed to have exclusive access to the host's devices for the
/// duration of a call.
#[async_trait]
pub trait BdevBackend: Send + Sync {
    /// Clean, prepare or reset devices, depending on the request's operation.
    async fn prepare(&self, req: &BdevPrepareRequest) -> Result<BdevPrepareResponse>;

    /// Enumerate NVMe controllers.
    async fn scan(&self, req: &BdevScanRequest) -> Result<BdevScanResponse>;

    /// Get backend name (for logging).
    fn name(&self) -> &str;
}

pub mod sysfs;

pub use sysfs::SysfsBackend;
