//! VMD enablement and the double reset.
//!
//! When a reset reports `vmd_prepared`, the backend acted on a VMD domain
//! whose bridged devices may not appear in the allow list. A second,
//! unfiltered reset with VMD cleared releases them.

use crate::config::ServerConfig;
use crate::types::bdev::{BdevPrepareOp, BdevPrepareRequest, BdevPrepareResponse};

/// Whether VMD support should be requested.
///
/// The command flag wins; otherwise the configuration decides, and a missing
/// configuration or unset option leaves VMD enabled.
pub fn vmd_enabled(cmd_disable_vmd: bool, config: Option<&ServerConfig>) -> bool {
    if cmd_disable_vmd {
        return false;
    }
    !config.and_then(|c| c.disable_vmd).unwrap_or(false)
}

/// The follow-up reset to issue after `first`, if any.
pub fn second_reset(
    first: &BdevPrepareRequest,
    resp: &BdevPrepareResponse,
) -> Option<BdevPrepareRequest> {
    if !resp.vmd_prepared {
        return None;
    }

    Some(BdevPrepareRequest {
        op: BdevPrepareOp::Reset { enable_vmd: false },
        target_user: first.target_user.clone(),
        pci_allow_list: None,
        pci_block_list: None,
        disable_vfio: first.disable_vfio,
    })
}
