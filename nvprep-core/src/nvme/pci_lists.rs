//! Resolution of the PCI allow and block lists sent to the backend.
//!
//! Lists given on the command line replace the configuration entirely: if
//! either is non-empty, neither configuration list is consulted. Otherwise the
//! allow list is every NVMe tier's device list (engine order, then tier
//! order) and the block list is the configuration's `bdev_exclude`.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::types::pci::PciAddressList;
use tracing::debug;

/// Allow and block lists for one invocation.
///
/// `None` means no filtering on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PciLists {
    pub allow: Option<PciAddressList>,
    pub block: Option<PciAddressList>,
}

impl PciLists {
    pub fn is_empty(&self) -> bool {
        self.allow.is_none() && self.block.is_none()
    }
}

/// Resolve lists from comma-separated command-line input and configuration.
///
/// Every address is validated before anything is returned, so a malformed
/// entry fails the invocation before any backend call.
pub fn resolve_pci_lists(
    cli_allow: Option<&str>,
    cli_block: Option<&str>,
    config: Option<&ServerConfig>,
) -> Result<PciLists> {
    let cli = PciLists {
        allow: parse_cli(cli_allow)?,
        block: parse_cli(cli_block)?,
    };
    if !cli.is_empty() {
        debug!(allow = ?cli.allow, block = ?cli.block, "Using PCI lists from command line");
        return Ok(cli);
    }

    let Some(cfg) = config else {
        return Ok(cli);
    };

    let lists = PciLists {
        allow: config_device_list(cfg)?,
        block: non_empty(PciAddressList::from_strings(&cfg.bdev_exclude)?),
    };
    debug!(allow = ?lists.allow, block = ?lists.block, "Using PCI lists from config");
    Ok(lists)
}

/// Devices of all NVMe tiers in the configuration, `None` if there are none.
pub fn config_device_list(config: &ServerConfig) -> Result<Option<PciAddressList>> {
    let devices: Vec<&String> = config.nvme_bdev_list().collect();
    Ok(non_empty(PciAddressList::from_strings(&devices)?))
}

fn parse_cli(input: Option<&str>) -> Result<Option<PciAddressList>> {
    match input {
        Some(s) => PciAddressList::from_cli(s),
        None => Ok(None),
    }
}

fn non_empty(list: PciAddressList) -> Option<PciAddressList> {
    (!list.is_empty()).then_some(list)
}
