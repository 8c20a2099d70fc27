//! Hugepage sizing for NVMe prepare.
//!
//! Only NUMA node 0 is sized. The count requested on the command line wins
//! (raised to [`SCAN_MIN_HUGEPAGE_COUNT`]), otherwise an existing node 0
//! allocation is kept so a prepare never shrinks it. Without per-node detail
//! the global totals are not trusted and the minimum is used.

use crate::config::SCAN_MIN_HUGEPAGE_COUNT;
use crate::types::bdev::HugeNodes;
use crate::types::meminfo::SysMemInfo;
use tracing::debug;

/// Target hugepage count for NUMA node 0.
///
/// `requested` is the command-line count, 0 when unset. Configuration
/// `nr_hugepages` is not an input.
pub fn target_hugepages(requested: u64, mem: &SysMemInfo) -> u64 {
    let Some(node0) = mem.node0() else {
        debug!(
            global_total = mem.system.hugepages_total,
            "No per-NUMA memory info, using minimum hugepage count"
        );
        return SCAN_MIN_HUGEPAGE_COUNT;
    };

    if requested > 0 {
        return requested.max(SCAN_MIN_HUGEPAGE_COUNT);
    }

    match node0.hugepages_total {
        0 => SCAN_MIN_HUGEPAGE_COUNT,
        current => current,
    }
}

/// Node 0 hugepage allocation for a prepare request.
pub fn huge_nodes(requested: u64, mem: &SysMemInfo) -> HugeNodes {
    HugeNodes::node0(target_hugepages(requested, mem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::meminfo::MemInfo;

    fn with_node0_total(total: u64) -> SysMemInfo {
        SysMemInfo {
            system: MemInfo { hugepages_total: total, ..Default::default() },
            numa_nodes: vec![MemInfo {
                numa_node_index: Some(0),
                hugepages_total: total,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_requested_count_raised_to_minimum() {
        let mem = with_node0_total(0);
        assert_eq!(huge_nodes(64, &mem).to_string(), "nodes_hp[0]=128");
        assert_eq!(huge_nodes(512, &mem).to_string(), "nodes_hp[0]=512");
    }

    #[test]
    fn test_requested_count_ignores_current_allocation() {
        for current in [0, 64, 1024, 4096] {
            let mem = with_node0_total(current);
            assert_eq!(target_hugepages(2046, &mem), 2046);
            assert_eq!(target_hugepages(1, &mem), SCAN_MIN_HUGEPAGE_COUNT);
        }
    }

    #[test]
    fn test_unset_count_keeps_node0_allocation() {
        assert_eq!(target_hugepages(0, &with_node0_total(1024)), 1024);
        assert_eq!(target_hugepages(0, &with_node0_total(16)), 16);
        assert_eq!(target_hugepages(0, &with_node0_total(0)), SCAN_MIN_HUGEPAGE_COUNT);
    }

    #[test]
    fn test_global_totals_not_trusted_without_numa_detail() {
        let mem = SysMemInfo {
            system: MemInfo { hugepages_total: 2048, ..Default::default() },
            numa_nodes: Vec::new(),
        };
        assert_eq!(huge_nodes(0, &mem).to_string(), "nodes_hp[0]=128");
        assert_eq!(target_hugepages(4096, &mem), SCAN_MIN_HUGEPAGE_COUNT);
    }

    #[test]
    fn test_only_node0_is_consulted() {
        let mem = SysMemInfo {
            system: MemInfo { hugepages_total: 1024, ..Default::default() },
            numa_nodes: vec![
                MemInfo { numa_node_index: Some(0), ..Default::default() },
                MemInfo { numa_node_index: Some(1), hugepages_total: 1024, ..Default::default() },
            ],
        };
        assert_eq!(target_hugepages(0, &mem), SCAN_MIN_HUGEPAGE_COUNT);
    }

    #[test]
    fn test_other_node_not_taken_for_node0() {
        let mem = SysMemInfo {
            system: MemInfo { hugepages_total: 4096, ..Default::default() },
            numa_nodes: vec![MemInfo {
                numa_node_index: Some(1),
                hugepages_total: 4096,
                ..Default::default()
            }],
        };
        assert_eq!(target_hugepages(0, &mem), SCAN_MIN_HUGEPAGE_COUNT);
    }
}
