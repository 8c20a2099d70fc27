//! System memory snapshot types.

use serde::{Deserialize, Serialize};

/// Hugepage and RAM statistics for one scope, either the whole system or a
/// single NUMA node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemInfo {
    /// NUMA node this snapshot describes (None for system-wide figures)
    pub numa_node_index: Option<u32>,
    pub hugepages_total: u64,
    pub hugepages_free: u64,
    pub hugepages_reserved: u64,
    pub hugepages_surplus: u64,
    pub hugepage_size_kib: u64,
    pub mem_total_kib: u64,
    pub mem_free_kib: u64,
    pub mem_available_kib: u64,
    pub mem_used_kib: u64,
}

/// System-wide memory info plus per-NUMA-node breakdown.
///
/// `numa_nodes` is ordered by node index. An empty list means per-node detail
/// could not be obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysMemInfo {
    #[serde(flatten)]
    pub system: MemInfo,
    pub numa_nodes: Vec<MemInfo>,
}

impl SysMemInfo {
    /// Snapshot for NUMA node 0, if per-node detail is available for it.
    pub fn node0(&self) -> Option<&MemInfo> {
        self.numa_nodes.iter().find(|n| n.numa_node_index == Some(0))
    }

    /// Total hugepage memory in MiB, calculated from default size hugepages.
    pub fn hugepages_total_mib(&self) -> u64 {
        (self.system.hugepages_total * self.system.hugepage_size_kib) / 1024
    }

    /// Free hugepage memory in MiB, calculated from default size hugepages.
    pub fn hugepages_free_mib(&self) -> u64 {
        (self.system.hugepages_free * self.system.hugepage_size_kib) / 1024
    }

    /// One-line summary suitable for logging.
    pub fn summary(&self) -> String {
        let nodes: Vec<String> = self
            .numa_nodes
            .iter()
            .map(|n| {
                format!(
                    "node-{} total/free: {}/{}, ",
                    n.numa_node_index.map(|i| i as i64).unwrap_or(-1),
                    n.hugepages_total,
                    n.hugepages_free
                )
            })
            .collect();

        format!(
            "hugepage size: {}, {}mem total/free/available: {}/{}/{}",
            format_kib(self.system.hugepage_size_kib),
            nodes.concat(),
            format_kib(self.system.mem_total_kib),
            format_kib(self.system.mem_free_kib),
            format_kib(self.system.mem_available_kib),
        )
    }
}

/// Format a KiB quantity with a binary unit suffix.
fn format_kib(kib: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    let mut value = kib as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value.fract() == 0.0 {
        format!("{} {}", value as u64, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
