//! Hugepage pool sizing through sysfs.

use crate::error::{NvprepError, Result};
use crate::types::bdev::HugeNodes;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Hugepage size assumed when the kernel does not report one.
pub const DEFAULT_HUGEPAGE_SIZE_KIB: u64 = 2048;

/// Set the hugepage pool of one NUMA node.
///
/// Falls back to the system-wide pool when per-node control is missing,
/// which is only meaningful for node 0. Returns the file written.
pub fn set_node_hugepages(sys_root: &Path, huge: HugeNodes, size_kib: u64) -> Result<PathBuf> {
    let pool = format!("hugepages-{}kB", size_kib);
    let node_path = sys_root
        .join("devices/system/node")
        .join(format!("node{}", huge.node))
        .join("hugepages")
        .join(&pool);

    let path = if node_path.exists() {
        node_path.join("nr_hugepages")
    } else if huge.node == 0 {
        sys_root.join("kernel/mm/hugepages").join(&pool).join("nr_hugepages")
    } else {
        return Err(NvprepError::Internal(format!(
            "no hugepage pool {} for NUMA node {}",
            pool, huge.node
        )));
    };

    fs::write(&path, huge.count.to_string())
        .map_err(|e| NvprepError::IoError { path: path.clone(), source: e })?;

    info!(node = huge.node, count = huge.count, size_kib, "Hugepage pool set");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_node0_pool() {
        let tmp = TempDir::new().unwrap();
        let pool = tmp.path().join("devices/system/node/node0/hugepages/hugepages-2048kB");
        fs::create_dir_all(&pool).unwrap();

        let path = set_node_hugepages(tmp.path(), HugeNodes::node0(512), 2048).unwrap();
        assert_eq!(path, pool.join("nr_hugepages"));
        assert_eq!(fs::read_to_string(path).unwrap(), "512");
    }

    #[test]
    fn test_fallback_to_global_pool() {
        let tmp = TempDir::new().unwrap();
        let pool = tmp.path().join("kernel/mm/hugepages/hugepages-2048kB");
        fs::create_dir_all(&pool).unwrap();

        let path = set_node_hugepages(tmp.path(), HugeNodes::node0(128), 2048).unwrap();
        assert_eq!(path, pool.join("nr_hugepages"));
    }

    #[test]
    fn test_missing_remote_node_pool() {
        let tmp = TempDir::new().unwrap();
        let err = set_node_hugepages(tmp.path(), HugeNodes { node: 3, count: 8 }, 2048);
        assert!(err.is_err());
    }
}
