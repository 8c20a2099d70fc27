//! Removal of state left behind by a previous userspace NVMe run.
//!
//! Two kinds of leftovers block reinitialization: hugepage backing files in
//! the hugetlbfs mount (`spdk*`), and per-device lockfiles
//! (`spdk_pci_lock_<addr>`).

use crate::error::{NvprepError, Result};
use crate::types::pci::PciAddressList;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Prefix of hugepage files created by the userspace driver framework.
const HUGEPAGE_FILE_PREFIX: &str = "spdk";

/// Prefix of per-device lockfiles.
pub const LOCKFILE_PREFIX: &str = "spdk_pci_lock_";

/// Hugepage file names embed the owning pid: `spdk_pid1234map_0`.
static HUGEPAGE_PID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^spdk_pid(\d+)map_").expect("Invalid hugepage file regex"));

/// Whether `addr` passes the allow/block filters.
///
/// No allow list means every address is allowed. The block list always wins.
pub fn address_selected(
    addr: &str,
    allow: Option<&PciAddressList>,
    block: Option<&PciAddressList>,
) -> bool {
    allow.map_or(true, |a| a.contains_str(addr)) && !block.is_some_and(|b| b.contains_str(addr))
}

/// Remove hugepage files whose owning process is gone.
///
/// Returns the number of files removed.
pub fn clean_hugepage_files(hugepage_dir: &Path, proc_root: &Path) -> Result<usize> {
    if !hugepage_dir.exists() {
        debug!(path = %hugepage_dir.display(), "No hugetlbfs mount to clean");
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(hugepage_dir)
        .map_err(|e| NvprepError::IoError { path: hugepage_dir.to_path_buf(), source: e })?
    {
        let entry = entry.map_err(NvprepError::internal)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(HUGEPAGE_FILE_PREFIX) {
            continue;
        }

        if let Some(caps) = HUGEPAGE_PID_REGEX.captures(&name) {
            if proc_root.join(&caps[1]).exists() {
                debug!(file = %name, pid = &caps[1], "Hugepage file owner still running");
                continue;
            }
        }

        let path = entry.path();
        fs::remove_file(&path).map_err(|e| NvprepError::IoError { path, source: e })?;
        removed += 1;
    }

    Ok(removed)
}

/// Remove PCI lockfiles for selected addresses.
///
/// With `any` set the allow list is ignored and every lockfile not on the
/// block list is removed.
pub fn clean_lockfiles(
    lock_dir: &Path,
    allow: Option<&PciAddressList>,
    block: Option<&PciAddressList>,
    any: bool,
) -> Result<usize> {
    if !lock_dir.exists() {
        return Ok(0);
    }

    let allow = if any { None } else { allow };
    let mut removed = 0;
    for entry in fs::read_dir(lock_dir)
        .map_err(|e| NvprepError::IoError { path: lock_dir.to_path_buf(), source: e })?
    {
        let entry = entry.map_err(NvprepError::internal)?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(addr) = name.strip_prefix(LOCKFILE_PREFIX) else {
            continue;
        };
        if !address_selected(addr, allow, block) {
            continue;
        }

        let path = entry.path();
        fs::remove_file(&path).map_err(|e| NvprepError::IoError { path, source: e })?;
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn list(addrs: &[&str]) -> PciAddressList {
        PciAddressList::from_strings(addrs).unwrap()
    }

    #[test]
    fn test_address_selected() {
        let allow = list(&["0000:81:00.0", "0000:82:00.0"]);
        let block = list(&["0000:82:00.0"]);

        assert!(address_selected("0000:81:00.0", Some(&allow), Some(&block)));
        assert!(!address_selected("0000:82:00.0", Some(&allow), Some(&block)));
        assert!(!address_selected("0000:83:00.0", Some(&allow), None));
        assert!(address_selected("0000:83:00.0", None, Some(&block)));
    }

    #[test]
    fn test_clean_hugepage_files_keeps_live_owner() {
        let tmp = TempDir::new().unwrap();
        let huge = tmp.path().join("hugepages");
        let proc_root = tmp.path().join("proc");
        fs::create_dir_all(&huge).unwrap();
        fs::create_dir_all(proc_root.join("4242")).unwrap();

        fs::write(huge.join("spdk_pid4242map_0"), "").unwrap();
        fs::write(huge.join("spdk_pid999map_0"), "").unwrap();
        fs::write(huge.join("spdk_pid999map_1"), "").unwrap();
        fs::write(huge.join("qemu_backing"), "").unwrap();

        assert_eq!(clean_hugepage_files(&huge, &proc_root).unwrap(), 2);
        assert!(huge.join("spdk_pid4242map_0").exists());
        assert!(huge.join("qemu_backing").exists());
        assert!(!huge.join("spdk_pid999map_0").exists());
    }

    #[test]
    fn test_clean_lockfiles_filtered() {
        let tmp = TempDir::new().unwrap();
        for addr in ["0000:81:00.0", "0000:82:00.0", "0000:83:00.0"] {
            fs::write(tmp.path().join(format!("{}{}", LOCKFILE_PREFIX, addr)), "").unwrap();
        }

        let allow = list(&["0000:81:00.0", "0000:82:00.0"]);
        let block = list(&["0000:82:00.0"]);
        assert_eq!(clean_lockfiles(tmp.path(), Some(&allow), Some(&block), false).unwrap(), 1);
        assert!(!tmp.path().join("spdk_pci_lock_0000:81:00.0").exists());
        assert!(tmp.path().join("spdk_pci_lock_0000:82:00.0").exists());
        assert!(tmp.path().join("spdk_pci_lock_0000:83:00.0").exists());
    }

    #[test]
    fn test_clean_lockfiles_any() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("spdk_pci_lock_0000:81:00.0"), "").unwrap();
        fs::write(tmp.path().join("spdk_pci_lock_0000:83:00.0"), "").unwrap();
        fs::write(tmp.path().join("unrelated"), "").unwrap();

        assert_eq!(clean_lockfiles(tmp.path(), None, None, true).unwrap(), 2);
        assert!(tmp.path().join("unrelated").exists());
    }
}
