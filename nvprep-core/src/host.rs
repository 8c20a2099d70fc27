//! Host identity and capability probes.
//!
//! Everything the security gate needs to know about the host goes through
//! [`HostEnv`], so tests can substitute a fixed answer.

use crate::error::{NvprepError, Result};
use std::ffi::{CStr, CString};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Name of the superuser account.
pub const ROOT_USER: &str = "root";

/// Path to IOMMU groups in sysfs, relative to the sysfs mount.
const IOMMU_GROUPS_PATH: &str = "kernel/iommu_groups";

/// Host facts consulted before privileged operations are requested.
pub trait HostEnv: Send + Sync {
    /// User name of the running process.
    fn current_username(&self) -> Result<String>;

    /// Whether the running process has root privileges.
    fn running_as_root(&self) -> bool;

    /// Whether the host exposes IOMMU groups.
    fn iommu_enabled(&self) -> Result<bool>;

    /// Owner ids of the account `name`. Fails with
    /// [`NvprepError::UserLookup`] if there is no such account.
    fn resolve_user(&self, name: &str) -> Result<UserIds>;
}

/// Probes the running system.
#[derive(Debug, Clone)]
pub struct SystemHost {
    sys_root: PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHost {
    pub fn new() -> Self {
        Self { sys_root: PathBuf::from("/sys") }
    }

    /// Probe IOMMU state under an alternative sysfs mount.
    pub fn with_sys_root(sys_root: impl Into<PathBuf>) -> Self {
        Self { sys_root: sys_root.into() }
    }
}

impl HostEnv for SystemHost {
    fn current_username(&self) -> Result<String> {
        let uid = unsafe { libc::geteuid() };
        username_for_uid(uid)
    }

    fn running_as_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn iommu_enabled(&self) -> Result<bool> {
        let path = self.sys_root.join(IOMMU_GROUPS_PATH);
        if !path.exists() {
            debug!(path = %path.display(), "IOMMU groups path missing");
            return Ok(false);
        }

        // The directory exists with IOMMU compiled in but disabled on the
        // kernel command line; only populated groups count.
        let mut entries =
            fs::read_dir(&path).map_err(|e| NvprepError::IoError { path: path.clone(), source: e })?;
        Ok(entries.next().is_some())
    }

    fn resolve_user(&self, name: &str) -> Result<UserIds> {
        lookup_user(name)
    }
}

/// Owner ids of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIds {
    pub uid: u32,
    pub gid: u32,
}

/// Look up uid and primary gid for `name` in the passwd database.
pub fn lookup_user(name: &str) -> Result<UserIds> {
    let c_name = CString::new(name).map_err(|e| NvprepError::UserLookup {
        user: name.to_string(),
        reason: e.to_string(),
    })?;

    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; passwd_buf_len()];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe {
        libc::getpwnam_r(c_name.as_ptr(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
    };
    if rc != 0 {
        return Err(NvprepError::UserLookup {
            user: name.to_string(),
            reason: std::io::Error::from_raw_os_error(rc).to_string(),
        });
    }
    if result.is_null() {
        return Err(NvprepError::UserLookup {
            user: name.to_string(),
            reason: "no such user".to_string(),
        });
    }

    Ok(UserIds { uid: pwd.pw_uid, gid: pwd.pw_gid })
}

fn username_for_uid(uid: libc::uid_t) -> Result<String> {
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; passwd_buf_len()];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() {
        return Err(NvprepError::UserLookup {
            user: format!("uid {}", uid),
            reason: if rc != 0 {
                std::io::Error::from_raw_os_error(rc).to_string()
            } else {
                "no passwd entry".to_string()
            },
        });
    }

    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    Ok(name.to_string_lossy().into_owned())
}

fn passwd_buf_len() -> usize {
    match unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) } {
        n if n > 0 => n as usize,
        _ => 16384,
    }
}
