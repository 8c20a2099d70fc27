//! Privilege checks run before any backend call.

use crate::config::ServerConfig;
use crate::error::{NvprepError, Result};
use crate::host::{HostEnv, ROOT_USER};
use tracing::{debug, warn};

/// Check that the requested VFIO mode is allowed for `target_user`.
///
/// A non-root target user must keep VFIO, and VFIO for a non-root target
/// user needs an IOMMU. Root may run without either.
pub fn check_vfio_policy(host: &dyn HostEnv, target_user: &str, disable_vfio: bool) -> Result<()> {
    if target_user == ROOT_USER {
        if !disable_vfio && matches!(host.iommu_enabled(), Ok(false)) {
            warn!("No IOMMU detected, continuing as root without DMA protection");
        }
        return Ok(());
    }

    if disable_vfio {
        return Err(NvprepError::VfioDisableNonRoot { user: target_user.to_string() });
    }

    if !host.iommu_enabled()? {
        return Err(NvprepError::IommuUnavailable);
    }

    debug!(user = %target_user, "VFIO policy satisfied");
    Ok(())
}

/// Apply `disable_vfio` from the configuration.
///
/// Only a process actually running as root may apply it, regardless of the
/// command's target user. Returns the effective disable-VFIO setting.
pub fn apply_config_vfio(
    host: &dyn HostEnv,
    config: Option<&ServerConfig>,
    cmd_disable_vfio: bool,
) -> Result<bool> {
    if !config.is_some_and(|c| c.disable_vfio) {
        return Ok(cmd_disable_vfio);
    }

    if !host.running_as_root() {
        return Err(NvprepError::ConfigVfioDisableNonRoot { user: host.current_username()? });
    }

    debug!("VFIO disabled by server config");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::UserIds;

    struct FakeHost {
        user: &'static str,
        iommu: bool,
    }

    impl HostEnv for FakeHost {
        fn current_username(&self) -> Result<String> {
            Ok(self.user.to_string())
        }

        fn running_as_root(&self) -> bool {
            self.user == ROOT_USER
        }

        fn iommu_enabled(&self) -> Result<bool> {
            Ok(self.iommu)
        }

        fn resolve_user(&self, _name: &str) -> Result<UserIds> {
            Ok(UserIds { uid: 1000, gid: 1000 })
        }
    }

    #[test]
    fn test_vfio_policy_truth_table() {
        let with_iommu = FakeHost { user: "alice", iommu: true };
        let without_iommu = FakeHost { user: "alice", iommu: false };

        // non-root, VFIO disabled
        assert!(matches!(
            check_vfio_policy(&with_iommu, "alice", true),
            Err(NvprepError::VfioDisableNonRoot { .. })
        ));
        // non-root, VFIO enabled, no IOMMU
        assert!(matches!(
            check_vfio_policy(&without_iommu, "alice", false),
            Err(NvprepError::IommuUnavailable)
        ));
        // non-root, VFIO enabled, IOMMU
        assert!(check_vfio_policy(&with_iommu, "alice", false).is_ok());
        // root bypasses both rules
        assert!(check_vfio_policy(&without_iommu, ROOT_USER, true).is_ok());
        assert!(check_vfio_policy(&without_iommu, ROOT_USER, false).is_ok());
    }

    #[test]
    fn test_error_messages() {
        let host = FakeHost { user: "alice", iommu: false };
        let err = check_vfio_policy(&host, "bob", true).unwrap_err();
        assert!(err.to_string().contains("VFIO can not be disabled"));
        let err = check_vfio_policy(&host, "bob", false).unwrap_err();
        assert!(err.to_string().contains("no IOMMU capability detected"));
    }

    #[test]
    fn test_config_vfio_requires_root_process() {
        let cfg = ServerConfig::default().with_disable_vfio(true);

        let alice = FakeHost { user: "alice", iommu: true };
        let err = apply_config_vfio(&alice, Some(&cfg), false).unwrap_err();
        assert!(err.to_string().contains("can not be disabled if running as non-root"));

        let root = FakeHost { user: ROOT_USER, iommu: true };
        assert!(apply_config_vfio(&root, Some(&cfg), false).unwrap());
    }

    #[test]
    fn test_config_vfio_unset_keeps_command_flag() {
        let alice = FakeHost { user: "alice", iommu: true };
        assert!(!apply_config_vfio(&alice, None, false).unwrap());
        assert!(apply_config_vfio(&alice, None, true).unwrap());
        assert!(!apply_config_vfio(&alice, Some(&ServerConfig::default()), false).unwrap());
    }
}
