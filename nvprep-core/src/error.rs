//! Error types for nvprep.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nvprep operations.
pub type Result<T> = std::result::Result<T, NvprepError>;

/// The backend call that was in flight when an error was returned.
///
/// Each phase maps to a different remediation for the operator, e.g. stale
/// lockfiles for `Clean` versus driver permissions for `Prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPhase {
    Clean,
    Prepare,
    Reset,
    VmdReset,
    Scan,
}

impl fmt::Display for BackendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clean => "hugepage and lockfile cleanup",
            Self::Prepare => "prepare",
            Self::Reset => "reset",
            Self::VmdReset => "second reset after VMD was prepared",
            Self::Scan => "scan",
        };
        f.write_str(name)
    }
}

/// Main error type for nvprep.
#[derive(Error, Debug)]
pub enum NvprepError {
    // Configuration faults
    #[error("hugepages are disabled in the server configuration; NVMe devices can not be prepared")]
    HugepagesDisabled,

    #[error("VFIO can not be disabled if running as non-root user {user}; remove disable_vfio from the server configuration")]
    ConfigVfioDisableNonRoot { user: String },

    #[error("failed to load config from {path:?}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Validation errors
    #[error("unexpected pci address {address:?}: expected format 0000:01:00.0")]
    InvalidPciAddress { address: String },

    #[error("unable to resolve user {user:?}: {reason}")]
    UserLookup { user: String, reason: String },

    #[error("no memory information available")]
    MemInfoUnavailable,

    #[error("failed to parse meminfo at {path:?}: {reason}")]
    MemInfoParse { path: PathBuf, reason: String },

    // Security errors
    #[error("VFIO can not be disabled for non-root user {user}")]
    VfioDisableNonRoot { user: String },

    #[error("no IOMMU capability detected; enable VT-d/AMD-Vi or run as root with VFIO disabled")]
    IommuUnavailable,

    // Backend errors
    #[error("bdev backend {phase} failed: {source}")]
    Backend {
        phase: BackendPhase,
        #[source]
        source: Box<NvprepError>,
    },

    #[error("PCI device {pci_address} could not be bound to {driver}: {reason}")]
    DriverBind { pci_address: String, driver: String, reason: String },

    #[error("PCI device not found: {pci_address}")]
    DeviceNotFound { pci_address: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NvprepError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Wrap an error returned by the backend with the phase it occurred in.
    pub fn backend(phase: BackendPhase, source: NvprepError) -> Self {
        Self::Backend { phase, source: Box::new(source) }
    }

    /// The backend phase this error was raised in, if it came from the backend.
    pub fn backend_phase(&self) -> Option<BackendPhase> {
        match self {
            Self::Backend { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_names_phase() {
        let err = NvprepError::backend(
            BackendPhase::VmdReset,
            NvprepError::Internal("device busy".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("second reset after VMD was prepared"), "{}", msg);
        assert!(msg.contains("device busy"), "{}", msg);
        assert_eq!(err.backend_phase(), Some(BackendPhase::VmdReset));
    }

    #[test]
    fn test_non_backend_error_has_no_phase() {
        assert_eq!(NvprepError::IommuUnavailable.backend_phase(), None);
    }
}
