use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Closed set of machine-readable rejection reasons. Downstream layers key
/// their messaging off these codes, so new variants are an API change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityReason {
    PathOutsideAllowlist,
    SymlinkMaxDepth,
    SymlinkTimeout,
    SymlinkConcurrencyLimit,
    SymlinkOpLimit,
    SymlinkUnreadable,
    ReservedDeviceName,
    AlternateDataStream,
    NullByte,
    IncompleteUnc,
}

impl SecurityReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathOutsideAllowlist => "PATH_OUTSIDE_ALLOWLIST",
            Self::SymlinkMaxDepth => "SYMLINK_MAX_DEPTH",
            Self::SymlinkTimeout => "SYMLINK_TIMEOUT",
            Self::SymlinkConcurrencyLimit => "SYMLINK_CONCURRENCY_LIMIT",
            Self::SymlinkOpLimit => "SYMLINK_OP_LIMIT",
            Self::SymlinkUnreadable => "SYMLINK_UNREADABLE",
            Self::ReservedDeviceName => "RESERVED_DEVICE_NAME",
            Self::AlternateDataStream => "ALTERNATE_DATA_STREAM",
            Self::NullByte => "NULL_BYTE",
            Self::IncompleteUnc => "INCOMPLETE_UNC",
        }
    }
}

/// Typed failure for path containment, resolver bound violations, and
/// malformed path shapes.
#[derive(Debug, Error)]
pub enum PathSecurityError {
    #[error(
        "{path:?} resolves outside {base_dir:?} and the allow-list. To allow: \
         --allow-dir {} | --allow-file {} | --security-mode permissive",
        allow_dir_hint(.path),
        .path.display()
    )]
    OutsideAllowlist { path: PathBuf, base_dir: PathBuf },

    #[error("symlink chain at {path:?} exceeds the maximum depth of {max_depth}")]
    MaxDepth { path: PathBuf, max_depth: usize },

    #[error("resolving {path:?} exceeded the {budget:?} time budget")]
    Timeout { path: PathBuf, budget: Duration },

    #[error("too many concurrent path resolutions (limit {limit})")]
    ConcurrencyLimit { limit: usize },

    #[error("resolving {path:?} exceeded the filesystem operation budget of {max_ops}")]
    OpLimit { path: PathBuf, max_ops: usize },

    #[error("symlink at {path:?} could not be read; refusing a partially resolved path")]
    UnreadableLink { path: PathBuf },

    #[error("{path:?} contains a reserved device name")]
    ReservedDeviceName { path: PathBuf },

    #[error("{path:?} contains an alternate data stream specifier")]
    AlternateDataStream { path: PathBuf },

    #[error("{path:?} contains a null byte")]
    NullByte { path: PathBuf },

    #[error("{path:?} is an incomplete UNC path")]
    IncompleteUnc { path: PathBuf },
}

impl PathSecurityError {
    pub fn reason(&self) -> SecurityReason {
        match self {
            Self::OutsideAllowlist { .. } => SecurityReason::PathOutsideAllowlist,
            Self::MaxDepth { .. } => SecurityReason::SymlinkMaxDepth,
            Self::Timeout { .. } => SecurityReason::SymlinkTimeout,
            Self::ConcurrencyLimit { .. } => SecurityReason::SymlinkConcurrencyLimit,
            Self::OpLimit { .. } => SecurityReason::SymlinkOpLimit,
            Self::UnreadableLink { .. } => SecurityReason::SymlinkUnreadable,
            Self::ReservedDeviceName { .. } => SecurityReason::ReservedDeviceName,
            Self::AlternateDataStream { .. } => SecurityReason::AlternateDataStream,
            Self::NullByte { .. } => SecurityReason::NullByte,
            Self::IncompleteUnc { .. } => SecurityReason::IncompleteUnc,
        }
    }

    /// True for bound violations that indicate attack or systemic
    /// exhaustion rather than a single bad file. These abort bulk
    /// operations instead of being dropped per-entry.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConcurrencyLimit { .. } | Self::OpLimit { .. }
        )
    }
}

fn allow_dir_hint(path: &Path) -> std::path::Display<'_> {
    path.parent().unwrap_or(path).display()
}

/// Raised when a pattern match exhausts its wall-clock budget. Deliberately
/// a separate type from [`PathSecurityError`]: a timed-out match is never
/// "no match", and callers must fail closed on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pattern matching exceeded its {budget:?} budget")]
pub struct MatchTimeoutError {
    pub budget: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        let err = PathSecurityError::MaxDepth {
            path: PathBuf::from("/tmp/a"),
            max_depth: 10,
        };
        assert_eq!(err.reason().code(), "SYMLINK_MAX_DEPTH");

        let err = PathSecurityError::OutsideAllowlist {
            path: PathBuf::from("/etc/passwd"),
            base_dir: PathBuf::from("/project"),
        };
        assert_eq!(err.reason().code(), "PATH_OUTSIDE_ALLOWLIST");
    }

    #[test]
    fn outside_allowlist_message_names_remediation_flags() {
        let err = PathSecurityError::OutsideAllowlist {
            path: PathBuf::from("/etc/passwd"),
            base_dir: PathBuf::from("/project"),
        };
        let message = err.to_string();
        assert!(message.contains("--allow-dir /etc"));
        assert!(message.contains("--allow-file /etc/passwd"));
        assert!(message.contains("--security-mode permissive"));
    }

    #[test]
    fn unreadable_link_is_not_exhaustion() {
        let err = PathSecurityError::UnreadableLink {
            path: PathBuf::from("/project/link"),
        };
        assert_eq!(err.reason().code(), "SYMLINK_UNREADABLE");
        assert!(!err.is_resource_exhaustion());
    }

    #[test]
    fn exhaustion_classification() {
        assert!(PathSecurityError::ConcurrencyLimit { limit: 2 }.is_resource_exhaustion());
        assert!(PathSecurityError::Timeout {
            path: PathBuf::from("x"),
            budget: Duration::from_secs(5),
        }
        .is_resource_exhaustion());
        assert!(!PathSecurityError::NullByte {
            path: PathBuf::from("x"),
        }
        .is_resource_exhaustion());
    }
}
