//! Shared type definitions and closed enums.

use nix::mount::MsFlags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tool name used in the persisted layout (`~/.cordon/<name>`).
pub const TOOL_NAME: &str = "cordon";

/// How a host path is exposed inside the staged tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Same-type placeholder carrying the source's owner and mode, no content.
    Empty,
    /// Real content, not writable.
    #[serde(rename = "readonly")]
    ReadOnly,
    /// Real content, writable, never executable.
    Full,
}

impl std::fmt::Display for BindMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindMode::Empty => write!(f, "empty"),
            BindMode::ReadOnly => write!(f, "readonly"),
            BindMode::Full => write!(f, "full"),
        }
    }
}

/// How the process obtains the privilege needed to build the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivilegeModel {
    /// Installed setuid-root; only a mount namespace is created.
    Setuid,
    /// Unprivileged; a user namespace maps one in-namespace id to the caller.
    UserNamespace,
}

impl std::fmt::Display for PrivilegeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivilegeModel::Setuid => write!(f, "setuid"),
            PrivilegeModel::UserNamespace => write!(f, "userns"),
        }
    }
}

/// Mount flag policy threaded through the tree builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPolicy {
    /// Flags added when remounting a writable bind.
    pub writable_flags: MsFlags,
    /// Flags used when mounting a hide overlay.
    pub hide_flags: MsFlags,
    /// tmpfs options for hide overlays; size and inode count stay bounded.
    pub hide_tmpfs_options: String,
    /// Require sources to be reachable by the real (invoking) user.
    pub check_real_access: bool,
}

pub const DEFAULT_HIDE_TMPFS_OPTIONS: &str = "size=2M,nr_inodes=4096,mode=755";

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            writable_flags: MsFlags::MS_NOEXEC,
            hide_flags: MsFlags::empty(),
            hide_tmpfs_options: DEFAULT_HIDE_TMPFS_OPTIONS.to_string(),
            check_real_access: false,
        }
    }
}

impl MountPolicy {
    /// Extend writable and hide flags with the global no-exec hardening.
    pub fn with_nx(mut self, nx: bool) -> Self {
        if nx {
            self.writable_flags |= MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV;
            self.hide_flags |= MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV;
        }
        self
    }

    pub fn with_real_access_check(mut self, check: bool) -> Self {
        self.check_real_access = check;
        self
    }
}

/// Error taxonomy class, used by the top-level handler to pick an exit path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad invocation; exit code 1.
    Usage,
    /// Malformed path or identifier; abort with diagnostics.
    Validation,
    /// Wrong privilege posture at start; abort before any namespace change.
    Precondition,
    /// Any other syscall failure; abort with diagnostics.
    FatalSystem,
}

/// Custom error types for cordon
#[derive(Error, Debug)]
pub enum CordonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("usage: {0}")]
    Usage(String),

    #[error("invalid: {0}")]
    Validation(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Namespace isolation error: {0}")]
    Namespace(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Privilege error: {0}")]
    Privilege(String),
}

impl CordonError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CordonError::Usage(_) => ErrorClass::Usage,
            CordonError::Validation(_) | CordonError::Config(_) => ErrorClass::Validation,
            CordonError::Precondition(_) => ErrorClass::Precondition,
            CordonError::Io(_)
            | CordonError::Namespace(_)
            | CordonError::Filesystem(_)
            | CordonError::Privilege(_) => ErrorClass::FatalSystem,
        }
    }
}

pub type Result<T> = std::result::Result<T, CordonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_makes_writable_binds_noexec() {
        let policy = MountPolicy::default();
        assert!(policy.writable_flags.contains(MsFlags::MS_NOEXEC));
        assert!(policy.hide_flags.is_empty());
        assert!(!policy.check_real_access);
    }

    #[test]
    fn nx_policy_extends_hide_overlays() {
        let policy = MountPolicy::default().with_nx(true);
        assert!(policy.hide_flags.contains(MsFlags::MS_NOEXEC));
        assert!(policy.writable_flags.contains(MsFlags::MS_NOSUID));
        assert_eq!(MountPolicy::default().with_nx(false), MountPolicy::default());
    }

    #[test]
    fn errors_map_onto_taxonomy() {
        assert_eq!(
            CordonError::Validation("..".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            CordonError::Precondition("root".into()).class(),
            ErrorClass::Precondition
        );
        assert_eq!(
            CordonError::Filesystem("mount".into()).class(),
            ErrorClass::FatalSystem
        );
        assert_eq!(CordonError::Usage("x".into()).class(), ErrorClass::Usage);
    }

    #[test]
    fn bind_mode_serializes_lowercase() {
        let json = serde_json::to_string(&BindMode::ReadOnly).unwrap();
        assert_eq!(json, "\"readonly\"");
        let mode: BindMode = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(mode, BindMode::Full);
    }
}
