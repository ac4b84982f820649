/// Namespace isolation and the read-only staging baseline.
///
/// Two strategies share everything after `unshare`: the setuid model only
/// needs a mount namespace, the user-namespace model also maps a single id
/// to the caller.
use crate::config::types::{CordonError, PrivilegeModel, Result};
use crate::kernel::credentials::{validate_posture, Identity};
use crate::kernel::ops::Kernel;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};
use std::path::Path;

/// Id the caller appears as inside a user namespace.
pub const NAMESPACE_ID: u32 = 1000;

const SETGROUPS_PATH: &str = "/proc/self/setgroups";
const UID_MAP_PATH: &str = "/proc/self/uid_map";
const GID_MAP_PATH: &str = "/proc/self/gid_map";

/// One-entry id map line: `<inside> <outside> 1`.
pub fn id_map_line(inside: u32, outside: u32) -> String {
    format!("{} {} 1\n", inside, outside)
}

/// Namespace isolation controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceInitializer {
    model: PrivilegeModel,
    inner_uid: Uid,
    inner_gid: Gid,
}

impl NamespaceInitializer {
    pub fn new(model: PrivilegeModel) -> Self {
        Self {
            model,
            inner_uid: Uid::from_raw(NAMESPACE_ID),
            inner_gid: Gid::from_raw(NAMESPACE_ID),
        }
    }

    pub fn model(&self) -> PrivilegeModel {
        self.model
    }

    /// The ids the process should end up with, as seen inside the namespace.
    pub fn final_ids(&self, identity: &Identity) -> (Uid, Gid) {
        match self.model {
            PrivilegeModel::Setuid => (identity.real_uid, identity.real_gid),
            PrivilegeModel::UserNamespace => (self.inner_uid, self.inner_gid),
        }
    }

    pub fn clone_flags(&self) -> CloneFlags {
        match self.model {
            PrivilegeModel::Setuid => CloneFlags::CLONE_NEWNS,
            PrivilegeModel::UserNamespace => CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS,
        }
    }

    /// Leave the host's namespaces. Must precede every mount operation.
    pub fn isolate<K: Kernel>(&self, kernel: &mut K, identity: &Identity) -> Result<()> {
        validate_posture(identity, self.model)?;
        kernel.create_namespace(self.clone_flags())?;

        if self.model == PrivilegeModel::UserNamespace {
            if self.inner_uid.is_root() {
                return Err(CordonError::Namespace(
                    "refusing to map the caller to root inside the namespace".to_string(),
                ));
            }
            // setgroups must be denied before an unprivileged gid_map write.
            kernel.write_proc_file(Path::new(SETGROUPS_PATH), "deny\n")?;
            kernel.write_proc_file(
                Path::new(UID_MAP_PATH),
                &id_map_line(self.inner_uid.as_raw(), identity.real_uid.as_raw()),
            )?;
            kernel.write_proc_file(
                Path::new(GID_MAP_PATH),
                &id_map_line(self.inner_gid.as_raw(), identity.real_gid.as_raw()),
            )?;
            log::info!(
                "Mapped uid {} -> {}, gid {} -> {}",
                self.inner_uid,
                identity.real_uid,
                self.inner_gid,
                identity.real_gid
            );
        }
        Ok(())
    }

    /// Make propagation private, then mirror `host_root` read-only at `staging`.
    pub fn stage_baseline<K: Kernel>(
        &self,
        kernel: &mut K,
        host_root: &Path,
        staging: &Path,
    ) -> Result<()> {
        kernel.make_private(host_root)?;
        kernel.bind_mount(host_root, staging)?;
        // MS_RDONLY is ignored on the initial bind; it needs its own remount.
        // Only the top mount: /dev/shm, /proc and the like keep their flags.
        kernel.remount(staging, MsFlags::MS_RDONLY)?;
        log::info!(
            "Staged read-only view of {} at {}",
            host_root.display(),
            staging.display()
        );
        Ok(())
    }
}
