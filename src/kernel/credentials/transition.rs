//! Irreversible transition to the invoking user's identity.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid to prevent
//! privilege escalation through saved-set-user-ID.

use crate::config::types::{CordonError, PrivilegeModel, Result};
use crate::kernel::ops::Kernel;
use nix::unistd::{Gid, Uid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeDropper {
    model: PrivilegeModel,
    uid: Uid,
    gid: Gid,
}

impl PrivilegeDropper {
    /// `uid`/`gid` are the ids to end up with as seen from inside the
    /// namespace: the real ids for setuid, the mapped ids for a user namespace.
    pub fn new(model: PrivilegeModel, uid: Uid, gid: Gid) -> Self {
        Self { model, uid, gid }
    }

    /// 4-step transition: set ids -> shed capabilities -> verify -> prove irreversible.
    pub fn drop_privileges<K: Kernel>(&self, kernel: &mut K) -> Result<()> {
        if self.uid.is_root() || self.gid.as_raw() == 0 {
            return Err(CordonError::Privilege(format!(
                "Cannot transition to root UID/GID (uid={}, gid={})",
                self.uid, self.gid
            )));
        }

        // CRITICAL: GID before UID, inside set_identity.
        kernel.set_identity(self.uid, self.gid)?;

        if self.model == PrivilegeModel::UserNamespace {
            kernel.drop_capabilities()?;
            kernel.lock_privileges()?;
        }

        let current = kernel.identity()?;
        if !current.is_exactly(self.uid, self.gid) {
            return Err(CordonError::Privilege(format!(
                "identity verification failed: expected {}/{}, got {:?}",
                self.uid, self.gid, current
            )));
        }

        if kernel.can_assume(Uid::from_raw(0)) {
            return Err(CordonError::Privilege(
                "root identity still reachable after drop".to_string(),
            ));
        }

        log::info!(
            "Dropped privileges ({}) to UID={}, GID={}",
            self.model,
            self.uid,
            self.gid
        );
        Ok(())
    }
}
