use crate::config::types::{CordonError, Result};
use crate::config::validator::{validate_name, HostPath};
use nix::unistd::{getresgid, getresuid, Gid, Uid, User};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// The process ids, captured once before anything changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub real_uid: Uid,
    pub effective_uid: Uid,
    pub saved_uid: Uid,
    pub real_gid: Gid,
    pub effective_gid: Gid,
    pub saved_gid: Gid,
}

impl Identity {
    pub fn capture() -> Result<Self> {
        let uids = getresuid()
            .map_err(|e| CordonError::Privilege(format!("getresuid: {}", e)))?;
        let gids = getresgid()
            .map_err(|e| CordonError::Privilege(format!("getresgid: {}", e)))?;
        Ok(Self {
            real_uid: uids.real,
            effective_uid: uids.effective,
            saved_uid: uids.saved,
            real_gid: gids.real,
            effective_gid: gids.effective,
            saved_gid: gids.saved,
        })
    }

    /// All three uids and all three gids equal the given pair.
    pub fn is_exactly(&self, uid: Uid, gid: Gid) -> bool {
        self.real_uid == uid
            && self.effective_uid == uid
            && self.saved_uid == uid
            && self.real_gid == gid
            && self.effective_gid == gid
            && self.saved_gid == gid
    }

    /// An unprivileged identity with every id set to the given pair.
    pub fn plain(uid: u32, gid: u32) -> Self {
        Self {
            real_uid: Uid::from_raw(uid),
            effective_uid: Uid::from_raw(uid),
            saved_uid: Uid::from_raw(uid),
            real_gid: Gid::from_raw(gid),
            effective_gid: Gid::from_raw(gid),
            saved_gid: Gid::from_raw(gid),
        }
    }

    /// A setuid-root invocation by `uid`.
    pub fn setuid_root(uid: u32, gid: u32) -> Self {
        Self {
            effective_uid: Uid::from_raw(0),
            saved_uid: Uid::from_raw(0),
            ..Self::plain(uid, gid)
        }
    }
}

/// The invoking user as recorded in the password database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: HostPath,
}

impl Account {
    /// Look up the real user. The group is the real gid of the process, not
    /// the primary group from the database.
    pub fn lookup(identity: &Identity) -> Result<Self> {
        let user = User::from_uid(identity.real_uid)
            .map_err(|e| CordonError::Precondition(format!("getpwuid failed: {}", e)))?
            .ok_or_else(|| {
                CordonError::Precondition(format!(
                    "no password entry for uid {}",
                    identity.real_uid
                ))
            })?;

        validate_name(&user.name)?;
        let home = home_path(&user.dir)?;
        if home.is_root() {
            return Err(CordonError::Precondition(format!(
                "home directory of {} is /",
                user.name
            )));
        }

        Ok(Self {
            name: user.name,
            uid: identity.real_uid,
            gid: identity.real_gid,
            home,
        })
    }
}

/// Password databases sometimes record the home with a trailing `/`.
fn home_path(dir: &Path) -> Result<HostPath> {
    let bytes = dir.as_os_str().as_bytes();
    match bytes.strip_suffix(b"/") {
        Some(trimmed) if !trimmed.is_empty() => HostPath::new(OsStr::from_bytes(trimmed)),
        _ => HostPath::new(dir),
    }
}
