/// Persistent container layout.
///
/// `~/.cordon/<name>` is the substitute home directory and survives across
/// runs; `/var/tmp/cordon.<user>.<name>` becomes `/tmp` inside the sandbox.
/// Nothing here is ever deleted.
use crate::config::types::{CordonError, Result, TOOL_NAME};
use crate::config::validator::{ContainerName, HostPath};
use crate::kernel::credentials::Account;
use crate::kernel::retry_eintr;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::{mkdir, Gid, Uid};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Host directory holding per-container scratch space.
pub const SCRATCH_ROOT: &str = "/var/tmp";

const PRIVATE_DIR_MODE: u32 = 0o700;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    account: Account,
    name: ContainerName,
}

impl ContainerLayout {
    pub fn new(account: Account, name: ContainerName) -> Self {
        Self { account, name }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    pub fn home(&self) -> &HostPath {
        &self.account.home
    }

    /// `~/.cordon`
    pub fn tool_dir(&self) -> Result<HostPath> {
        self.account.home.join_name(&format!(".{}", TOOL_NAME))
    }

    /// `~/.cordon/<name>`
    pub fn container_dir(&self) -> Result<HostPath> {
        self.tool_dir()?.join_name(self.name.as_str())
    }

    /// `/var/tmp/cordon.<user>.<name>`
    pub fn scratch_dir(&self) -> Result<HostPath> {
        HostPath::new(SCRATCH_ROOT)?.join_name(&format!(
            "{}.{}.{}",
            TOOL_NAME, self.account.name, self.name
        ))
    }

    /// Create the container and scratch directories, owned by the user and
    /// private to them. Runs before isolation, while host paths are still the
    /// real ones; `host_root` is `/` outside tests.
    pub fn prepare(&self, host_root: &Path) -> Result<()> {
        for dir in [self.tool_dir()?, self.container_dir()?, self.scratch_dir()?] {
            ensure_private_dir(&dir.under(host_root), self.account.uid, self.account.gid)?;
        }
        log::info!("Container {} ready at {}", self.name, self.container_dir()?);
        Ok(())
    }
}

/// Create `path` mode 0700 owned by `uid:gid`, or accept an existing one only
/// if it is a real directory already owned by `uid`.
fn ensure_private_dir(path: &Path, uid: Uid, gid: Gid) -> Result<()> {
    match retry_eintr(|| mkdir(path, Mode::from_bits_truncate(PRIVATE_DIR_MODE))) {
        Ok(()) => {
            std::os::unix::fs::lchown(path, Some(uid.as_raw()), Some(gid.as_raw())).map_err(
                |e| CordonError::Filesystem(format!("chown {}: {}", path.display(), e)),
            )?;
            log::info!("Created {}", path.display());
        }
        Err(Errno::EEXIST) => log::debug!("Reusing {}", path.display()),
        Err(e) => {
            return Err(CordonError::Filesystem(format!(
                "mkdir {}: {}",
                path.display(),
                e
            )))
        }
    }

    let meta = std::fs::symlink_metadata(path)
        .map_err(|e| CordonError::Filesystem(format!("stat {}: {}", path.display(), e)))?;
    if meta.file_type().is_symlink() || !meta.is_dir() {
        return Err(CordonError::Precondition(format!(
            "{} exists but is not a directory",
            path.display()
        )));
    }
    if meta.uid() != uid.as_raw() {
        return Err(CordonError::Precondition(format!(
            "{} is owned by uid {}, not {}",
            path.display(),
            meta.uid(),
            uid
        )));
    }
    Ok(())
}
