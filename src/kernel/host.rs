//! Syscall-backed [`Kernel`] implementation.

use super::capabilities;
use super::credentials::Identity;
use super::mountinfo::{parse_mountinfo, submounts};
use super::ops::Kernel;
use super::retry_eintr;
use crate::config::types::{CordonError, Result};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::sys::statvfs::{statvfs, FsFlags};
use nix::unistd::{setresgid, setresuid, Gid, Uid};
use std::io::Write;
use std::path::Path;

/// Flags a remount must carry over from the existing mount. Inside a user
/// namespace the kernel locks these on mounts inherited from the parent and
/// rejects a remount that would clear them.
fn preserved_flags(target: &Path) -> Result<MsFlags> {
    let stat = retry_eintr(|| statvfs(target))
        .map_err(|e| CordonError::Filesystem(format!("statvfs {}: {}", target.display(), e)))?;
    let fs = stat.flags();

    let mut flags = MsFlags::empty();
    for (st, ms) in [
        (FsFlags::ST_RDONLY, MsFlags::MS_RDONLY),
        (FsFlags::ST_NOSUID, MsFlags::MS_NOSUID),
        (FsFlags::ST_NODEV, MsFlags::MS_NODEV),
        (FsFlags::ST_NOEXEC, MsFlags::MS_NOEXEC),
        (FsFlags::ST_NOATIME, MsFlags::MS_NOATIME),
        (FsFlags::ST_NODIRATIME, MsFlags::MS_NODIRATIME),
        (FsFlags::ST_RELATIME, MsFlags::MS_RELATIME),
    ] {
        if fs.contains(st) {
            flags |= ms;
        }
    }
    Ok(flags)
}

fn mount_error(op: &str, target: &Path, err: nix::Error) -> CordonError {
    CordonError::Filesystem(format!("{} {}: {}", op, target.display(), err))
}

/// The real kernel. Stateless; every call is one or two syscalls.
#[derive(Debug, Default)]
pub struct HostKernel;

impl HostKernel {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for HostKernel {
    fn create_namespace(&mut self, flags: CloneFlags) -> Result<()> {
        retry_eintr(|| unshare(flags))
            .map_err(|e| CordonError::Namespace(format!("unshare({:?}): {}", flags, e)))?;
        log::info!("Entered new namespaces: {:?}", flags);
        Ok(())
    }

    fn write_proc_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        let fail = |e: std::io::Error| {
            CordonError::Namespace(format!("write {}: {}", path.display(), e))
        };
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(fail)?;

        // The id map files only accept their whole content in one write.
        let written = loop {
            match file.write(contents.as_bytes()) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                other => break other.map_err(fail)?,
            }
        };
        if written < contents.len() {
            return Err(CordonError::Namespace(format!(
                "incomplete write to {}",
                path.display()
            )));
        }
        log::debug!("Wrote {:?} to {}", contents.trim_end(), path.display());
        Ok(())
    }

    fn make_private(&mut self, target: &Path) -> Result<()> {
        retry_eintr(|| {
            mount(
                None::<&str>,
                target,
                None::<&str>,
                MsFlags::MS_REC | MsFlags::MS_PRIVATE,
                None::<&str>,
            )
        })
        .map_err(|e| {
            CordonError::Namespace(format!(
                "CRITICAL: Failed to make {} private (MS_PRIVATE|MS_REC): {}",
                target.display(),
                e
            ))
        })?;
        log::info!("Mount propagation hardened: {} set to MS_PRIVATE|MS_REC", target.display());
        Ok(())
    }

    fn bind_mount(&mut self, source: &Path, target: &Path) -> Result<()> {
        retry_eintr(|| {
            mount(
                Some(source),
                target,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REC,
                None::<&str>,
            )
        })
        .map_err(|e| mount_error("bind", target, e))
    }

    fn remount(&mut self, target: &Path, flags: MsFlags) -> Result<()> {
        let flags = flags | preserved_flags(target)? | MsFlags::MS_REMOUNT | MsFlags::MS_BIND;
        retry_eintr(|| mount(None::<&str>, target, None::<&str>, flags, None::<&str>))
            .map_err(|e| mount_error("remount", target, e))
    }

    fn remount_tree(&mut self, target: &Path, flags: MsFlags) -> Result<()> {
        self.remount(target, flags)?;
        let entries = parse_mountinfo()?;
        for sub in submounts(&entries, target) {
            let path = Path::new(&sub.mount_point);
            self.remount(path, flags)?;
            log::debug!("Remounted submount {} with {:?}", path.display(), flags);
        }
        Ok(())
    }

    fn mount_tmpfs(&mut self, target: &Path, flags: MsFlags, options: &str) -> Result<()> {
        retry_eintr(|| mount(Some("tmpfs"), target, Some("tmpfs"), flags, Some(options)))
            .map_err(|e| mount_error("tmpfs", target, e))
    }

    fn pivot_root(&mut self, new_root: &Path, put_old: &Path) -> Result<()> {
        retry_eintr(|| nix::unistd::pivot_root(new_root, put_old))
            .map_err(|e| mount_error("pivot_root", new_root, e))
    }

    fn detach(&mut self, target: &Path) -> Result<()> {
        retry_eintr(|| umount2(target, MntFlags::MNT_DETACH))
            .map_err(|e| mount_error("umount", target, e))
    }

    fn chdir(&mut self, path: &Path) -> Result<()> {
        retry_eintr(|| nix::unistd::chdir(path))
            .map_err(|e| CordonError::Filesystem(format!("chdir {}: {}", path.display(), e)))
    }

    fn set_identity(&mut self, uid: Uid, gid: Gid) -> Result<()> {
        setresgid(gid, gid, gid)
            .map_err(|e| CordonError::Privilege(format!("Failed to setresgid({}): {}", gid, e)))?;
        setresuid(uid, uid, uid)
            .map_err(|e| CordonError::Privilege(format!("Failed to setresuid({}): {}", uid, e)))?;
        Ok(())
    }

    fn identity(&self) -> Result<Identity> {
        Identity::capture()
    }

    fn drop_capabilities(&mut self) -> Result<()> {
        capabilities::drop_all_capabilities()
    }

    fn lock_privileges(&mut self) -> Result<()> {
        capabilities::set_no_new_privs()
    }

    fn can_assume(&mut self, uid: Uid) -> bool {
        // Succeeding here is itself the failure the caller checks for.
        nix::unistd::setuid(uid).is_ok()
    }
}
