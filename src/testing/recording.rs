//! In-memory [`Kernel`] double.
//!
//! Every call is recorded in order. When given an emulation root, mounts whose
//! target lies below it are imitated with plain file operations: a bind copies
//! the source over the target, a tmpfs empties the target directory, and the
//! null device truncates a file. That is enough to observe which entries a
//! tree build makes visible without any privilege.

use crate::config::types::{CordonError, Result};
use crate::kernel::credentials::Identity;
use crate::kernel::mount::NULL_DEVICE;
use crate::kernel::ops::Kernel;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelCall {
    CreateNamespace(CloneFlags),
    WriteProcFile(PathBuf, String),
    MakePrivate(PathBuf),
    BindMount(PathBuf, PathBuf),
    Remount(PathBuf, MsFlags),
    RemountTree(PathBuf, MsFlags),
    MountTmpfs(PathBuf, MsFlags, String),
    PivotRoot(PathBuf, PathBuf),
    Detach(PathBuf),
    Chdir(PathBuf),
    SetIdentity(Uid, Gid),
    DropCapabilities,
    LockPrivileges,
    CanAssume(Uid),
}

impl KernelCall {
    pub fn is_mount(&self) -> bool {
        matches!(
            self,
            KernelCall::BindMount(..)
                | KernelCall::Remount(..)
                | KernelCall::RemountTree(..)
                | KernelCall::MountTmpfs(..)
        )
    }
}

#[derive(Debug)]
pub struct RecordingKernel {
    calls: Vec<KernelCall>,
    identity: Identity,
    emulate_root: Option<PathBuf>,
    fail_at: Option<usize>,
    root_reachable: bool,
}

impl RecordingKernel {
    pub fn new(identity: Identity) -> Self {
        Self {
            calls: Vec::new(),
            identity,
            emulate_root: None,
            fail_at: None,
            root_reachable: false,
        }
    }

    /// Imitate mounts whose target is below `root`.
    pub fn emulating(mut self, root: &Path) -> Self {
        self.emulate_root = Some(fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()));
        self
    }

    /// Make the call with this zero-based index fail.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn set_root_reachable(&mut self, reachable: bool) {
        self.root_reachable = reachable;
    }

    pub fn calls(&self) -> &[KernelCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: KernelCall) -> Result<()> {
        let index = self.calls.len();
        let failed = self.fail_at == Some(index);
        let shown = format!("{:?}", call);
        self.calls.push(call);
        if failed {
            return Err(CordonError::Filesystem(format!("injected failure: {}", shown)));
        }
        Ok(())
    }

    fn emulated(&self, target: &Path) -> bool {
        match &self.emulate_root {
            Some(root) => target.starts_with(root),
            None => false,
        }
    }
}

fn clear_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if fs::symlink_metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let source_path = entry.path();
        let target_path = target.join(entry.file_name());
        let meta = fs::symlink_metadata(&source_path)?;

        if meta.file_type().is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(&source_path)?, &target_path)?;
        } else if meta.is_dir() {
            fs::create_dir_all(&target_path)?;
            copy_tree(&source_path, &target_path)?;
            fs::set_permissions(&target_path, meta.permissions())?;
        } else if meta.is_file() {
            fs::copy(&source_path, &target_path)?;
        }
    }
    Ok(())
}

impl Kernel for RecordingKernel {
    fn create_namespace(&mut self, flags: CloneFlags) -> Result<()> {
        self.record(KernelCall::CreateNamespace(flags))
    }

    fn write_proc_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.record(KernelCall::WriteProcFile(
            path.to_path_buf(),
            contents.to_string(),
        ))
    }

    fn make_private(&mut self, target: &Path) -> Result<()> {
        self.record(KernelCall::MakePrivate(target.to_path_buf()))
    }

    fn bind_mount(&mut self, source: &Path, target: &Path) -> Result<()> {
        self.record(KernelCall::BindMount(
            source.to_path_buf(),
            target.to_path_buf(),
        ))?;
        if !self.emulated(target) {
            return Ok(());
        }

        if source == Path::new(NULL_DEVICE) {
            fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(target)?;
        } else if source.is_dir() {
            clear_dir(target)?;
            copy_tree(source, target)?;
        } else {
            fs::copy(source, target)?;
        }
        Ok(())
    }

    fn remount(&mut self, target: &Path, flags: MsFlags) -> Result<()> {
        self.record(KernelCall::Remount(target.to_path_buf(), flags))
    }

    fn remount_tree(&mut self, target: &Path, flags: MsFlags) -> Result<()> {
        self.record(KernelCall::RemountTree(target.to_path_buf(), flags))
    }

    fn mount_tmpfs(&mut self, target: &Path, flags: MsFlags, options: &str) -> Result<()> {
        self.record(KernelCall::MountTmpfs(
            target.to_path_buf(),
            flags,
            options.to_string(),
        ))?;
        if self.emulated(target) {
            clear_dir(target)?;
            fs::set_permissions(target, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }

    fn pivot_root(&mut self, new_root: &Path, put_old: &Path) -> Result<()> {
        self.record(KernelCall::PivotRoot(
            new_root.to_path_buf(),
            put_old.to_path_buf(),
        ))
    }

    fn detach(&mut self, target: &Path) -> Result<()> {
        self.record(KernelCall::Detach(target.to_path_buf()))
    }

    fn chdir(&mut self, path: &Path) -> Result<()> {
        self.record(KernelCall::Chdir(path.to_path_buf()))
    }

    fn set_identity(&mut self, uid: Uid, gid: Gid) -> Result<()> {
        self.record(KernelCall::SetIdentity(uid, gid))?;
        self.identity = Identity::plain(uid.as_raw(), gid.as_raw());
        Ok(())
    }

    fn identity(&self) -> Result<Identity> {
        Ok(self.identity)
    }

    fn drop_capabilities(&mut self) -> Result<()> {
        self.record(KernelCall::DropCapabilities)
    }

    fn lock_privileges(&mut self) -> Result<()> {
        self.record(KernelCall::LockPrivileges)
    }

    fn can_assume(&mut self, uid: Uid) -> bool {
        let failed = self.record(KernelCall::CanAssume(uid)).is_err();
        !failed
            && (self.root_reachable
                || self.identity.effective_uid.is_root()
                || self.identity.effective_uid == uid)
    }
}
