//! The narrow kernel capability interface.
//!
//! Only operations that change namespace, mount or identity state live here.
//! Placeholder creation and metadata copies are ordinary file operations on
//! the staging tree and are done directly by the tree builder.

use crate::config::types::Result;
use crate::kernel::credentials::Identity;
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};
use std::path::Path;

pub trait Kernel {
    /// `unshare(2)` with the given namespace flags.
    fn create_namespace(&mut self, flags: CloneFlags) -> Result<()>;

    /// Write a `/proc/self/*` control file in a single `write(2)`.
    fn write_proc_file(&mut self, path: &Path, contents: &str) -> Result<()>;

    /// Recursively mark `target` and everything below it private.
    fn make_private(&mut self, target: &Path) -> Result<()>;

    /// Recursive bind of `source` onto `target`.
    fn bind_mount(&mut self, source: &Path, target: &Path) -> Result<()>;

    /// Remount the bind at `target`, adding `flags` to whatever the kernel
    /// requires to be preserved. Mounts below `target` keep their own flags.
    fn remount(&mut self, target: &Path, flags: MsFlags) -> Result<()>;

    /// [`Kernel::remount`] applied to `target` and then to every mount below
    /// it. The kernel ignores `MS_REC` on a remount.
    fn remount_tree(&mut self, target: &Path, flags: MsFlags) -> Result<()>;

    /// Mount a fresh tmpfs on `target`.
    fn mount_tmpfs(&mut self, target: &Path, flags: MsFlags, options: &str) -> Result<()>;

    fn pivot_root(&mut self, new_root: &Path, put_old: &Path) -> Result<()>;

    /// Lazy unmount.
    fn detach(&mut self, target: &Path) -> Result<()>;

    fn chdir(&mut self, path: &Path) -> Result<()>;

    /// Set real, effective and saved ids; gid first.
    fn set_identity(&mut self, uid: Uid, gid: Gid) -> Result<()>;

    fn identity(&self) -> Result<Identity>;

    /// Clear bounding, ambient, effective, permitted and inheritable sets.
    fn drop_capabilities(&mut self) -> Result<()>;

    /// `PR_SET_NO_NEW_PRIVS`.
    fn lock_privileges(&mut self) -> Result<()>;

    /// Whether the process can still switch to `uid`. Used after a drop to
    /// prove it is irreversible.
    fn can_assume(&mut self, uid: Uid) -> bool;
}
