//! The staged mount tree builder.
//!
//! The builder mirrors host paths into a staging directory that starts as a
//! read-only view of the whole host. `bind` punches an exception into that
//! view, `hide` covers something up. Operations run in the order given and
//! each one is a no-op when the path it names does not exist.
//!
//! Staged paths are never allowed to traverse a symlink. The staging tree
//! contains user-controlled directories (the container is bound over the
//! home directory), and a link planted there must not redirect a mount onto
//! another part of the tree.

use crate::config::plan::{MountOp, MountPlan};
use crate::config::types::{BindMode, CordonError, MountPolicy, Result};
use crate::config::validator::HostPath;
use crate::kernel::ops::Kernel;
use crate::kernel::probe::{is_absent, probe, probe_staged, FileType};
use crate::kernel::retry_eintr;
use nix::errno::Errno;
use nix::mount::MsFlags;
use nix::sys::stat::{mknod, Mode, SFlag};
use nix::unistd::{access, mkdir, AccessFlags};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Bound over non-directories to hide them.
pub const NULL_DEVICE: &str = "/dev/null";

const PLACEHOLDER_MODE: u32 = 0o777;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The named path does not exist; nothing was touched.
    Skipped,
}

pub struct MountTreeBuilder<'k, K: Kernel> {
    kernel: &'k mut K,
    host_root: PathBuf,
    staging: PathBuf,
    policy: MountPolicy,
}

impl<'k, K: Kernel> MountTreeBuilder<'k, K> {
    /// `host_root` is where host paths are read from (`/` in production),
    /// `staging` the directory holding the baseline view.
    pub fn new(
        kernel: &'k mut K,
        host_root: &Path,
        staging: &Path,
        policy: MountPolicy,
    ) -> Result<Self> {
        let staging = std::fs::canonicalize(staging).map_err(|e| {
            CordonError::Filesystem(format!("staging {}: {}", staging.display(), e))
        })?;
        Ok(Self {
            kernel,
            host_root: host_root.to_path_buf(),
            staging,
            policy,
        })
    }

    pub fn staged_path(&self, path: &HostPath) -> PathBuf {
        path.under(&self.staging)
    }

    fn host_path(&self, path: &HostPath) -> PathBuf {
        path.under(&self.host_root)
    }

    /// Execute every operation of `plan` in order. Returns how many were
    /// applied rather than skipped.
    pub fn apply(&mut self, plan: &MountPlan) -> Result<usize> {
        let mut applied = 0;
        for op in plan.ops() {
            let outcome = match op {
                MountOp::Bind {
                    mode,
                    source,
                    target,
                } => self.bind_to(*mode, source, target)?,
                MountOp::Hide { target } => self.hide(target)?,
            };
            if outcome == Outcome::Applied {
                applied += 1;
            }
        }
        log::info!(
            "Mount tree built: {} of {} operations applied",
            applied,
            plan.len()
        );
        Ok(applied)
    }

    /// Expose `path` at the same location in the staged tree.
    pub fn bind(&mut self, mode: BindMode, path: &HostPath) -> Result<Outcome> {
        self.bind_to(mode, path, path)
    }

    /// Expose host `source` at the staged location of `target`.
    pub fn bind_to(
        &mut self,
        mode: BindMode,
        source: &HostPath,
        target: &HostPath,
    ) -> Result<Outcome> {
        let kind = self.probe_source(source)?;
        if !kind.exists() {
            log::debug!("Skipping absent {}", source);
            return Ok(Outcome::Skipped);
        }

        self.ensure_parent(target)?;
        self.expose(mode, source, target, kind)?;
        Ok(Outcome::Applied)
    }

    /// Cover the staged location of `target` with empty content.
    pub fn hide(&mut self, target: &HostPath) -> Result<Outcome> {
        let (staged, kind) = self.locate(target)?;
        match kind {
            FileType::Absent => {
                log::debug!("Nothing to hide at {}", target);
                return Ok(Outcome::Skipped);
            }
            FileType::Directory => {
                let flags = self.policy.hide_flags;
                let options = self.policy.hide_tmpfs_options.clone();
                self.kernel.mount_tmpfs(&staged, flags, &options)?;
            }
            FileType::File => {
                self.kernel.bind_mount(Path::new(NULL_DEVICE), &staged)?;
            }
        }
        log::info!("Hid {}", target);
        Ok(Outcome::Applied)
    }

    fn probe_source(&self, source: &HostPath) -> Result<FileType> {
        let host = self.host_path(source);
        let kind = probe(&host)?;
        if kind.exists() && self.policy.check_real_access {
            // access(2) answers for the real uid, not the setuid-root one.
            if let Err(e) = access(&host, AccessFlags::F_OK) {
                log::warn!(
                    "{} is not reachable by the invoking user ({}); skipping",
                    source,
                    e
                );
                return Ok(FileType::Absent);
            }
        }
        Ok(kind)
    }

    /// Resolve `target` in the staged tree and classify it.
    ///
    /// The parent must resolve to exactly its lexical staged path, so no
    /// component on the way is a symlink; the final component is checked by
    /// [`probe_staged`].
    fn locate(&self, target: &HostPath) -> Result<(PathBuf, FileType)> {
        let staged = self.staged_path(target);
        if let Some(parent) = target.parent() {
            let lexical = self.staged_path(&parent);
            match std::fs::canonicalize(&lexical) {
                Ok(real) if real == lexical => {}
                Ok(real) => {
                    return Err(CordonError::Filesystem(format!(
                        "{} leaves its staged location (resolves to {})",
                        target,
                        real.display()
                    )))
                }
                Err(e) if is_absent(&e) => return Ok((staged, FileType::Absent)),
                Err(e) => {
                    return Err(CordonError::Filesystem(format!(
                        "resolve {}: {}",
                        lexical.display(),
                        e
                    )))
                }
            }
        }
        let kind = probe_staged(&staged)?;
        Ok((staged, kind))
    }

    /// Make sure every ancestor of `target` exists in the staged tree,
    /// exposing missing ones as EMPTY binds of themselves, outermost first.
    fn ensure_parent(&mut self, target: &HostPath) -> Result<()> {
        let mut missing = Vec::new();
        let mut cursor = target.parent();
        while let Some(dir) = cursor {
            let (staged, kind) = self.locate(&dir)?;
            match kind {
                FileType::Directory => break,
                FileType::File => {
                    return Err(CordonError::Filesystem(format!(
                        "{} is not a directory in the staged tree",
                        staged.display()
                    )))
                }
                FileType::Absent => {
                    if dir.is_root() {
                        return Err(CordonError::Filesystem(format!(
                            "staging directory {} is missing",
                            self.staging.display()
                        )));
                    }
                    cursor = dir.parent();
                    missing.push(dir);
                }
            }
        }

        for dir in missing.into_iter().rev() {
            let kind = self.probe_source(&dir)?;
            if kind != FileType::Directory {
                return Err(CordonError::Filesystem(format!(
                    "cannot expose {}: ancestor {} is not a directory on the host",
                    target, dir
                )));
            }
            self.expose(BindMode::Empty, &dir, &dir, kind)?;
        }
        Ok(())
    }

    fn expose(
        &mut self,
        mode: BindMode,
        source: &HostPath,
        target: &HostPath,
        kind: FileType,
    ) -> Result<()> {
        let (staged, existing) = self.locate(target)?;
        place(&staged, existing, kind)?;

        let host = self.host_path(source);
        match mode {
            BindMode::Empty => copy_metadata(&host, &staged)?,
            BindMode::ReadOnly => {
                self.kernel.bind_mount(&host, &staged)?;
                // MS_RDONLY is ignored on the initial bind; it needs its own
                // remount, repeated on every mount the bind carried along.
                self.kernel.remount_tree(&staged, MsFlags::MS_RDONLY)?;
            }
            BindMode::Full => {
                self.kernel.bind_mount(&host, &staged)?;
                let flags = self.policy.writable_flags;
                if !flags.is_empty() {
                    self.kernel.remount_tree(&staged, flags)?;
                }
            }
        }
        log::info!("Bound {} -> {} ({})", source, target, mode);
        Ok(())
    }
}

/// Create a same-type placeholder at `staged`. An existing entry of the
/// right type already satisfies the request.
fn place(staged: &Path, existing: FileType, kind: FileType) -> Result<()> {
    if existing == FileType::Absent {
        let mode = Mode::from_bits_truncate(PLACEHOLDER_MODE);
        let created = match kind {
            FileType::Directory => retry_eintr(|| mkdir(staged, mode)),
            _ => retry_eintr(|| mknod(staged, SFlag::S_IFREG, mode, 0)),
        };
        match created {
            Ok(()) => return Ok(()),
            Err(Errno::EEXIST) => {}
            Err(e) => {
                return Err(CordonError::Filesystem(format!(
                    "create placeholder {}: {}",
                    staged.display(),
                    e
                )))
            }
        }
    }

    let now = probe_staged(staged)?;
    if now != kind {
        return Err(CordonError::Filesystem(format!(
            "{} exists as {:?}, expected {:?}",
            staged.display(),
            now,
            kind
        )));
    }
    log::debug!("Placeholder {} already present", staged.display());
    Ok(())
}

/// Give `staged` the owner and permission bits of `source`.
fn copy_metadata(source: &Path, staged: &Path) -> Result<()> {
    let fail = |what: &str, path: &Path, e: std::io::Error| {
        CordonError::Filesystem(format!("{} {}: {}", what, path.display(), e))
    };
    let wanted = std::fs::metadata(source).map_err(|e| fail("stat", source, e))?;
    let current = std::fs::symlink_metadata(staged).map_err(|e| fail("stat", staged, e))?;

    // chown before chmod: chown clears set-id bits.
    if current.uid() != wanted.uid() || current.gid() != wanted.gid() {
        std::os::unix::fs::lchown(staged, Some(wanted.uid()), Some(wanted.gid()))
            .map_err(|e| fail("chown", staged, e))?;
    }
    let mode = wanted.mode() & 0o7777;
    if current.mode() & 0o7777 != mode {
        std::fs::set_permissions(staged, std::fs::Permissions::from_mode(mode))
            .map_err(|e| fail("chmod", staged, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::credentials::Identity;
    use crate::testing::recording::{KernelCall, RecordingKernel};
    use std::fs;
    use std::os::unix::fs::symlink;

    struct Fixture {
        host: tempfile::TempDir,
        staging: tempfile::TempDir,
        kernel: RecordingKernel,
    }

    impl Fixture {
        fn new() -> Self {
            let host = tempfile::tempdir().unwrap();
            let staging = tempfile::tempdir().unwrap();
            let kernel = RecordingKernel::new(Identity::plain(1000, 1000)).emulating(staging.path());
            Self {
                host,
                staging,
                kernel,
            }
        }

        fn host_dir(&self, rel: &str) {
            fs::create_dir_all(self.host.path().join(rel)).unwrap();
        }

        fn staged(&self, rel: &str) -> PathBuf {
            fs::canonicalize(self.staging.path()).unwrap().join(rel)
        }

        fn builder(&mut self) -> MountTreeBuilder<'_, RecordingKernel> {
            MountTreeBuilder::new(
                &mut self.kernel,
                self.host.path(),
                self.staging.path(),
                MountPolicy::default(),
            )
            .unwrap()
        }
    }

    fn p(path: &str) -> HostPath {
        HostPath::new(path).unwrap()
    }

    #[test]
    fn absent_source_is_a_complete_noop() {
        let mut fx = Fixture::new();
        let outcome = fx.builder().bind(BindMode::Full, &p("/a/b/c")).unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert!(!fx.staged("a").exists());
        assert!(fx.kernel.calls().is_empty());
    }

    #[test]
    fn missing_ancestors_are_exposed_empty_outermost_first() {
        let mut fx = Fixture::new();
        fx.host_dir("a/b/c");
        fs::write(fx.host.path().join("a/secret"), b"x").unwrap();

        fx.builder().bind(BindMode::ReadOnly, &p("/a/b/c")).unwrap();

        assert!(fx.staged("a/b/c").is_dir());
        assert!(!fx.staged("a/secret").exists());
        let binds: Vec<_> = fx
            .kernel
            .calls()
            .iter()
            .filter(|c| matches!(c, KernelCall::BindMount(..)))
            .collect();
        assert_eq!(binds.len(), 1, "ancestors must not be bind-mounted");
        assert!(matches!(
            fx.kernel.calls().last(),
            Some(KernelCall::RemountTree(_, flags)) if *flags == MsFlags::MS_RDONLY
        ));
    }

    #[test]
    fn full_bind_is_remounted_noexec() {
        let mut fx = Fixture::new();
        fx.host_dir("data");
        fx.builder().bind(BindMode::Full, &p("/data")).unwrap();
        assert_eq!(
            fx.kernel.calls().last(),
            Some(&KernelCall::RemountTree(fx.staged("data"), MsFlags::MS_NOEXEC))
        );
    }

    #[test]
    fn empty_bind_copies_mode_without_content() {
        let mut fx = Fixture::new();
        fx.host_dir("box");
        fs::write(fx.host.path().join("box/item"), b"x").unwrap();
        fs::set_permissions(fx.host.path().join("box"), fs::Permissions::from_mode(0o710))
            .unwrap();

        fx.builder().bind(BindMode::Empty, &p("/box")).unwrap();

        let staged = fx.staged("box");
        assert_eq!(fs::metadata(&staged).unwrap().mode() & 0o7777, 0o710);
        assert_eq!(fs::read_dir(&staged).unwrap().count(), 0);
        assert!(fx.kernel.calls().is_empty());
    }

    #[test]
    fn file_sources_get_file_placeholders() {
        let mut fx = Fixture::new();
        fx.host_dir("etc");
        fs::write(fx.host.path().join("etc/conf"), b"setting").unwrap();
        fx.builder().bind(BindMode::ReadOnly, &p("/etc/conf")).unwrap();
        assert!(fx.staged("etc/conf").is_file());
        assert_eq!(fs::read(fx.staged("etc/conf")).unwrap(), b"setting");
    }

    #[test]
    fn type_mismatch_with_existing_placeholder_fails() {
        let mut fx = Fixture::new();
        fx.host_dir("thing");
        fs::write(fx.staged("thing"), b"").unwrap();
        let err = fx.builder().bind(BindMode::Empty, &p("/thing")).unwrap_err();
        assert!(matches!(err, CordonError::Filesystem(_)));
    }

    #[test]
    fn hide_uses_tmpfs_for_dirs_and_null_device_for_files() {
        let mut fx = Fixture::new();
        fs::create_dir(fx.staged("dir")).unwrap();
        fs::write(fx.staged("file"), b"secret").unwrap();

        let mut builder = fx.builder();
        assert_eq!(builder.hide(&p("/dir")).unwrap(), Outcome::Applied);
        assert_eq!(builder.hide(&p("/file")).unwrap(), Outcome::Applied);
        assert_eq!(builder.hide(&p("/missing")).unwrap(), Outcome::Skipped);

        let calls = fx.kernel.calls();
        assert!(matches!(&calls[0], KernelCall::MountTmpfs(path, _, opts)
            if *path == fx.staged("dir") && opts == "size=2M,nr_inodes=4096,mode=755"));
        assert_eq!(
            calls[1],
            KernelCall::BindMount(PathBuf::from(NULL_DEVICE), fx.staged("file"))
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(fs::read(fx.staged("file")).unwrap(), b"");
    }

    #[test]
    fn staged_symlink_target_is_refused() {
        let mut fx = Fixture::new();
        fx.host_dir("home/alice/Downloads");
        fs::create_dir_all(fx.staged("home/alice")).unwrap();
        fs::create_dir_all(fx.staged("etc")).unwrap();
        symlink(fx.staged("etc"), fx.staged("home/alice/Downloads")).unwrap();

        let err = fx
            .builder()
            .bind(BindMode::Full, &p("/home/alice/Downloads"))
            .unwrap_err();
        assert!(matches!(err, CordonError::Filesystem(_)));
        assert!(fx.kernel.calls().is_empty());
    }

    #[test]
    fn symlinked_staged_parent_is_refused_even_inside_staging() {
        let mut fx = Fixture::new();
        fx.host_dir("home/alice/Pictures");
        fs::write(fx.host.path().join("home/alice/Pictures/passwd"), b"x").unwrap();
        fs::create_dir_all(fx.staged("home/alice")).unwrap();
        fs::create_dir_all(fx.staged("etc")).unwrap();
        fs::write(fx.staged("etc/passwd"), b"root").unwrap();
        symlink("../../etc", fx.staged("home/alice/Pictures")).unwrap();

        let err = fx
            .builder()
            .bind(BindMode::Full, &p("/home/alice/Pictures/passwd"))
            .unwrap_err();
        assert!(matches!(err, CordonError::Filesystem(_)));
        assert_eq!(fs::read(fx.staged("etc/passwd")).unwrap(), b"root");
    }

    #[test]
    fn empty_writable_flags_skip_the_remount() {
        let mut fx = Fixture::new();
        fx.host_dir("data");
        let policy = MountPolicy {
            writable_flags: MsFlags::empty(),
            ..MountPolicy::default()
        };
        MountTreeBuilder::new(&mut fx.kernel, fx.host.path(), fx.staging.path(), policy)
            .unwrap()
            .bind(BindMode::Full, &p("/data"))
            .unwrap();
        assert_eq!(fx.kernel.calls().len(), 1);
    }
}
