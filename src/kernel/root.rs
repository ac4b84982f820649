//! Root switch via `pivot_root(2)`.

use crate::config::types::{CordonError, Result};
use crate::kernel::ops::Kernel;
use std::path::{Path, PathBuf};

/// Where the old root is parked inside the new one. The scratch directory is
/// bound here, so detaching the old root reveals it again as `/tmp`.
pub const PUT_OLD: &str = "tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSwitcher {
    new_root: PathBuf,
}

impl RootSwitcher {
    pub fn new(new_root: &Path) -> Self {
        Self {
            new_root: new_root.to_path_buf(),
        }
    }

    /// Pivot into the staged tree, lazily detach the old root, and move to `/`.
    pub fn switch<K: Kernel>(&self, kernel: &mut K) -> Result<()> {
        let put_old = self.new_root.join(PUT_OLD);
        if !put_old.is_dir() {
            return Err(CordonError::Filesystem(format!(
                "{} must be a directory to hold the old root",
                put_old.display()
            )));
        }

        kernel.pivot_root(&self.new_root, &put_old)?;
        let old_root = Path::new("/").join(PUT_OLD);
        kernel.detach(&old_root)?;
        kernel.chdir(Path::new("/"))?;

        log::info!("Switched root to {}", self.new_root.display());
        Ok(())
    }
}
