//! File type classification.
//!
//! Every tree-construction decision branches on one of these three answers.

use crate::config::types::{CordonError, Result};
use std::io::ErrorKind;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Absent,
    File,
    Directory,
}

impl FileType {
    pub fn exists(self) -> bool {
        self != FileType::Absent
    }
}

fn classify(result: std::io::Result<std::fs::Metadata>, path: &Path) -> Result<FileType> {
    match result {
        Ok(meta) if meta.is_dir() => Ok(FileType::Directory),
        Ok(_) => Ok(FileType::File),
        Err(e) if is_absent(&e) => Ok(FileType::Absent),
        Err(e) => Err(CordonError::Filesystem(format!(
            "stat {}: {}",
            path.display(),
            e
        ))),
    }
}

pub(crate) fn is_absent(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENOTDIR)
}

/// Classify a host path, following symlinks. A dangling link is absent.
pub fn probe(path: &Path) -> Result<FileType> {
    classify(std::fs::metadata(path), path)
}

/// Classify a staged path without following a final symlink.
///
/// A symlink is refused outright: the staged tree may contain links planted
/// by the user and every mount or ownership change must land on the entry
/// itself.
pub fn probe_staged(path: &Path) -> Result<FileType> {
    let meta = std::fs::symlink_metadata(path);
    if let Ok(ref m) = meta {
        if m.file_type().is_symlink() {
            return Err(CordonError::Filesystem(format!(
                "refusing symlink in staged tree: {}",
                path.display()
            )));
        }
    }
    classify(meta, path)
}
