//! Path and identifier validation.
//!
//! Every externally supplied path fragment passes through here before it is
//! used to build a filesystem operation. Rejection never touches the
//! filesystem.

use crate::config::types::{CordonError, Result};
use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Longest accepted container or user name.
pub const MAX_NAME_LEN: usize = 128;
/// Longest accepted home-relative mapping.
pub const MAX_MAP_PATH_LEN: usize = 256;
/// Longest accepted absolute path.
pub const MAX_HOST_PATH_LEN: usize = 4096;

fn invalid(what: &str) -> CordonError {
    CordonError::Validation(what.to_string())
}

fn check_segment(original: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(invalid(original));
    }
    Ok(())
}

/// Validate a single identifier: no separator, not `.`/`..`, not empty.
pub fn validate_name(name: &str) -> Result<()> {
    if name.contains('\0') {
        return Err(invalid(&name.replace('\0', "\\0")));
    }
    if name.contains('/') || name.len() > MAX_NAME_LEN {
        return Err(invalid(name));
    }
    check_segment(name, name)
}

/// Validate a relative path: every `/`-separated segment is a normal name.
pub fn validate_map_path(path: &str) -> Result<()> {
    if path.contains('\0') {
        return Err(invalid(&path.replace('\0', "\\0")));
    }
    if path.len() >= MAX_MAP_PATH_LEN {
        return Err(CordonError::Validation(format!("too long: {}", path)));
    }
    path.split('/').try_for_each(|segment| check_segment(path, segment))
}

/// A validated container name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerName(String);

impl ContainerName {
    pub fn new(name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated path relative to the user's home directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapPath(String);

impl MapPath {
    pub fn new(path: &str) -> Result<Self> {
        validate_map_path(path)?;
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated absolute path in the host view.
///
/// Only normal segments are allowed, so the staged counterpart (the same path
/// with the leading separator stripped, rooted under the staging directory)
/// can never climb out of the staging tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostPath(PathBuf);

impl HostPath {
    pub fn root() -> Self {
        Self(PathBuf::from("/"))
    }

    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = path.as_os_str().as_bytes();
        let shown = path.display().to_string();

        if bytes.contains(&0) {
            return Err(invalid(&shown.replace('\0', "\\0")));
        }
        if bytes.len() > MAX_HOST_PATH_LEN {
            return Err(CordonError::Validation(format!("too long: {}", shown)));
        }
        if bytes.first() != Some(&b'/') {
            return Err(CordonError::Validation(format!("not absolute: {}", shown)));
        }
        if bytes == b"/" {
            return Ok(Self::root());
        }

        for segment in bytes[1..].split(|b| *b == b'/') {
            if segment.is_empty() || segment == b"." || segment == b".." {
                return Err(invalid(&shown));
            }
        }
        Ok(Self(path.to_path_buf()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.as_os_str().as_bytes() == b"/"
    }

    /// The path without its leading separator; empty for `/`.
    pub fn relative(&self) -> &Path {
        self.0.strip_prefix("/").unwrap_or(&self.0)
    }

    pub fn parent(&self) -> Option<HostPath> {
        if self.is_root() {
            return None;
        }
        self.0.parent().map(|p| HostPath(p.to_path_buf()))
    }

    pub fn file_name(&self) -> Option<&OsStr> {
        self.0.file_name()
    }

    /// Append a validated home-relative mapping.
    pub fn join(&self, tail: &MapPath) -> HostPath {
        HostPath(self.0.join(tail.as_str()))
    }

    /// Append a single validated name.
    pub fn join_name(&self, name: &str) -> Result<HostPath> {
        validate_name(name)?;
        Ok(HostPath(self.0.join(name)))
    }

    /// Resolve this host-view path against a concrete root directory.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(self.relative())
    }
}

impl fmt::Display for HostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
