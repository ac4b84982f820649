//! `/proc/self/mountinfo` inspection.
//!
//! The host kernel walks it to reach the mounts a recursive bind copied along,
//! and the privileged tests use it to check what a built tree looks like.

use crate::config::types::{CordonError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Mount entry from /proc/self/mountinfo
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountEntry {
    pub mount_id: u32,
    pub parent_id: u32,
    pub root: String,
    pub mount_point: String,
    pub mount_options: String,
    /// Optional fields such as `shared:7`; empty for a private mount.
    pub propagation: Vec<String>,
    pub filesystem_type: String,
    pub source: String,
}

impl MountEntry {
    fn has_option(&self, option: &str) -> bool {
        self.mount_options.split(',').any(|o| o == option)
    }

    pub fn is_read_only(&self) -> bool {
        self.has_option("ro")
    }

    pub fn is_noexec(&self) -> bool {
        self.has_option("noexec")
    }

    pub fn is_private(&self) -> bool {
        !self.propagation.iter().any(|tag| tag.starts_with("shared:"))
    }
}

/// Parse /proc/self/mountinfo
pub fn parse_mountinfo() -> Result<Vec<MountEntry>> {
    let content = fs::read_to_string("/proc/self/mountinfo").map_err(|e| {
        CordonError::Filesystem(format!("Failed to read /proc/self/mountinfo: {}", e))
    })?;
    Ok(content.lines().filter_map(parse_mountinfo_line).collect())
}

/// Mount points are escaped with octal sequences (`\040` for a space).
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a single line from /proc/self/mountinfo
/// Format: mount_id parent_id major:minor root mount_point options [optional...] - fs_type source super_options
pub fn parse_mountinfo_line(line: &str) -> Option<MountEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 10 {
        return None;
    }

    let sep_pos = parts.iter().position(|&p| p == "-")?;
    if sep_pos < 6 || sep_pos + 2 >= parts.len() {
        return None;
    }

    Some(MountEntry {
        mount_id: parts[0].parse::<u32>().ok()?,
        parent_id: parts[1].parse::<u32>().ok()?,
        root: unescape(parts[3]),
        mount_point: unescape(parts[4]),
        mount_options: parts[5].to_string(),
        propagation: parts[6..sep_pos].iter().map(|s| s.to_string()).collect(),
        filesystem_type: parts[sep_pos + 1].to_string(),
        source: parts[sep_pos + 2].to_string(),
    })
}

/// The topmost mount whose mount point is exactly `path`.
pub fn find_mount<'a>(entries: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    let wanted = path.to_string_lossy();
    entries.iter().rev().find(|e| e.mount_point == wanted)
}

/// Every mount below the topmost mount at `path`, parents before children.
///
/// Only the topmost mount at each mount point is returned; anything it
/// covers is unreachable by path and keeps its own flags.
pub fn submounts<'a>(entries: &'a [MountEntry], path: &Path) -> Vec<&'a MountEntry> {
    let top = match entries
        .iter()
        .rposition(|e| Path::new(&e.mount_point) == path)
    {
        Some(index) => index,
        None => return Vec::new(),
    };

    let mut inside: HashSet<u32> = HashSet::new();
    inside.insert(entries[top].mount_id);
    let mut found = Vec::new();
    // mountinfo lists a mount after the mount it sits on.
    for entry in &entries[top + 1..] {
        if inside.contains(&entry.parent_id) {
            inside.insert(entry.mount_id);
            found.push(entry);
        }
    }

    found
        .iter()
        .enumerate()
        .filter(|(i, entry)| {
            !found[i + 1..]
                .iter()
                .any(|later| later.mount_point == entry.mount_point)
        })
        .map(|(_, entry)| *entry)
        .collect()
}
