//! Application profiles: named allow-lists of home-relative paths.
//!
//! A profile is either one of the built-in presets or a JSON file:
//!
//! ```json
//! { "nx": false,
//!   "directives": [ { "mode": "readonly", "path": ".config" },
//!                   { "mode": "full", "path": "Downloads" } ] }
//! ```

use crate::config::plan::Directive;
use crate::config::types::{BindMode, CordonError, Result};
use crate::config::validator::MapPath;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    Full,
    Readonly,
    Empty,
    Hide,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileEntry {
    pub mode: EntryMode,
    pub path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Apply the global no-exec hardening.
    #[serde(default)]
    pub nx: bool,
    #[serde(default)]
    pub directives: Vec<ProfileEntry>,
}

/// Built-in profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Web browser: desktop config read-only, certificate store and
    /// downloads writable, pictures read-only for uploads.
    Browser,
}

impl Preset {
    pub fn profile(self) -> Profile {
        let entry = |mode, path: &str| ProfileEntry {
            mode,
            path: path.to_string(),
        };
        match self {
            Preset::Browser => Profile {
                nx: false,
                directives: vec![
                    entry(EntryMode::Empty, ".local"),
                    entry(EntryMode::Readonly, ".local/share"),
                    entry(EntryMode::Readonly, ".config"),
                    entry(EntryMode::Full, ".pki"),
                    entry(EntryMode::Full, "Downloads"),
                    entry(EntryMode::Readonly, "Pictures"),
                ],
            },
        }
    }
}

impl Profile {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| CordonError::Config(format!("invalid profile: {}", e)))
    }

    /// Load a profile file on behalf of the invoking user.
    ///
    /// The file must be readable by the real uid; a setuid-root process must
    /// not become a way to probe files the caller cannot read.
    pub fn load(path: &Path) -> Result<Self> {
        use nix::unistd::{access, AccessFlags};

        access(path, AccessFlags::R_OK).map_err(|e| {
            CordonError::Config(format!("cannot read profile {}: {}", path.display(), e))
        })?;
        let text = std::fs::read_to_string(path).map_err(|e| {
            CordonError::Config(format!("cannot read profile {}: {}", path.display(), e))
        })?;
        log::debug!("Loaded profile {}", path.display());
        Self::from_json(&text)
    }

    /// Merge another profile after this one; directive order is kept.
    pub fn extend(&mut self, other: Profile) {
        self.nx |= other.nx;
        self.directives.extend(other.directives);
    }

    pub fn directives(&self) -> Result<Vec<Directive>> {
        self.directives
            .iter()
            .map(|entry| {
                let path = MapPath::new(&entry.path)?;
                Ok(match entry.mode {
                    EntryMode::Full => Directive::Bind {
                        mode: BindMode::Full,
                        path,
                    },
                    EntryMode::Readonly => Directive::Bind {
                        mode: BindMode::ReadOnly,
                        path,
                    },
                    EntryMode::Empty => Directive::Bind {
                        mode: BindMode::Empty,
                        path,
                    },
                    EntryMode::Hide => Directive::Hide { path },
                })
            })
            .collect()
    }
}
