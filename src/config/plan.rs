//! Ordered mount plans.
//!
//! A plan is the caller-ordered list of bind and hide operations the tree
//! builder executes. The builder enforces no ordering of its own; the
//! "hide broad areas, then bind back an allow-list" shape comes from here.

use crate::config::types::{BindMode, Result};
use crate::config::validator::{HostPath, MapPath};
use crate::safety::workspace::ContainerLayout;

/// A user-facing exposure directive, relative to the home directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    Bind { mode: BindMode, path: MapPath },
    Hide { path: MapPath },
}

impl Directive {
    pub fn full(path: &str) -> Result<Self> {
        Ok(Directive::Bind {
            mode: BindMode::Full,
            path: MapPath::new(path)?,
        })
    }

    pub fn readonly(path: &str) -> Result<Self> {
        Ok(Directive::Bind {
            mode: BindMode::ReadOnly,
            path: MapPath::new(path)?,
        })
    }

    pub fn empty(path: &str) -> Result<Self> {
        Ok(Directive::Bind {
            mode: BindMode::Empty,
            path: MapPath::new(path)?,
        })
    }

    pub fn hide(path: &str) -> Result<Self> {
        Ok(Directive::Hide {
            path: MapPath::new(path)?,
        })
    }

    fn resolve(&self, home: &HostPath) -> MountOp {
        match self {
            Directive::Bind { mode, path } => MountOp::bind(*mode, home.join(path)),
            Directive::Hide { path } => MountOp::Hide {
                target: home.join(path),
            },
        }
    }
}

/// A single tree-building operation in host-view coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountOp {
    /// Expose `source` at the staged location of `target`.
    Bind {
        mode: BindMode,
        source: HostPath,
        target: HostPath,
    },
    /// Overmount the staged location of `target` with empty content.
    Hide { target: HostPath },
}

impl MountOp {
    pub fn bind(mode: BindMode, path: HostPath) -> Self {
        MountOp::Bind {
            mode,
            source: path.clone(),
            target: path,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountPlan {
    ops: Vec<MountOp>,
}

impl MountPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, mode: BindMode, path: HostPath) -> &mut Self {
        self.ops.push(MountOp::bind(mode, path));
        self
    }

    pub fn bind_to(&mut self, mode: BindMode, source: HostPath, target: HostPath) -> &mut Self {
        self.ops.push(MountOp::Bind {
            mode,
            source,
            target,
        });
        self
    }

    pub fn hide(&mut self, target: HostPath) -> &mut Self {
        self.ops.push(MountOp::Hide { target });
        self
    }

    pub fn ops(&self) -> &[MountOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The standard container plan: private `/var` and `/tmp`, every home
    /// hidden, the container bound as the user's home, then the caller's
    /// directives in order.
    pub fn for_container(layout: &ContainerLayout, directives: &[Directive]) -> Result<Self> {
        let mut plan = MountPlan::new();
        let home = layout.home();

        plan.hide(HostPath::new("/var")?)
            .bind(BindMode::Full, HostPath::new("/var/tmp")?);
        plan.bind_to(BindMode::Full, layout.scratch_dir()?, HostPath::new("/tmp")?);

        let homes = match home.parent() {
            Some(parent) if !parent.is_root() => parent,
            _ => home.clone(),
        };
        plan.hide(homes);
        plan.bind_to(BindMode::Full, layout.container_dir()?, home.clone());

        for directive in directives {
            plan.ops.push(directive.resolve(home));
        }

        Ok(plan)
    }
}
