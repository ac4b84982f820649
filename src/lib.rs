//! cordon: run a program inside a private view of the filesystem
//!
//! The program sees a read-only copy of the host with its home directory
//! replaced by a persistent per-container directory, plus whatever the caller
//! exposes or hides on top.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::ops`]: The [`kernel::Kernel`] capability trait
//! - [`kernel::host`]: Real syscalls behind that trait
//! - [`kernel::namespace`]: Mount/user namespace entry and the read-only baseline
//! - [`kernel::mount`]: The staged mount tree builder
//! - [`kernel::mountinfo`]: `/proc/self/mountinfo` parsing and submount walks
//! - [`kernel::root`]: `pivot_root` into the staged tree
//! - [`kernel::credentials`]: Identity capture, posture checks, privilege drop
//! - [`kernel::capabilities`]: Capability clearing and `no_new_privs`
//!
//! ## Execution Control ([`exec`])
//! - [`exec::preexec`]: Type-state enforced setup ordering
//! - [`exec::launcher`]: Handoff to the sandboxed program
//!
//! ## Configuration ([`config`])
//! - [`config::validator`]: Names and paths accepted from the caller
//! - [`config::plan`]: Ordered mount plans
//! - [`config::profile`]: JSON profiles and built-in presets
//! - [`config::types`]: Shared types and the error taxonomy
//!
//! ## Safety ([`safety`])
//! - [`safety::workspace`]: Persistent container and scratch directories
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::recording`]: Recording kernel double
//!
//! # Design Principles
//!
//! 1. **Default deny** - Start from a read-only host, expose by exception
//! 2. **Forward only** - Every failure aborts; nothing is rolled back
//! 3. **Validate first** - All input is checked before the first syscall

pub mod cli;
pub mod config;
pub mod exec;
pub mod kernel;
pub mod observability;
pub mod safety;
pub mod testing;
pub mod utils;
