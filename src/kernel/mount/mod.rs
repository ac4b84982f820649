//! Staged mount tree construction.

pub mod tree;

pub use tree::{MountTreeBuilder, Outcome, NULL_DEVICE};
