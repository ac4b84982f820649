//! Testing infrastructure
//!
//! A recording kernel double for unprivileged tests, and the mountinfo
//! helpers the privileged ones check trees with.

pub mod recording;

// Re-export commonly used items
pub use crate::kernel::mountinfo::{find_mount, parse_mountinfo, MountEntry};
pub use recording::{KernelCall, RecordingKernel};
