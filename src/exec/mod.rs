//! Execution control
//!
//! Orders the kernel primitives into one forward-only setup sequence and hands
//! off to the sandboxed program.

pub mod launcher;
pub mod preexec;

pub use launcher::{ExecLauncher, LaunchRequest, Launcher};
pub use preexec::{run_sandbox, Sandbox, SandboxConfig};
