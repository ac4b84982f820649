//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Everything above this layer talks to the kernel through the [`Kernel`]
//! trait so tree construction can run against a recording double.
//! Dependency direction: probe -> ops -> namespace -> mount -> root -> credentials

pub mod capabilities;
pub mod credentials;
pub mod host;
pub mod mount;
pub mod mountinfo;
pub mod namespace;
pub mod ops;
pub mod probe;
pub mod root;

pub use host::HostKernel;
pub use ops::Kernel;

use nix::errno::Errno;

/// Re-issue a syscall wrapper until it stops failing with `EINTR`.
pub fn retry_eintr<T, F>(mut call: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match call() {
            Err(Errno::EINTR) => {
                log::debug!("Syscall interrupted, retrying");
                continue;
            }
            other => return other,
        }
    }
}
