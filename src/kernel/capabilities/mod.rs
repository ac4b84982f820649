//! Linux capability management.
//!
//! Only the user-namespace model needs this: inside a fresh user namespace the
//! process holds every capability, and a uid change between two non-zero ids
//! does not clear them.

mod drop;

pub use drop::{drop_all_capabilities, read_capability_status, set_no_new_privs, CapabilityStatus};

/// Upper bound probed when clearing the bounding set; unknown numbers are
/// rejected by the kernel and ignored.
pub(crate) const MAX_CAP: u32 = 63;

pub(crate) const PR_CAPBSET_DROP: libc::c_int = 24;
pub(crate) const PR_SET_NO_NEW_PRIVS: libc::c_int = 38;
pub(crate) const PR_CAP_AMBIENT: libc::c_int = 47;
pub(crate) const PR_CAP_AMBIENT_CLEAR_ALL: libc::c_int = 4;
pub(crate) const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;
