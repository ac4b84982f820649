//! Process identity: capture, posture checks and the final privilege drop.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid.

mod identity;
mod transition;
mod validation;

pub use identity::{Account, Identity};
pub use transition::PrivilegeDropper;
pub use validation::{select_model, validate_posture};
