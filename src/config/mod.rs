//! Configuration and policy
//!
//! Validated inputs, mount plans, and application profiles.

pub mod plan;
pub mod profile;
pub mod types;
pub mod validator;

pub use plan::{Directive, MountOp, MountPlan};
pub use profile::{Preset, Profile};
pub use types::{BindMode, CordonError, ErrorClass, MountPolicy, PrivilegeModel, Result};
