//! On-disk state owned by the invoking user.
//!
//! Ensures the persistent container and its scratch space exist with safe
//! ownership before any namespace is entered.

pub mod workspace;

pub use workspace::ContainerLayout;
