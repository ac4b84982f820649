//! Utilities
//!
//! Fatal-error reporting for the top-level handler.

pub mod diagnostics;
