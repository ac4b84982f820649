//! Observability
//!
//! Structured audit events for every sandbox setup step.

pub mod audit;

pub use audit::{AuditTrail, CorrelationIds, SecurityEvent, SecurityEventType};
