/// Security event logging for cordon
/// Provides a structured record of every sandbox setup step for incident response
///
/// Events are serialized as one compact JSON object each and emitted through
/// the `log` facade on the `cordon::audit` target. Nothing is written to files:
/// the binary may run setuid-root and must not open caller-influenced paths.
use crate::config::types::PrivilegeModel;
use log::{error, info, warn, Level};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Log target carrying audit records.
pub const AUDIT_TARGET: &str = "cordon::audit";

/// Security event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecuritySeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl SecuritySeverity {
    pub fn level(self) -> Level {
        match self {
            SecuritySeverity::Critical | SecuritySeverity::High => Level::Error,
            SecuritySeverity::Medium => Level::Warn,
            SecuritySeverity::Low => Level::Info,
        }
    }
}

/// One per pipeline state, plus the two rejection paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventType {
    SandboxStart,
    ValidationRejected,
    PreconditionFailed,
    NamespaceIsolated,
    TreeBuilt,
    RootSwitched,
    PrivilegesDropped,
    Handoff,
    Aborted,
}

impl SecurityEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> SecuritySeverity {
        match self {
            SecurityEventType::SandboxStart
            | SecurityEventType::NamespaceIsolated
            | SecurityEventType::TreeBuilt
            | SecurityEventType::RootSwitched
            | SecurityEventType::PrivilegesDropped
            | SecurityEventType::Handoff => SecuritySeverity::Low,
            SecurityEventType::ValidationRejected => SecuritySeverity::Medium,
            SecurityEventType::PreconditionFailed => SecuritySeverity::High,
            SecurityEventType::Aborted => SecuritySeverity::Critical,
        }
    }
}

/// Correlation identifiers shared by every event of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIds {
    pub run_id: String,
    pub container: String,
    pub real_uid: Option<u32>,
    pub pid: u32,
}

impl CorrelationIds {
    pub fn new(container: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            container: container.to_string(),
            real_uid: None,
            pid: std::process::id(),
        }
    }

    pub fn with_real_uid(mut self, uid: u32) -> Self {
        self.real_uid = Some(uid);
        self
    }
}

/// Individual security event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: SecuritySeverity,
    pub timestamp: SystemTime,
    pub details: String,
    pub correlation: Option<CorrelationIds>,
    pub model: Option<String>,
}

impl SecurityEvent {
    /// Create a new security event with default severity
    pub fn new(event_type: SecurityEventType, details: impl Into<String>) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: SystemTime::now(),
            details: details.into(),
            correlation: None,
            model: None,
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationIds) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_model(mut self, model: Option<PrivilegeModel>) -> Self {
        self.model = model.map(|m| m.to_string());
        self
    }

    /// Compact JSON record.
    pub fn to_json(&self) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "timestamp": self.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
        });

        if let Some(correlation) = &self.correlation {
            entry["correlation"] = serde_json::json!({
                "run_id": correlation.run_id,
                "container": correlation.container,
                "real_uid": correlation.real_uid,
                "pid": correlation.pid,
            });
        }
        if let Some(model) = &self.model {
            entry["model"] = serde_json::json!(model);
        }
        entry
    }
}

/// Emit one event on the audit target.
pub fn log_security_event(event: &SecurityEvent) {
    let record = event.to_json();
    match event.severity.level() {
        Level::Error => error!(target: AUDIT_TARGET, "{}", record),
        Level::Warn => warn!(target: AUDIT_TARGET, "{}", record),
        _ => info!(target: AUDIT_TARGET, "{}", record),
    }
}

/// Per-run audit emitter; stamps every event with the same correlation ids
/// and, once chosen, the privilege model.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    correlation: CorrelationIds,
    model: Option<PrivilegeModel>,
}

impl AuditTrail {
    pub fn new(correlation: CorrelationIds) -> Self {
        Self {
            correlation,
            model: None,
        }
    }

    pub fn with_model(mut self, model: PrivilegeModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.correlation.run_id
    }

    pub fn correlation(&self) -> &CorrelationIds {
        &self.correlation
    }

    pub fn event(&self, event_type: SecurityEventType, details: impl Into<String>) -> SecurityEvent {
        SecurityEvent::new(event_type, details)
            .with_correlation(self.correlation.clone())
            .with_model(self.model)
    }

    pub fn record(&self, event_type: SecurityEventType, details: impl Into<String>) {
        log_security_event(&self.event(event_type, details));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_carries_correlation() {
        let trail = AuditTrail::new(CorrelationIds::new("browser").with_real_uid(1000))
            .with_model(PrivilegeModel::UserNamespace);
        let json = trail
            .event(SecurityEventType::TreeBuilt, "12 operations")
            .to_json();

        assert_eq!(json["event_type"], "TreeBuilt");
        assert_eq!(json["severity"], "Low");
        assert_eq!(json["correlation"]["container"], "browser");
        assert_eq!(json["correlation"]["real_uid"], 1000);
        assert_eq!(json["correlation"]["run_id"], trail.run_id());
        assert_eq!(json["model"], "userns");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(
            CorrelationIds::new("a").run_id,
            CorrelationIds::new("a").run_id
        );
    }

    #[test]
    fn rejection_events_escalate() {
        assert_eq!(
            SecurityEventType::Aborted.default_severity().level(),
            Level::Error
        );
        assert_eq!(
            SecurityEventType::ValidationRejected.default_severity(),
            SecuritySeverity::Medium
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = SecurityEvent::new(SecurityEventType::Handoff, "exec").to_json();
        assert!(json.get("correlation").is_none());
        assert!(json.get("model").is_none());
    }
}
