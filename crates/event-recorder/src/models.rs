//! Event models

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use std::fmt;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// Informational event
    #[default]
    Normal,
    /// Something the operator may need to look at
    Warning,
}

impl Severity {
    /// Maps to the events API type
    pub fn event_type(self) -> EventType {
        match self {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => write!(f, "Normal"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// One notification about one object
///
/// Ephemeral: built per positive evaluation, handed to an `EventSink` and
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    /// Object the event is attached to
    pub target: ObjectReference,
    /// Machine-readable reason (e.g., "ClusterReady")
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// What the reporting controller was doing
    pub action: String,
    /// Event severity
    pub severity: Severity,
}

/// Action reported when none is given explicitly
pub const DEFAULT_ACTION: &str = "StatusCheck";

impl NotificationRecord {
    /// Creates a record with the default action
    pub fn new(
        target: ObjectReference,
        reason: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            target,
            reason: reason.into(),
            message: message.into(),
            action: DEFAULT_ACTION.to_string(),
            severity,
        }
    }

    /// `namespace/name` of the target, `name` for cluster-scoped targets
    pub fn target_key(&self) -> String {
        let name = self.target.name.as_deref().unwrap_or("<unknown>");
        match self.target.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
            _ => name.to_string(),
        }
    }
}
