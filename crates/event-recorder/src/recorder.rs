//! Kubernetes-backed event sink
//!
//! Publishes `events.k8s.io/v1` events through `kube::runtime::events::Recorder`.
//! The recorder aggregates repeats of the same event into a series, so
//! re-publishing an identical notification bumps the series count on the
//! existing event instead of creating a new object.

use crate::error::RecorderError;
use crate::models::NotificationRecord;
use crate::sink_trait::EventSink;
use kube::Client;
use kube::runtime::events::{Event, Recorder, Reporter};
use std::fmt;
use tracing::debug;

/// Event sink writing to the Kubernetes API
pub struct KubeEventSink {
    recorder: Recorder,
    reporter: Reporter,
}

impl KubeEventSink {
    /// Creates a sink reporting as `controller`.
    ///
    /// The reporting instance is the pod name (`POD_NAME`) when running in a
    /// cluster, otherwise `controller` suffixed with a random id.
    pub fn new(client: Client, controller: &str) -> Self {
        let instance = std::env::var("POD_NAME")
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}-{}", controller, uuid::Uuid::new_v4().simple()));

        let reporter = Reporter {
            controller: controller.to_string(),
            instance: Some(instance),
        };

        Self {
            recorder: Recorder::new(client, reporter.clone()),
            reporter,
        }
    }
}

impl fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSink")
            .field("controller", &self.reporter.controller)
            .field("instance", &self.reporter.instance)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, record: &NotificationRecord) -> Result<(), RecorderError> {
        validate_target(record)?;

        let event = Event {
            type_: record.severity.event_type(),
            reason: record.reason.clone(),
            note: Some(record.message.clone()),
            action: record.action.clone(),
            secondary: None,
        };

        debug!(
            target_object = %record.target_key(),
            reason = %record.reason,
            severity = %record.severity,
            "publishing event"
        );

        self.recorder.publish(&event, &record.target).await?;
        Ok(())
    }
}

/// An event needs at least a name and a kind to be attached to its regarding object
fn validate_target(record: &NotificationRecord) -> Result<(), RecorderError> {
    let has_name = record.target.name.as_deref().is_some_and(|n| !n.is_empty());
    if !has_name {
        return Err(RecorderError::InvalidReference(format!(
            "event {} has no target name",
            record.reason
        )));
    }
    let has_kind = record.target.kind.as_deref().is_some_and(|k| !k.is_empty());
    if !has_kind {
        return Err(RecorderError::InvalidReference(format!(
            "event {} for {} has no target kind",
            record.reason,
            record.target_key()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use k8s_openapi::api::core::v1::ObjectReference;

    fn record(name: Option<&str>, kind: Option<&str>) -> NotificationRecord {
        NotificationRecord::new(
            ObjectReference {
                name: name.map(str::to_string),
                kind: kind.map(str::to_string),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            "ClusterReady",
            "Cluster alpha is Ready",
            Severity::Normal,
        )
    }

    #[test]
    fn test_validate_target_accepts_named_kind() {
        assert!(validate_target(&record(Some("alpha"), Some("Cluster"))).is_ok());
    }

    #[test]
    fn test_validate_target_rejects_missing_name() {
        let err = validate_target(&record(None, Some("Cluster"))).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidReference(_)));

        let err = validate_target(&record(Some(""), Some("Cluster"))).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidReference(_)));
    }

    #[test]
    fn test_validate_target_rejects_missing_kind() {
        let err = validate_target(&record(Some("alpha"), None)).unwrap_err();
        assert!(err.to_string().contains("default/alpha"));
    }
}
