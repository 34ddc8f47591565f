//! EventSink trait for mocking
//!
//! Abstracts event emission so the watch loop can be tested without an API
//! server. `KubeEventSink` implements it against the cluster; tests use
//! `MockEventSink` (feature `test-util`).

use crate::error::RecorderError;
use crate::models::NotificationRecord;

/// Destination for notification events
///
/// Implementations must tolerate concurrent calls for distinct objects.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event. Fire-and-forget from the caller's point of view:
    /// an error is reported back but never retried here.
    async fn publish(&self, record: &NotificationRecord) -> Result<(), RecorderError>;
}
