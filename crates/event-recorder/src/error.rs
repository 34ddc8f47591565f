//! Event sink errors

use thiserror::Error;

/// Errors that can occur when publishing an event
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Kubernetes API error while creating or patching the event
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The target reference cannot anchor an event (e.g., missing name)
    #[error("Invalid event target: {0}")]
    InvalidReference(String),

    /// The sink refused the event
    #[error("Event rejected: {0}")]
    Rejected(String),
}
