//! Controller-specific error types.
//!
//! Only configuration-class errors ever leave the watcher: everything that
//! happens once the watch loop is running is logged and absorbed.

use thiserror::Error;
use kube::Error as KubeError;

/// Errors that can occur in the Object Status Watcher.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration (flags, kubeconfig, credentials)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured resource could not be resolved on the API server
    #[error("Resource discovery failed: {0}")]
    Discovery(String),

    /// Resource watch terminated unexpectedly
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Shutdown signals could not be installed
    #[error("Signal handling failed: {0}")]
    Signal(String),
}
