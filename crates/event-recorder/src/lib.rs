//! Kubernetes Event Sink
//!
//! Turns a positive status check into a Kubernetes `Event` attached to the
//! observed object.
//!
//! # Example
//!
//! ```no_run
//! use event_recorder::{EventSink, KubeEventSink, NotificationRecord, Severity};
//! use k8s_openapi::api::core::v1::ObjectReference;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let sink = KubeEventSink::new(client, "object-status-watcher");
//!
//! let target = ObjectReference {
//!     api_version: Some("cluster.x-k8s.io/v1beta1".to_string()),
//!     kind: Some("Cluster".to_string()),
//!     name: Some("capi-quickstart".to_string()),
//!     namespace: Some("default".to_string()),
//!     ..Default::default()
//! };
//! let record = NotificationRecord::new(
//!     target,
//!     "ClusterReady",
//!     "Cluster capi-quickstart is Ready",
//!     Severity::Normal,
//! );
//! sink.publish(&record).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod recorder;
#[path = "trait.rs"]
pub mod sink_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use error::RecorderError;
pub use models::*;
pub use recorder::KubeEventSink;
pub use sink_trait::EventSink;
#[cfg(feature = "test-util")]
pub use mock::MockEventSink;
