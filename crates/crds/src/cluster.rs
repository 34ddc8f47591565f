//! Cluster Custom Resource Definition
//!
//! Typed subset of the Cluster API `Cluster` resource
//! (`cluster.x-k8s.io/v1beta1`). Only the fields the watcher reads or logs are
//! modelled; unknown fields are ignored on deserialization.

use crate::references::ProviderReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ClusterSpec defines the desired state of a Cluster API cluster
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Paused clusters are ignored by Cluster API controllers
    #[serde(default)]
    pub paused: bool,

    /// Endpoint used to communicate with the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Cluster network configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_network: Option<ClusterNetwork>,

    /// Control plane provider object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ProviderReference>,

    /// Infrastructure provider object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ProviderReference>,
}

/// Host/port pair of an API endpoint
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP on which the API server is serving
    pub host: String,

    /// Port on which the API server is serving
    pub port: i32,
}

/// Network ranges used by the cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    /// Port the API server binds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_port: Option<i32>,

    /// Pod network ranges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<NetworkRanges>,

    /// Service network ranges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<NetworkRanges>,

    /// Domain name for services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_domain: Option<String>,
}

/// List of CIDR blocks
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    /// CIDR blocks
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

/// ClusterStatus defines the observed state of a Cluster API cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Lifecycle phase (Pending, Provisioning, Provisioned, Deleting, Failed, Unknown)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Whether the infrastructure is ready
    #[serde(default)]
    pub infrastructure_ready: bool,

    /// Whether the control plane is ready
    #[serde(default)]
    pub control_plane_ready: bool,

    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Last generation observed by the Cluster API controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Terminal failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Terminal failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// Cluster API condition
///
/// Unlike the untyped scan done by the watcher, `type` and `status` are
/// required here: an object carrying a condition without them does not
/// convert to a typed `Cluster`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., "Ready", "ControlPlaneInitialized")
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False or Unknown
    pub status: String,

    /// Severity when status is False (Error, Warning, Info)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Last time the condition transitioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClusterStatus {
    /// Finds a condition by type (case-insensitive)
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.type_.eq_ignore_ascii_case(type_))
    }
}
