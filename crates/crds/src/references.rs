//! Object references embedded in Cluster API specs
//!
//! Cluster API points at its infrastructure and control plane providers with
//! plain `corev1.ObjectReference`-shaped values.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a provider object (infrastructure cluster, control plane)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReference {
    /// API version of the referenced object (e.g., "infrastructure.cluster.x-k8s.io/v1beta1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the referenced object (e.g., "DockerCluster")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the referenced object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Namespace of the referenced object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// UID of the referenced object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl ProviderReference {
    /// `kind/name`, or `<unset>` when either part is missing
    pub fn display_name(&self) -> String {
        match (&self.kind, &self.name) {
            (Some(kind), Some(name)) => format!("{}/{}", kind, name),
            _ => "<unset>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let reference = ProviderReference {
            kind: Some("DockerCluster".to_string()),
            name: Some("capi-quickstart".to_string()),
            ..Default::default()
        };
        assert_eq!(reference.display_name(), "DockerCluster/capi-quickstart");
        assert_eq!(ProviderReference::default().display_name(), "<unset>");
    }
}
