//! Status checker.
//!
//! Evaluates the configured condition on each delivered object and emits an
//! event for every positive evaluation. There is no memory of previous
//! evaluations: an object that is re-delivered while still satisfying the
//! condition (e.g. on resync) produces another event.

use crate::condition::{ConditionOutcome, ConditionSpec, evaluate};
use crate::watcher::ObjectHandler;
use crds::Cluster;
use event_recorder::{EventSink, NotificationRecord, Severity};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use kube::core::{ApiResource, DynamicObject};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Event reason for a positive evaluation
pub const READY_REASON: &str = "ClusterReady";

/// Options for building a `StatusChecker`
pub struct StatusCheckerOpts {
    /// Condition to evaluate
    pub condition: ConditionSpec,
    /// Kind of the watched objects, used for identity-only event targets
    pub resource: ApiResource,
    /// Where events go
    pub sink: Arc<dyn EventSink>,
}

/// Emits an event whenever an object satisfies the condition
pub struct StatusChecker {
    condition: ConditionSpec,
    resource: ApiResource,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for StatusChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusChecker")
            .field("condition", &self.condition)
            .field("kind", &self.resource.kind)
            .finish_non_exhaustive()
    }
}

impl StatusChecker {
    /// Creates a new status checker
    pub fn new(opts: StatusCheckerOpts) -> Self {
        Self {
            condition: opts.condition,
            resource: opts.resource,
            sink: opts.sink,
        }
    }

    /// Event target for `obj`.
    ///
    /// Always the object's own identity under the watched resource. When the
    /// watched resource is the typed `Cluster`, the object is also converted
    /// to log its readiness details; a failed conversion is logged and the
    /// event still goes out.
    fn target_reference(&self, obj: &DynamicObject) -> ObjectReference {
        if self.watches_typed_cluster() {
            match obj.clone().try_parse::<Cluster>() {
                Ok(cluster) => describe(&cluster, self.condition.name()),
                Err(err) => {
                    error!(
                        kind = %self.resource.kind,
                        api_version = %self.resource.api_version,
                        name = obj.metadata.name.as_deref().unwrap_or(""),
                        namespace = obj.metadata.namespace.as_deref().unwrap_or(""),
                        error = %err,
                        "converting from unstructured"
                    );
                }
            }
        }
        obj.object_ref(&self.resource)
    }

    fn watches_typed_cluster(&self) -> bool {
        self.resource.api_version == Cluster::api_version(&()) && self.resource.kind == Cluster::kind(&())
    }
}

fn describe(cluster: &Cluster, condition: &str) {
    let Some(status) = &cluster.status else {
        return;
    };
    debug!(
        name = cluster.metadata.name.as_deref().unwrap_or(""),
        phase = status.phase.as_deref().unwrap_or(""),
        infrastructure = %cluster
            .spec
            .infrastructure_ref
            .as_ref()
            .map_or_else(|| "<unset>".to_string(), |r| r.display_name()),
        ready_since = ?status.condition(condition).and_then(|c| c.last_transition_time),
        "typed cluster"
    );
}

#[async_trait::async_trait]
impl ObjectHandler for StatusChecker {
    async fn handle(&self, obj: DynamicObject) {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let namespace = obj.metadata.namespace.clone().unwrap_or_default();

        let outcome = match evaluate(&obj.data, &self.condition) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    kind = %self.resource.kind,
                    api_version = %self.resource.api_version,
                    name = %name,
                    namespace = %namespace,
                    error = %err,
                    "checking for status.conditions"
                );
                return;
            }
        };

        if !outcome.is_satisfied() {
            if outcome == ConditionOutcome::NoConditions {
                debug!(name = %name, namespace = %namespace, "object has no status.conditions");
            } else {
                debug!(
                    name = %name,
                    namespace = %namespace,
                    outcome = ?outcome,
                    "{} is not {}",
                    self.condition.name(),
                    self.condition.status()
                );
            }
            return;
        }

        info!(
            kind = %self.resource.kind,
            api_version = %self.resource.api_version,
            name = %name,
            namespace = %namespace,
            "{} is {}",
            self.condition.name(),
            self.condition.status()
        );

        let record = NotificationRecord::new(
            self.target_reference(&obj),
            READY_REASON,
            format!("Cluster {} is Ready", name),
            Severity::Normal,
        );
        if let Err(err) = self.sink.publish(&record).await {
            error!(
                kind = %self.resource.kind,
                name = %name,
                namespace = %namespace,
                reason = READY_REASON,
                error = %err,
                "publishing event"
            );
        }
    }
}
