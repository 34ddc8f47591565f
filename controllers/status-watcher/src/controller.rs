//! Watcher wiring.
//!
//! Builds the Kubernetes client from the startup configuration, resolves the
//! watched resource through discovery, and assembles the subscription,
//! status checker and event sink into a `Watcher`.

use crate::condition::ConditionSpec;
use crate::config::{Config, ResourceSelector};
use crate::error::ControllerError;
use crate::shutdown::Shutdown;
use crate::status_checker::{StatusChecker, StatusCheckerOpts};
use crate::subscription::Subscription;
use crate::watcher::Watcher;
use event_recorder::KubeEventSink;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersion};
use kube::discovery::{self, ApiCapabilities, Scope};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Component name events are reported under
pub const CONTROLLER_NAME: &str = "object-status-watcher";

/// Object Status Watcher
#[derive(Debug)]
pub struct Controller {
    watcher: Watcher,
}

impl Controller {
    /// Connects to the cluster and prepares the watch.
    ///
    /// Every failure here is a configuration-class error: bad kubeconfig,
    /// unreachable API server, or a resource the server does not serve.
    pub async fn new(config: &Config) -> Result<Self, ControllerError> {
        info!("Initializing Object Status Watcher");

        let client = client(config).await?;
        let (resource, capabilities) = resolve(&client, &config.resource).await?;
        info!(
            resource = %config.resource,
            kind = %resource.kind,
            api_version = %resource.api_version,
            "resolved watched resource"
        );

        let api: Api<DynamicObject> = match (config.namespace_filter(), &capabilities.scope) {
            (Some(ns), Scope::Namespaced) => {
                info!("Watching namespace {}", ns);
                Api::namespaced_with(client.clone(), ns, &resource)
            }
            (Some(ns), Scope::Cluster) => {
                warn!(
                    "{} is cluster-scoped, ignoring namespace {} and watching cluster-wide",
                    resource.kind, ns
                );
                Api::all_with(client.clone(), &resource)
            }
            (None, _) => {
                info!("Watching all namespaces");
                Api::all_with(client.clone(), &resource)
            }
        };

        let sink = KubeEventSink::new(client, CONTROLLER_NAME);
        debug!(sink = ?sink, "event sink ready");

        let checker = StatusChecker::new(StatusCheckerOpts {
            condition: ConditionSpec::ready(),
            resource,
            sink: Arc::new(sink),
        });
        let subscription = Subscription::for_api(api, config.resync_interval);

        Ok(Self {
            watcher: Watcher::new(subscription, Arc::new(checker)),
        })
    }

    /// Runs the watch until `shutdown` fires
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ControllerError> {
        info!("Starting Object Status Watcher");
        self.watcher.run(shutdown).await
    }
}

/// Builds a client from an explicit kubeconfig, or from the in-cluster
/// environment with the usual inference as fallback
async fn client(config: &Config) -> Result<Client, ControllerError> {
    let kube_config = match &config.kubeconfig {
        Some(path) => {
            info!("Using kubeconfig {}", path.display());
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                ControllerError::InvalidConfig(format!("reading kubeconfig {}: {}", path.display(), e))
            })?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ControllerError::InvalidConfig(format!("loading kubeconfig {}: {}", path.display(), e)))?
        }
        None => match kube::Config::incluster() {
            Ok(kube_config) => {
                info!("Using in-cluster configuration");
                kube_config
            }
            Err(e) => {
                debug!("in-cluster configuration unavailable ({}), inferring", e);
                kube::Config::infer()
                    .await
                    .map_err(|e| ControllerError::InvalidConfig(format!("inferring client configuration: {}", e)))?
            }
        },
    };

    Ok(Client::try_from(kube_config)?)
}

/// Resolves the selector to the served kind via API discovery
async fn resolve(
    client: &Client,
    selector: &ResourceSelector,
) -> Result<(ApiResource, ApiCapabilities), ControllerError> {
    let group = if selector.version.is_empty() {
        discovery::group(client, &selector.group).await
    } else {
        discovery::pinned_group(client, &GroupVersion::gv(&selector.group, &selector.version)).await
    }
    .map_err(|e| ControllerError::Discovery(format!("{}: {}", selector, e)))?;

    group
        .recommended_resources()
        .into_iter()
        .find(|(resource, _)| resource.plural == selector.resource)
        .ok_or_else(|| ControllerError::Discovery(format!("{}: resource is not served", selector)))
}
