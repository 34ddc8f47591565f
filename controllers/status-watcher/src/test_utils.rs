//! Test utilities for the watch loop
//!
//! Object builders, a hand-fed change stream standing in for the API server,
//! and a handler that records what it was given.

use crate::subscription::{ChangeError, ChangeStream, EventHandler};
use crds::Cluster;
use futures::StreamExt;
use futures::channel::mpsc;
use kube::core::{ApiResource, DynamicObject};
use kube_runtime::watcher;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// ApiResource of the Cluster API `Cluster` kind
pub fn cluster_resource() -> ApiResource {
    ApiResource::erase::<Cluster>(&())
}

/// Untyped Cluster in namespace "default" with the given conditions
pub fn cluster(name: &str, resource_version: &str, conditions: Value) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &cluster_resource())
        .within("default")
        .data(json!({
            "spec": {"paused": false},
            "status": {"phase": "Provisioned", "conditions": conditions}
        }));
    obj.metadata.resource_version = Some(resource_version.to_string());
    obj.metadata.uid = Some(format!("uid-{}", name));
    obj
}

/// Cluster whose only condition is `Ready=<status>`
pub fn ready_cluster(name: &str, resource_version: &str, status: &str) -> DynamicObject {
    cluster(
        name,
        resource_version,
        json!([{"type": "Ready", "status": status, "lastTransitionTime": "2024-01-01T00:00:00Z"}]),
    )
}

/// Sending half of a hand-fed change stream
#[derive(Clone)]
pub struct ChangeFeed {
    tx: mpsc::UnboundedSender<Result<watcher::Event<DynamicObject>, ChangeError>>,
}

/// A change stream and the feed that drives it
pub fn change_stream() -> (ChangeFeed, ChangeStream) {
    let (tx, rx) = mpsc::unbounded();
    (ChangeFeed { tx }, rx.boxed())
}

impl ChangeFeed {
    /// Sends a raw watcher event
    pub fn send(&self, event: watcher::Event<DynamicObject>) {
        self.tx.unbounded_send(Ok(event)).unwrap();
    }

    /// Sends a complete list: Init, one InitApply per object, InitDone
    pub fn list(&self, objects: Vec<DynamicObject>) {
        self.send(watcher::Event::Init);
        for obj in objects {
            self.send(watcher::Event::InitApply(obj));
        }
        self.send(watcher::Event::InitDone);
    }

    /// Sends a live add/update
    pub fn apply(&self, obj: DynamicObject) {
        self.send(watcher::Event::Apply(obj));
    }

    /// Sends a live delete
    pub fn delete(&self, obj: DynamicObject) {
        self.send(watcher::Event::Delete(obj));
    }

    /// Sends a transient stream error
    pub fn error(&self, message: &str) {
        self.tx.unbounded_send(Err(message.into())).unwrap();
    }

    /// Ends the stream
    pub fn close(&self) {
        self.tx.close_channel();
    }
}

/// Handler recording `add:<name>:<rv>`, `update:<name>:<old rv>-><new rv>`
/// and `delete:<name>` lines
#[derive(Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
}

impl RecordingHandler {
    /// Everything recorded so far
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Waits until `count` lines were recorded; false on timeout
    pub async fn wait_for(&self, count: usize) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.seen.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait).await.is_ok()
    }

    fn record(&self, line: String) {
        self.seen.lock().unwrap().push(line);
        self.notify.notify_waiters();
    }
}

fn name(obj: &DynamicObject) -> &str {
    obj.metadata.name.as_deref().unwrap_or("<none>")
}

fn version(obj: &DynamicObject) -> &str {
    obj.metadata.resource_version.as_deref().unwrap_or("-")
}

#[async_trait::async_trait]
impl EventHandler for RecordingHandler {
    async fn on_add(&self, obj: &DynamicObject) {
        self.record(format!("add:{}:{}", name(obj), version(obj)));
    }

    async fn on_update(&self, old: &DynamicObject, new: &DynamicObject) {
        self.record(format!("update:{}:{}->{}", name(new), version(old), version(new)));
    }

    async fn on_delete(&self, obj: &DynamicObject) {
        self.record(format!("delete:{}", name(obj)));
    }
}
