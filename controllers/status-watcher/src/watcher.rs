//! Dispatch loop.
//!
//! Connects a `Subscription` to an `ObjectHandler`: adds and updates are
//! deep-copied and handed to the handler, deletes are only logged. Every
//! handler invocation runs behind a panic guard so a faulty notification
//! never takes the subscription down.

use crate::error::ControllerError;
use crate::shutdown::Shutdown;
use crate::subscription::{EventHandler, Subscription, SubscriptionHandle};
use futures::FutureExt;
use kube::core::DynamicObject;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Acts on a copy of an added or updated object
#[async_trait::async_trait]
pub trait ObjectHandler: Send + Sync {
    /// Handle one object. The object is owned: it is a private copy of the
    /// subscription's cached state.
    async fn handle(&self, obj: DynamicObject);
}

/// Event handler registered with the subscription
struct Dispatch {
    handler: Arc<dyn ObjectHandler>,
}

impl Dispatch {
    async fn guarded<F>(&self, event: &'static str, obj: &DynamicObject, fut: F)
    where
        F: Future<Output = ()> + Send,
    {
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            error!(
                event,
                kind = kind(obj),
                name = name(obj),
                namespace = namespace(obj),
                panic = %panic_message(panic.as_ref()),
                "handler panicked, continuing with next notification"
            );
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for Dispatch {
    async fn on_add(&self, obj: &DynamicObject) {
        debug!(kind = kind(obj), name = name(obj), namespace = namespace(obj), "received add event");
        self.guarded("add", obj, self.handler.handle(obj.clone())).await;
    }

    async fn on_update(&self, _old: &DynamicObject, new: &DynamicObject) {
        debug!(kind = kind(new), name = name(new), namespace = namespace(new), "received update event");
        self.guarded("update", new, self.handler.handle(new.clone())).await;
    }

    async fn on_delete(&self, obj: &DynamicObject) {
        debug!(kind = kind(obj), name = name(obj), namespace = namespace(obj), "received delete event");
    }
}

/// Owns the run/stop lifecycle of one subscription
pub struct Watcher {
    subscription: Subscription,
    handle: SubscriptionHandle,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Registers `handler` behind add/update/delete callbacks on `subscription`
    pub fn new(mut subscription: Subscription, handler: Arc<dyn ObjectHandler>) -> Self {
        subscription.add_event_handler(Arc::new(Dispatch { handler }));
        let handle = subscription.handle();
        Self { subscription, handle }
    }

    /// Read side of the underlying subscription
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Runs until `shutdown` fires.
    ///
    /// Shutdown before the initial sync is a clean abort and returns `Ok`.
    /// An error means the subscription ended on its own.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ControllerError> {
        let Self { subscription, mut handle } = self;
        let mut task = tokio::spawn(subscription.run(shutdown.clone()));

        // here is where we kick the caches into gear
        let mut sync_shutdown = shutdown.clone();
        if !handle.wait_for_sync(&mut sync_shutdown).await {
            if sync_shutdown.is_triggered() {
                warn!("shutdown before caches synced, aborting");
            } else {
                error!("subscription stopped before caches synced");
            }
            return match task.await {
                Ok(()) if sync_shutdown.is_triggered() => Ok(()),
                Ok(()) => Err(ControllerError::Watch("subscription stopped before caches synced".to_string())),
                Err(e) => Err(ControllerError::Watch(format!("subscription task failed: {}", e))),
            };
        }
        info!("caches synced, watching for changes");

        let mut main_shutdown = shutdown;
        tokio::select! {
            biased;
            () = main_shutdown.wait() => {}
            result = &mut task => {
                return match result {
                    Ok(()) if main_shutdown.is_triggered() => {
                        info!("watcher stopped");
                        Ok(())
                    }
                    Ok(()) => Err(ControllerError::Watch("subscription stopped unexpectedly".to_string())),
                    Err(e) => Err(ControllerError::Watch(format!("subscription task failed: {}", e))),
                };
            }
        }

        // In-flight notification finishes; nothing new starts
        task.await
            .map_err(|e| ControllerError::Watch(format!("subscription task failed: {}", e)))?;
        info!("watcher stopped");
        Ok(())
    }
}

fn kind(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map_or("", |t| t.kind.as_str())
}

fn name(obj: &DynamicObject) -> &str {
    obj.metadata.name.as_deref().unwrap_or("")
}

fn namespace(obj: &DynamicObject) -> &str {
    obj.metadata.namespace.as_deref().unwrap_or("")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
