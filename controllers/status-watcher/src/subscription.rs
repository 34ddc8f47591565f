//! Change subscription for one resource kind.
//!
//! Wraps a `kube_runtime::watcher` stream with a local cache and turns the
//! raw list/watch events into add/update/delete notifications:
//!
//! - the initial list seeds the cache; `has_synced` flips once it has been
//!   merged and its notifications delivered
//! - watch reconnects and relists are absorbed by the stream's backoff and
//!   by diffing the relist against the cache
//! - deltas carrying the resourceVersion already cached are dropped
//! - a periodic resync re-delivers every cached object as an update
//!
//! Notifications are dispatched sequentially from a single task, so the
//! handlers see the events of one object in order.

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::Api;
use kube::core::DynamicObject;
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::shutdown::Shutdown;

/// Error surfaced by the underlying change stream
pub type ChangeError = Box<dyn std::error::Error + Send + Sync>;

/// Raw list/watch events for one resource kind
pub type ChangeStream = BoxStream<'static, Result<watcher::Event<DynamicObject>, ChangeError>>;

/// Cache key of a watched object. The kind is fixed per subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key of `obj`, `None` when it has no name
    pub fn from_object(obj: &DynamicObject) -> Option<Self> {
        let name = obj.metadata.name.clone()?;
        Some(Self {
            namespace: obj.metadata.namespace.clone(),
            name,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Built, not running yet
    Created,
    /// Initial list in progress
    Syncing,
    /// Initial list merged into the cache
    Synced,
    /// Delivering live deltas and resyncs
    Running,
    /// Terminated; never left
    Stopped,
}

/// A change delivered to the handlers
#[derive(Debug, Clone)]
pub enum Notification {
    /// Object entered the cache
    Add(DynamicObject),
    /// Object changed, or was re-delivered by a resync (`old` equals `new`)
    Update {
        /// Previously cached state
        old: DynamicObject,
        /// New state
        new: DynamicObject,
    },
    /// Object left the cache; carries its last known state
    Delete(DynamicObject),
}

/// Receives notifications from a subscription
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Object added to the cache
    async fn on_add(&self, obj: &DynamicObject);
    /// Object updated, or re-delivered by a resync
    async fn on_update(&self, old: &DynamicObject, new: &DynamicObject);
    /// Object removed from the cache
    async fn on_delete(&self, obj: &DynamicObject);
}

/// Local view of the watched objects.
///
/// Applies raw watcher events and reports the notifications they imply.
/// Performs no I/O.
#[derive(Debug, Default)]
pub struct Store {
    objects: HashMap<ObjectKey, DynamicObject>,
    // Objects of a list in progress, in list order
    relist: Option<Vec<(ObjectKey, DynamicObject)>>,
}

impl Store {
    /// Number of cached objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Cached state of `key`
    pub fn get(&self, key: &ObjectKey) -> Option<&DynamicObject> {
        self.objects.get(key)
    }

    /// Applies one watcher event
    pub fn apply(&mut self, event: watcher::Event<DynamicObject>) -> Vec<Notification> {
        match event {
            watcher::Event::Init => {
                self.relist = Some(Vec::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(key) = keyed(&obj) {
                    self.relist.get_or_insert_with(Vec::new).push((key, obj));
                }
                Vec::new()
            }
            watcher::Event::InitDone => {
                let listed = self.relist.take().unwrap_or_default();
                self.replace(listed)
            }
            watcher::Event::Apply(obj) => match keyed(&obj) {
                Some(key) => self.upsert(key, obj).into_iter().collect(),
                None => Vec::new(),
            },
            watcher::Event::Delete(obj) => match keyed(&obj) {
                Some(key) => match self.objects.remove(&key) {
                    Some(_) => vec![Notification::Delete(obj)],
                    None => {
                        debug!(object = %key, "ignoring delete of an object that was never cached");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            },
        }
    }

    /// Every cached object as a synthetic update, ordered by key
    pub fn resync(&self) -> Vec<Notification> {
        let mut keys: Vec<&ObjectKey> = self.objects.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| self.objects.get(key))
            .map(|obj| Notification::Update {
                old: obj.clone(),
                new: obj.clone(),
            })
            .collect()
    }

    fn upsert(&mut self, key: ObjectKey, obj: DynamicObject) -> Option<Notification> {
        match self.objects.get(&key) {
            None => {
                self.objects.insert(key, obj.clone());
                Some(Notification::Add(obj))
            }
            Some(cached) if same_version(cached, &obj) => None,
            Some(_) => {
                let old = self.objects.insert(key, obj.clone())?;
                Some(Notification::Update { old, new: obj })
            }
        }
    }

    // Adds and updates in list order, then deletes for objects the list no longer has
    fn replace(&mut self, listed: Vec<(ObjectKey, DynamicObject)>) -> Vec<Notification> {
        let mut notifications = Vec::new();
        let mut stale = std::mem::take(&mut self.objects);

        for (key, obj) in listed {
            match stale.remove(&key) {
                None => notifications.push(Notification::Add(obj.clone())),
                Some(cached) if same_version(&cached, &obj) => {}
                Some(cached) => notifications.push(Notification::Update {
                    old: cached,
                    new: obj.clone(),
                }),
            }
            self.objects.insert(key, obj);
        }

        let mut gone: Vec<(ObjectKey, DynamicObject)> = stale.into_iter().collect();
        gone.sort_by(|a, b| a.0.cmp(&b.0));
        notifications.extend(gone.into_iter().map(|(_, obj)| Notification::Delete(obj)));
        notifications
    }
}

fn keyed(obj: &DynamicObject) -> Option<ObjectKey> {
    let key = ObjectKey::from_object(obj);
    if key.is_none() {
        warn!("dropping watched object without a name");
    }
    key
}

fn same_version(a: &DynamicObject, b: &DynamicObject) -> bool {
    match (&a.metadata.resource_version, &b.metadata.resource_version) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Read side of a subscription, usable after it was moved into its task
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    state: watch::Receiver<SubscriptionState>,
    synced: watch::Receiver<bool>,
}

impl SubscriptionHandle {
    /// True once the initial list has been merged and delivered
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Blocks until the subscription has synced or `shutdown` fires.
    ///
    /// Returns false on shutdown, or when the subscription stopped without
    /// ever syncing.
    pub async fn wait_for_sync(&mut self, shutdown: &mut Shutdown) -> bool {
        if self.has_synced() {
            return true;
        }
        tokio::select! {
            biased;
            () = shutdown.wait() => false,
            synced = wait_synced(&mut self.synced) => synced,
        }
    }
}

async fn wait_synced(synced: &mut watch::Receiver<bool>) -> bool {
    synced.wait_for(|synced| *synced).await.is_ok()
}

/// Subscription to one resource kind
pub struct Subscription {
    stream: ChangeStream,
    resync_interval: Duration,
    handlers: Vec<Arc<dyn EventHandler>>,
    store: Store,
    state: watch::Sender<SubscriptionState>,
    synced: watch::Sender<bool>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("resync_interval", &self.resync_interval)
            .field("handlers", &self.handlers.len())
            .field("cached", &self.store.len())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Creates a subscription over an arbitrary change stream.
    ///
    /// A zero `resync_interval` disables resync.
    pub fn new(stream: ChangeStream, resync_interval: Duration) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Created);
        let (synced, _) = watch::channel(false);
        Self {
            stream,
            resync_interval,
            handlers: Vec::new(),
            store: Store::default(),
            state,
            synced,
        }
    }

    /// Creates a subscription listing and watching `api`.
    ///
    /// Watch failures are retried with the watcher's default backoff and a
    /// relist follows whenever the watch cannot resume.
    pub fn for_api(api: Api<DynamicObject>, resync_interval: Duration) -> Self {
        let stream: ChangeStream = watcher(api, watcher::Config::default())
            .default_backoff()
            .map_err(ChangeError::from)
            .boxed();
        Self::new(stream, resync_interval)
    }

    /// Registers a handler; handlers run in registration order
    pub fn add_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Read side for sync/state checks
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            state: self.state.subscribe(),
            synced: self.synced.subscribe(),
        }
    }

    /// Runs until `shutdown` fires or the change stream ends.
    ///
    /// A handler invocation in progress when shutdown fires runs to
    /// completion; nothing new is dispatched afterwards.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        self.set_state(SubscriptionState::Syncing);
        info!(resync_interval = ?self.resync_interval, "starting subscription");

        let mut resync = resync_timer(self.resync_interval);
        let mut synced = false;

        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => {
                    debug!("subscription observed shutdown");
                    break;
                }
                () = next_tick(&mut resync), if synced => {
                    let notifications = self.store.resync();
                    debug!(objects = notifications.len(), "resync");
                    dispatch(&self.handlers, notifications, &shutdown).await;
                }
                item = self.stream.next() => match item {
                    Some(Ok(event)) => {
                        let init_done = matches!(event, watcher::Event::InitDone);
                        let notifications = self.store.apply(event);
                        dispatch(&self.handlers, notifications, &shutdown).await;
                        if init_done && !synced && !shutdown.is_triggered() {
                            synced = true;
                            self.mark_synced();
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "watch error, retrying");
                    }
                    None => {
                        warn!("change stream ended");
                        break;
                    }
                },
            }
        }

        self.set_state(SubscriptionState::Stopped);
        info!(cached = self.store.len(), "subscription stopped");
    }

    fn mark_synced(&self) {
        self.set_state(SubscriptionState::Synced);
        self.synced.send_replace(true);
        info!(cached = self.store.len(), "cache synced");
        self.set_state(SubscriptionState::Running);
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.send_replace(state);
    }
}

// Borrows only the handlers across awaits: the change stream is not Sync
async fn dispatch(handlers: &[Arc<dyn EventHandler>], notifications: Vec<Notification>, shutdown: &Shutdown) {
    for notification in notifications {
        if shutdown.is_triggered() {
            debug!("shutdown observed, dropping undelivered notifications");
            return;
        }
        for handler in handlers {
            match &notification {
                Notification::Add(obj) => handler.on_add(obj).await,
                Notification::Update { old, new } => handler.on_update(old, new).await,
                Notification::Delete(obj) => handler.on_delete(obj).await,
            }
        }
    }
}

fn resync_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod subscription_test;
