//! Tests for the dispatch loop, driven end to end through a hand-fed change
//! stream and the mock event sink

use super::*;
use crate::condition::ConditionSpec;
use crate::shutdown;
use crate::status_checker::{StatusChecker, StatusCheckerOpts};
use crate::subscription::SubscriptionState;
use crate::test_utils::*;
use event_recorder::MockEventSink;
use std::sync::Mutex;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn status_watcher(stream: crate::subscription::ChangeStream, sink: &MockEventSink) -> Watcher {
    let checker = StatusChecker::new(StatusCheckerOpts {
        condition: ConditionSpec::ready(),
        resource: cluster_resource(),
        sink: Arc::new(sink.clone()),
    });
    Watcher::new(Subscription::new(stream, Duration::ZERO), Arc::new(checker))
}

/// Records handled names; panics on "boom"
#[derive(Default)]
struct Exploding {
    handled: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ObjectHandler for Exploding {
    async fn handle(&self, obj: DynamicObject) {
        let name = obj.metadata.name.clone().unwrap_or_default();
        if name == "boom" {
            panic!("cannot handle {}", name);
        }
        self.handled.lock().unwrap().push(name);
    }
}

#[tokio::test]
async fn test_ready_transitions_emit_one_event_each() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let watcher = status_watcher(stream, &sink);
    let mut handle = watcher.handle();

    let (trigger, shutdown) = shutdown::channel();
    let task = tokio::spawn(watcher.run(shutdown.clone()));

    feed.list(Vec::new());
    assert!(handle.wait_for_sync(&mut shutdown.clone()).await);

    // Ready=True on add
    feed.apply(ready_cluster("alpha", "1", "True"));
    assert!(sink.wait_for_count(1, WAIT).await);

    // Ready=False emits nothing; the sentinel orders the assertion
    feed.apply(ready_cluster("alpha", "2", "False"));
    feed.apply(ready_cluster("sentinel", "1", "True"));
    assert!(sink.wait_for_count(2, WAIT).await);
    assert_eq!(sink.published_for("alpha").len(), 1);

    // Back to Ready=True
    feed.apply(ready_cluster("alpha", "3", "True"));
    assert!(sink.wait_for_count(3, WAIT).await);
    assert_eq!(sink.published_for("alpha").len(), 2);

    // Deletes never evaluate or emit
    feed.delete(ready_cluster("alpha", "4", "True"));
    feed.apply(ready_cluster("sentinel", "2", "True"));
    assert!(sink.wait_for_count(4, WAIT).await);
    assert_eq!(sink.published_for("alpha").len(), 2);
    assert_eq!(sink.published_for("sentinel").len(), 2);

    let messages: Vec<String> = sink.published().into_iter().map(|r| r.message).collect();
    assert_eq!(
        messages,
        vec![
            "Cluster alpha is Ready",
            "Cluster sentinel is Ready",
            "Cluster alpha is Ready",
            "Cluster sentinel is Ready",
        ]
    );

    trigger.trigger();
    assert!(task.await.unwrap().is_ok());
    assert_eq!(handle.state(), SubscriptionState::Stopped);
}

#[tokio::test]
async fn test_initial_list_is_evaluated() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let watcher = status_watcher(stream, &sink);

    let (trigger, shutdown) = shutdown::channel();
    let task = tokio::spawn(watcher.run(shutdown));

    feed.list(vec![
        ready_cluster("alpha", "1", "True"),
        ready_cluster("beta", "1", "False"),
        ready_cluster("gamma", "1", "True"),
    ]);
    assert!(sink.wait_for_count(2, WAIT).await);

    let names: Vec<String> = sink.published().into_iter().filter_map(|r| r.target.name).collect();
    assert_eq!(names, vec!["alpha", "gamma"]);

    trigger.trigger();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_redelivered_object_emits_again() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let watcher = status_watcher(stream, &sink);

    let (trigger, shutdown) = shutdown::channel();
    let task = tokio::spawn(watcher.run(shutdown));

    feed.list(vec![ready_cluster("alpha", "1", "True")]);
    assert!(sink.wait_for_count(1, WAIT).await);

    // A new resourceVersion with the same Ready=True is evaluated and emitted again
    feed.apply(ready_cluster("alpha", "2", "True"));
    assert!(sink.wait_for_count(2, WAIT).await);
    assert_eq!(sink.published_for("alpha").len(), 2);

    trigger.trigger();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_handler_panic_does_not_stop_dispatch() {
    let (feed, stream) = change_stream();
    let handler = Arc::new(Exploding::default());
    let watcher = Watcher::new(Subscription::new(stream, Duration::ZERO), handler.clone());
    let mut handle = watcher.handle();

    let (trigger, shutdown) = shutdown::channel();
    let task = tokio::spawn(watcher.run(shutdown.clone()));

    feed.list(vec![ready_cluster("boom", "1", "True"), ready_cluster("alpha", "1", "True")]);
    assert!(handle.wait_for_sync(&mut shutdown.clone()).await);
    feed.apply(ready_cluster("boom", "2", "True"));
    feed.apply(ready_cluster("beta", "1", "True"));
    feed.close();

    // Stream end surfaces as an error once every delivered item was handled
    assert!(matches!(task.await.unwrap(), Err(ControllerError::Watch(_))));
    assert_eq!(*handler.handled.lock().unwrap(), vec!["alpha", "beta"]);
    assert_eq!(handle.state(), SubscriptionState::Stopped);

    drop(trigger);
}

#[tokio::test]
async fn test_shutdown_before_sync_is_clean() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let watcher = status_watcher(stream, &sink);
    let handle = watcher.handle();

    let (trigger, shutdown) = shutdown::channel();
    trigger.trigger();

    // The list never completes
    feed.send(kube_runtime::watcher::Event::Init);
    feed.send(kube_runtime::watcher::Event::InitApply(ready_cluster("alpha", "1", "True")));

    assert!(watcher.run(shutdown).await.is_ok());
    assert!(!handle.has_synced());
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn test_stream_end_before_sync_is_an_error() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let watcher = status_watcher(stream, &sink);

    let (_trigger, shutdown) = shutdown::channel();
    feed.close();

    assert!(matches!(watcher.run(shutdown).await, Err(ControllerError::Watch(_))));
    assert_eq!(sink.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resync_emits_for_unchanged_ready_object() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let checker = StatusChecker::new(StatusCheckerOpts {
        condition: ConditionSpec::ready(),
        resource: cluster_resource(),
        sink: Arc::new(sink.clone()),
    });
    let watcher = Watcher::new(Subscription::new(stream, Duration::from_secs(60)), Arc::new(checker));

    let (trigger, shutdown) = shutdown::channel();
    let task = tokio::spawn(watcher.run(shutdown));

    feed.list(vec![ready_cluster("alpha", "1", "True")]);
    assert!(sink.wait_for_count(1, WAIT).await);

    // No change on the wire: every resync tick re-evaluates and emits again
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(sink.wait_for_count(2, WAIT).await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(sink.wait_for_count(3, WAIT).await);

    let published = sink.published_for("alpha");
    assert_eq!(published.len(), 3);
    assert!(published.iter().all(|r| r == &published[0]));

    trigger.trigger();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shutdown_while_waiting_for_sync() {
    let (feed, stream) = change_stream();
    let sink = MockEventSink::new();
    let watcher = status_watcher(stream, &sink);
    let handle = watcher.handle();

    let (trigger, shutdown) = shutdown::channel();
    let task = tokio::spawn(watcher.run(shutdown));

    // The list starts but never completes; the watcher is parked in its sync wait
    feed.send(kube_runtime::watcher::Event::Init);
    feed.send(kube_runtime::watcher::Event::InitApply(ready_cluster("alpha", "1", "True")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    assert_eq!(handle.state(), SubscriptionState::Syncing);

    trigger.trigger();
    assert!(tokio::time::timeout(WAIT, task).await.unwrap().unwrap().is_ok());
    assert!(!handle.has_synced());
    assert_eq!(handle.state(), SubscriptionState::Stopped);
    assert_eq!(sink.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_after_sync_is_always_clean() {
    // The subscription task and the watcher observe the same trigger; the
    // watcher must report a clean stop whichever notices first
    for _ in 0..50 {
        let (feed, stream) = change_stream();
        let sink = MockEventSink::new();
        let watcher = status_watcher(stream, &sink);
        let mut handle = watcher.handle();

        let (trigger, shutdown) = shutdown::channel();
        let task = tokio::spawn(watcher.run(shutdown.clone()));

        feed.list(vec![ready_cluster("alpha", "1", "True")]);
        assert!(handle.wait_for_sync(&mut shutdown.clone()).await);

        trigger.trigger();
        assert!(task.await.unwrap().is_ok());
    }
}

#[test]
fn test_panic_message() {
    let payload: Box<dyn Any + Send> = Box::new("static message");
    assert_eq!(panic_message(payload.as_ref()), "static message");

    let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
    assert_eq!(panic_message(payload.as_ref()), "owned message");

    let payload: Box<dyn Any + Send> = Box::new(42u32);
    assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
}
