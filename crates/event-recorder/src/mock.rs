//! Mock EventSink for unit testing
//!
//! Records every published notification in memory so tests can assert on
//! what the watch loop emitted without a running API server.

use crate::error::RecorderError;
use crate::models::NotificationRecord;
use crate::sink_trait::EventSink;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory event sink
#[derive(Clone, Debug, Default)]
pub struct MockEventSink {
    published: Arc<Mutex<Vec<NotificationRecord>>>,
    // Number of upcoming publish calls that fail
    failures: Arc<Mutex<usize>>,
    notify: Arc<Notify>,
}

impl MockEventSink {
    /// Create a new, empty mock sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publish calls fail with `RecorderError::Rejected`
    pub fn fail_next(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    /// Every successfully published record, in order
    pub fn published(&self) -> Vec<NotificationRecord> {
        self.published.lock().unwrap().clone()
    }

    /// Number of successfully published records
    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Records whose target has the given name
    pub fn published_for(&self, name: &str) -> Vec<NotificationRecord> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target.name.as_deref() == Some(name))
            .cloned()
            .collect()
    }

    /// Wait until at least `count` records were published.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait::async_trait]
impl EventSink for MockEventSink {
    async fn publish(&self, record: &NotificationRecord) -> Result<(), RecorderError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(RecorderError::Rejected(format!(
                    "mock sink rejected {} for {}",
                    record.reason,
                    record.target_key()
                )));
            }
        }

        self.published.lock().unwrap().push(record.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
