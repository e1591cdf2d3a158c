//! Realtime change notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed row change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Row after the change (`None` for deletes).
    pub new: Option<Value>,
    /// Row before the change (`None` for inserts).
    pub old: Option<Value>,
}

impl ChangeEvent {
    /// The row the event is about: the new image, or the old one for deletes.
    pub fn row(&self) -> Option<&Value> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

/// A live channel of change events.
///
/// The forwarding task is aborted when the subscription is dropped or
/// [`unsubscribe`](Self::unsubscribe)d, so no event is delivered after
/// teardown.
pub struct Subscription {
    topic: String,
    events: mpsc::Receiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(topic: String, events: mpsc::Receiver<ChangeEvent>, task: JoinHandle<()>) -> Self {
        Self {
            topic,
            events,
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next event. `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(topic = %self.topic, "subscription closed");
        }
        self.events.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("open", &self.task.is_some())
            .finish()
    }
}
