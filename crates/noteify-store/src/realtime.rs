//! In-process change feed.
//!
//! Every committed write on a [`crate::LocalBackend`] is published on the
//! hub; each subscription runs a small forwarding task that keeps the events
//! for its table (and optional row filter) and pushes them into the
//! subscriber's channel.

use tokio::sync::{broadcast, mpsc};

use noteify_shared::constants::SUBSCRIPTION_BUFFER;
use noteify_shared::{ChangeEvent, Filter, Subscription, Table};

const HUB_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // no receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Start forwarding events for `table` that satisfy `filter`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, table: Table, filter: Option<Filter>) -> Subscription {
        let topic = match &filter {
            Some(f) => format!("{table}:{}", f.column()),
            None => table.to_string(),
        };
        let mut rx = self.tx.subscribe();
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task_topic = topic.clone();

        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %task_topic, skipped, "subscriber lagged, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if event.table != table {
                    continue;
                }
                let relevant = match (&filter, event.row()) {
                    (None, _) => true,
                    (Some(filter), Some(row)) => filter.matches(row),
                    (Some(_), None) => false,
                };
                if relevant && events_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        tracing::debug!(topic = %topic, "subscription opened");
        Subscription::new(topic, events_rx, task)
    }
}
