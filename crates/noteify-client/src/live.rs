//! Live queries: a change subscription that re-fetches a whole list on every
//! event and hands the fresh result to a callback.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use noteify_shared::Subscription;

use crate::error::ClientResult;
use crate::events::EventSink;

/// Handle to a running live query. Closing or dropping it tears the
/// underlying subscription down; no callback starts after that, even when a
/// refresh was already running on another worker.
pub struct LiveQuery {
    topic: String,
    closed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LiveQuery {
    pub(crate) fn spawn<T, F, Fut, C>(
        mut subscription: Subscription,
        events: EventSink,
        refetch: F,
        on_change: C,
    ) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
        C: Fn(T) + Send + 'static,
    {
        let topic = subscription.topic().to_string();
        let task_topic = topic.clone();
        let closed = Arc::new(AtomicBool::new(false));
        let task_closed = Arc::clone(&closed);

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                tracing::debug!(topic = %task_topic, kind = ?event.kind, "change received, refreshing");
                let result = refetch().await;
                if task_closed.load(Ordering::SeqCst) {
                    break;
                }
                match result {
                    Ok(items) => on_change(items),
                    Err(e) => events.report("refresh", &e),
                }
            }
            tracing::debug!(topic = %task_topic, "change feed ended");
        });

        Self {
            topic,
            closed,
            task: Some(task),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn close(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            // dropping the task's future drops the subscription with it
            task.abort();
            tracing::debug!(topic = %self.topic, "live query closed");
        }
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use noteify_shared::{ChangeEvent, ChangeKind, Table};
    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::error::ClientError;

    fn insert_event() -> ChangeEvent {
        ChangeEvent {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            new: Some(serde_json::json!({})),
            old: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_during_refresh_skips_the_callback() {
        let (tx, rx) = mpsc::channel(4);
        let subscription = Subscription::new("test".into(), rx, tokio::spawn(async {}));
        let (started_tx, started_rx) = oneshot::channel();
        let started = std::sync::Mutex::new(Some(started_tx));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let live = LiveQuery::spawn(
            subscription,
            EventSink::new(),
            move || {
                if let Some(started) = started.lock().unwrap().take() {
                    let _ = started.send(());
                }
                async {
                    // not an await point, so abort cannot cut it short
                    std::thread::sleep(Duration::from_millis(100));
                    Ok::<(), ClientError>(())
                }
            },
            move |()| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        tx.send(insert_event()).await.unwrap();
        started_rx.await.unwrap();
        live.close();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn events_trigger_refresh_until_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let subscription = Subscription::new("test".into(), rx, tokio::spawn(async {}));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let live = LiveQuery::spawn(
            subscription,
            EventSink::new(),
            || async { Ok::<i32, ClientError>(7) },
            move |n: i32| {
                let _ = seen_tx.send(n);
            },
        );
        assert!(live.is_active());

        tx.send(insert_event()).await.unwrap();
        assert_eq!(seen_rx.recv().await, Some(7));

        drop(live);
        assert!(seen_rx.recv().await.is_none());
    }
}
