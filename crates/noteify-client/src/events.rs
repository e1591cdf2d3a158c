//! Events pushed from the sync layer to whatever renders the UI.

use serde::Serialize;
use tokio::sync::broadcast;

use noteify_shared::types::{ConversationId, NoteId, UserId};

use crate::error::ClientError;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
}

/// A transient toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    Notice(Notice),
    ConversationsChanged { user_id: UserId, count: usize },
    MessagesChanged { conversation_id: ConversationId, count: usize },
    NoteSaved { note_id: NoteId },
    NoteReverted { note_id: NoteId },
}

/// Fan-out of [`ClientEvent`]s. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped, no listener");
        }
    }

    /// Log `err` and show its user-facing text as an error notice.
    pub fn report(&self, context: &str, err: &ClientError) {
        tracing::warn!(context, error = %err, "operation failed");
        self.emit(ClientEvent::Notice(Notice {
            level: NoticeLevel::Error,
            text: err.user_message(),
        }));
    }
}
