//! Direct-message conversations and their messages.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use noteify_shared::types::{Conversation, ConversationId, ConversationSummary, Message, Profile, UserId};
use noteify_shared::{decode_row, decode_rows, validation, Backend, Direction, Filter, Query, Table, ValidationError};

use crate::error::ClientResult;
use crate::events::{ClientEvent, EventSink};
use crate::live::LiveQuery;

pub struct ConversationService<B> {
    backend: Arc<B>,
    events: EventSink,
}

impl<B> Clone for ConversationService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
        }
    }
}

impl<B: Backend> ConversationService<B> {
    pub fn new(backend: Arc<B>, events: EventSink) -> Self {
        Self { backend, events }
    }

    /// Conversations `user` takes part in, newest first.
    pub async fn list_conversations(&self, user: UserId) -> ClientResult<Vec<Conversation>> {
        let rows = self
            .backend
            .select(
                Table::Conversations,
                Query::new()
                    .filter(Filter::contains("participant_ids", [user]))
                    .order_by("created_at", Direction::Desc),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    /// Conversations paired with the other participant's profile.
    pub async fn list_conversation_summaries(
        &self,
        user: UserId,
    ) -> ClientResult<Vec<ConversationSummary>> {
        let conversations = self.list_conversations(user).await?;

        let counterpart_ids: Vec<UserId> = conversations
            .iter()
            .filter_map(|c| c.counterpart(user))
            .collect();

        let mut profiles: HashMap<UserId, Profile> = HashMap::new();
        if !counterpart_ids.is_empty() {
            let rows = self
                .backend
                .select(
                    Table::Profiles,
                    Query::new().filter(Filter::is_in("id", counterpart_ids)),
                )
                .await?;
            for profile in decode_rows::<Profile>(rows)? {
                profiles.insert(profile.id, profile);
            }
        }

        Ok(conversations
            .into_iter()
            .map(|conversation| {
                let counterpart = conversation
                    .counterpart(user)
                    .and_then(|id| profiles.get(&id).cloned());
                ConversationSummary {
                    conversation,
                    counterpart,
                }
            })
            .collect())
    }

    /// Messages of a conversation, oldest first.
    pub async fn list_messages(&self, conversation: ConversationId) -> ClientResult<Vec<Message>> {
        let rows = self
            .backend
            .select(
                Table::Messages,
                Query::new()
                    .eq("conversation_id", conversation)
                    .order_by("created_at", Direction::Asc),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    /// Send `text` to `conversation`. Blank text is silently ignored.
    pub async fn send_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        text: &str,
    ) -> ClientResult<Option<Message>> {
        let Some(content) = validation::message_text(text)? else {
            return Ok(None);
        };

        let row = self
            .backend
            .insert(
                Table::Messages,
                json!({
                    "conversation_id": conversation,
                    "sender_id": sender,
                    "content": content,
                }),
            )
            .await?;
        let message: Message = decode_row(row)?;
        debug!(message_id = %message.id, conversation_id = %conversation, "message sent");

        let preview = self
            .backend
            .update(
                Table::Conversations,
                vec![Filter::eq("id", conversation)],
                json!({
                    "last_message": message.content,
                    "last_message_at": message.created_at,
                }),
            )
            .await;
        if let Err(e) = preview {
            warn!(conversation_id = %conversation, error = %e, "failed to update conversation preview");
        }

        Ok(Some(message))
    }

    /// Find the conversation between `me` and `other`, creating it on first
    /// contact. When racing first contacts produced duplicates the oldest one
    /// wins, so both sides converge on the same thread.
    pub async fn start_or_get_conversation(
        &self,
        me: UserId,
        other: UserId,
    ) -> ClientResult<Conversation> {
        if me == other {
            return Err(ValidationError::SelfConversation.into());
        }

        let existing = self
            .backend
            .select(
                Table::Conversations,
                Query::new()
                    .filter(Filter::contains("participant_ids", [me, other]))
                    .order_by("created_at", Direction::Asc)
                    .limit(1),
            )
            .await?;
        if let Some(row) = existing.into_iter().next() {
            return Ok(decode_row(row)?);
        }

        let row = self
            .backend
            .insert(Table::Conversations, json!({ "participant_ids": [me, other] }))
            .await?;
        let conversation: Conversation = decode_row(row)?;
        info!(conversation_id = %conversation.id, %me, %other, "conversation started");
        Ok(conversation)
    }

    /// Re-fetch the message list on every change in `conversation`.
    pub async fn subscribe_to_messages(
        &self,
        conversation: ConversationId,
        on_change: impl Fn(Vec<Message>) + Send + 'static,
    ) -> ClientResult<LiveQuery> {
        let subscription = self
            .backend
            .subscribe(Table::Messages, Some(Filter::eq("conversation_id", conversation)))
            .await?;

        let service = self.clone();
        let events = self.events.clone();
        Ok(LiveQuery::spawn(
            subscription,
            self.events.clone(),
            move || {
                let service = service.clone();
                async move { service.list_messages(conversation).await }
            },
            move |messages: Vec<Message>| {
                events.emit(ClientEvent::MessagesChanged {
                    conversation_id: conversation,
                    count: messages.len(),
                });
                on_change(messages);
            },
        ))
    }

    /// Re-fetch `user`'s conversation list on every change touching them.
    pub async fn subscribe_to_conversations(
        &self,
        user: UserId,
        on_change: impl Fn(Vec<Conversation>) + Send + 'static,
    ) -> ClientResult<LiveQuery> {
        let service = self.clone();
        self.watch_conversations(user, on_change, move || {
            let service = service.clone();
            async move { service.list_conversations(user).await }
        })
        .await
    }

    /// Like [`subscribe_to_conversations`](Self::subscribe_to_conversations)
    /// but delivers summaries with counterpart profiles.
    pub async fn subscribe_to_summaries(
        &self,
        user: UserId,
        on_change: impl Fn(Vec<ConversationSummary>) + Send + 'static,
    ) -> ClientResult<LiveQuery> {
        let service = self.clone();
        self.watch_conversations(user, on_change, move || {
            let service = service.clone();
            async move { service.list_conversation_summaries(user).await }
        })
        .await
    }

    async fn watch_conversations<T, F, Fut>(
        &self,
        user: UserId,
        on_change: impl Fn(Vec<T>) + Send + 'static,
        refetch: F,
    ) -> ClientResult<LiveQuery>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ClientResult<Vec<T>>> + Send + 'static,
    {
        let subscription = self
            .backend
            .subscribe(
                Table::Conversations,
                Some(Filter::contains("participant_ids", [user])),
            )
            .await?;

        let events = self.events.clone();
        Ok(LiveQuery::spawn(
            subscription,
            self.events.clone(),
            refetch,
            move |items: Vec<T>| {
                events.emit(ClientEvent::ConversationsChanged {
                    user_id: user,
                    count: items.len(),
                });
                on_change(items);
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use noteify_shared::ChangeKind;
    use tokio::sync::mpsc;

    use super::*;
    use crate::testing::{counting, sign_up, store};

    #[tokio::test]
    async fn messages_come_back_in_time_order() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let conv = service.start_or_get_conversation(alice, bob).await.unwrap();
        for text in ["one", "two", "three", "four"] {
            service.send_message(conv.id, alice, text).await.unwrap();
        }

        let messages = service.list_messages(conv.id).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(messages[3].content, "four");
    }

    #[tokio::test]
    async fn start_or_get_is_idempotent_in_both_directions() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let first = service.start_or_get_conversation(alice, bob).await.unwrap();
        let again = service.start_or_get_conversation(alice, bob).await.unwrap();
        let reverse = service.start_or_get_conversation(bob, alice).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(first.id, reverse.id);
        assert_eq!(service.list_conversations(alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicates_resolve_to_the_oldest() {
        let server = store();
        let alice = UserId::new();
        let bob = UserId::new();
        let older = server
            .insert(
                Table::Conversations,
                json!({ "participant_ids": [bob, alice], "created_at": "2024-01-01T00:00:00Z" }),
            )
            .await
            .unwrap();
        server
            .insert(Table::Conversations, json!({ "participant_ids": [alice, bob] }))
            .await
            .unwrap();

        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());
        let conv = service.start_or_get_conversation(alice, bob).await.unwrap();
        assert_eq!(json!(conv.id), older["id"]);
    }

    #[tokio::test]
    async fn self_conversation_is_rejected_without_remote_call() {
        let (backend, calls) = counting(store());
        let service = ConversationService::new(backend, EventSink::new());
        let me = UserId::new();

        let err = service.start_or_get_conversation(me, me).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ClientError::Validation(ValidationError::SelfConversation)
        ));
        assert_eq!(calls.total(), 0);
    }

    #[tokio::test]
    async fn blank_message_is_not_sent() {
        let (backend, calls) = counting(store());
        let service = ConversationService::new(backend, EventSink::new());

        let sent = service
            .send_message(ConversationId::new(), UserId::new(), "   \n ")
            .await
            .unwrap();
        assert!(sent.is_none());
        assert_eq!(calls.inserts(), 0);
        assert_eq!(calls.total(), 0);
    }

    #[tokio::test]
    async fn oversized_message_is_rejected_before_insert() {
        let (backend, calls) = counting(store());
        let service = ConversationService::new(backend, EventSink::new());
        let text = "x".repeat(noteify_shared::constants::MAX_MESSAGE_LEN + 1);

        assert!(service
            .send_message(ConversationId::new(), UserId::new(), &text)
            .await
            .is_err());
        assert_eq!(calls.total(), 0);
    }

    #[tokio::test]
    async fn sending_updates_the_preview() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let conv = service.start_or_get_conversation(alice, bob).await.unwrap();
        let message = service
            .send_message(conv.id, bob, "  see you soon ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.content, "see you soon");

        let summaries = service.list_conversation_summaries(alice).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].conversation.last_message.as_deref(), Some("see you soon"));
        assert_eq!(summaries[0].conversation.last_message_at, Some(message.created_at));
        assert_eq!(summaries[0].counterpart.as_ref().unwrap().username, "bob");
    }

    #[tokio::test]
    async fn live_messages_see_inserts_from_any_client() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let alice_svc = ConversationService::new(Arc::new(server.client()), EventSink::new());
        let bob_svc = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let conv = alice_svc.start_or_get_conversation(alice, bob).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _live = bob_svc
            .subscribe_to_messages(conv.id, move |messages| {
                let _ = tx.send(messages);
            })
            .await
            .unwrap();

        alice_svc.send_message(conv.id, alice, "hi").await.unwrap();

        let messages = rx.recv().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[0].sender_id, alice);
    }

    #[tokio::test]
    async fn closed_live_query_stops_callbacks() {
        let server = store();
        let alice = UserId::new();
        let bob = UserId::new();
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());
        let conv = service.start_or_get_conversation(alice, bob).await.unwrap();

        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let live = service
            .subscribe_to_messages(conv.id, move |_| {
                *counter.lock().unwrap() += 1;
            })
            .await
            .unwrap();
        assert!(live.is_active());
        live.close();

        service.send_message(conv.id, alice, "after close").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(server.hub().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn live_conversations_follow_new_threads() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _live = service
            .subscribe_to_summaries(bob, move |summaries| {
                let _ = tx.send(summaries);
            })
            .await
            .unwrap();

        service.start_or_get_conversation(alice, bob).await.unwrap();

        let summaries = rx.recv().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].counterpart.as_ref().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn conversation_feed_sees_threads_started_elsewhere() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let watcher = ConversationService::new(Arc::new(server.client()), EventSink::new());
        let other = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _live = watcher
            .subscribe_to_conversations(alice, move |conversations| {
                let _ = tx.send(conversations);
            })
            .await
            .unwrap();

        let started = other.start_or_get_conversation(bob, alice).await.unwrap();

        let conversations = rx.recv().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, started.id);
        assert!(conversations[0].participant_ids.contains(&alice));
    }

    #[tokio::test]
    async fn failed_refresh_emits_notice_and_skips_callback() {
        let server = store();
        let (backend, calls) = counting(server.client());
        let events = EventSink::new();
        let mut notices = events.subscribe();
        let service = ConversationService::new(backend, events);
        let conv = ConversationId::new();

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Message>>();
        let _live = service
            .subscribe_to_messages(conv, move |messages| {
                let _ = tx.send(messages);
            })
            .await
            .unwrap();

        calls.fail_selects(true);
        server
            .hub()
            .publish(noteify_shared::ChangeEvent {
                table: Table::Messages,
                kind: ChangeKind::Insert,
                new: Some(json!({ "conversation_id": conv })),
                old: None,
            });

        let event = notices.recv().await.unwrap();
        assert!(matches!(event, ClientEvent::Notice(_)));
        assert!(rx.try_recv().is_err());
    }
}
