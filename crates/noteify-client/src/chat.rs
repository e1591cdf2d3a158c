//! Chat screen: a pure view ([`ChatPanel`]) and a stateful container
//! ([`ChatContainer`]) that owns the data and composes the view.
//!
//! Callers that already keep a [`ChatState`] can render [`ChatPanel`]
//! directly; everyone else lets the container drive it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use noteify_shared::types::{ConversationId, Message, MessageId, Profile, UserId};
use noteify_shared::{validation, Backend};

use crate::commands::conversations::ConversationService;
use crate::error::ClientResult;
use crate::events::EventSink;
use crate::live::LiveQuery;
use crate::state::{ChatPhase, ChatState};

// ---------------------------------------------------------------------------
// Presentational panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRow {
    pub id: ConversationId,
    pub title: String,
    pub preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Sent by the viewer (rendered on the right).
    pub is_own: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatPanelView {
    pub phase: ChatPhase,
    pub header: Option<String>,
    pub conversations: Vec<ConversationRow>,
    pub rows: Vec<MessageRow>,
    pub draft: String,
    pub can_send: bool,
}

const UNKNOWN_USER: &str = "Unknown user";

pub struct ChatPanel;

impl ChatPanel {
    pub fn view(state: &ChatState, viewer: UserId, counterpart: Option<&Profile>) -> ChatPanelView {
        let conversations = state
            .conversations
            .iter()
            .map(|summary| ConversationRow {
                id: summary.conversation.id,
                title: summary
                    .counterpart
                    .as_ref()
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                preview: summary.conversation.last_message.clone(),
                last_message_at: summary.conversation.last_message_at,
                selected: state.selected == Some(summary.conversation.id),
            })
            .collect();

        let rows = state
            .messages
            .iter()
            .map(|m| MessageRow {
                id: m.id,
                sender_id: m.sender_id,
                content: m.content.clone(),
                created_at: m.created_at,
                is_own: m.sender_id == viewer,
            })
            .collect();

        let header = state.selected.map(|_| {
            counterpart
                .map(|p| p.display_name.clone())
                .unwrap_or_else(|| UNKNOWN_USER.to_string())
        });

        let can_send = state.selected.is_some()
            && state.phase == ChatPhase::Ready
            && matches!(validation::message_text(&state.draft), Ok(Some(_)));

        ChatPanelView {
            phase: state.phase,
            header,
            conversations,
            rows,
            draft: state.draft.clone(),
            can_send,
        }
    }
}

// ---------------------------------------------------------------------------
// Stateful container
// ---------------------------------------------------------------------------

pub struct ChatContainer<B> {
    viewer: UserId,
    service: ConversationService<B>,
    events: EventSink,
    state: Arc<Mutex<ChatState>>,
    /// Bumped on every selection; late results for older selections are
    /// dropped.
    generation: Arc<AtomicU64>,
    conversations_live: Option<LiveQuery>,
    messages_live: Option<LiveQuery>,
}

fn lock(state: &Mutex<ChatState>) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl<B: Backend> ChatContainer<B> {
    pub fn new(service: ConversationService<B>, events: EventSink, viewer: UserId) -> Self {
        Self {
            viewer,
            service,
            events,
            state: Arc::new(Mutex::new(ChatState::new())),
            generation: Arc::new(AtomicU64::new(0)),
            conversations_live: None,
            messages_live: None,
        }
    }

    pub fn state(&self) -> ChatState {
        lock(&self.state).clone()
    }

    pub fn view(&self) -> ChatPanelView {
        let state = lock(&self.state);
        let counterpart = state.selected_summary().and_then(|s| s.counterpart.as_ref());
        ChatPanel::view(&state, self.viewer, counterpart)
    }

    pub fn set_draft(&self, text: &str) {
        lock(&self.state).draft = text.to_string();
    }

    /// Keep the conversation list live, then fetch it once. The feed is
    /// opened first so no change between the two is missed.
    pub async fn load(&mut self) {
        self.update(|s| s.phase = ChatPhase::Loading);

        // set once the feed has delivered; an older initial fetch must not
        // overwrite it
        let refreshed = Arc::new(AtomicBool::new(false));
        if self.conversations_live.is_none() {
            let state = Arc::clone(&self.state);
            let delivered = Arc::clone(&refreshed);
            let live = self
                .service
                .subscribe_to_summaries(self.viewer, move |list| {
                    let mut state = lock(&state);
                    delivered.store(true, Ordering::SeqCst);
                    state.conversations = list;
                })
                .await;
            match live {
                Ok(live) => self.conversations_live = Some(live),
                Err(e) => self.events.report("watch conversations", &e),
            }
        }

        match self.service.list_conversation_summaries(self.viewer).await {
            Ok(list) => self.update(|s| {
                if !refreshed.load(Ordering::SeqCst) {
                    s.conversations = list;
                }
            }),
            Err(e) => self.events.report("load conversations", &e),
        }
        self.update(|s| s.phase = ChatPhase::Ready);
    }

    /// Switch to `conversation`. The previous conversation's live query is
    /// closed before the new one opens, and the new one opens before the
    /// initial fetch.
    pub async fn select(&mut self, conversation: ConversationId) {
        if let Some(previous) = self.messages_live.take() {
            previous.close();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(conversation_id = %conversation, generation, "conversation selected");

        self.update(|s| {
            s.selected = Some(conversation);
            s.messages.clear();
            s.phase = ChatPhase::Loading;
        });

        let refreshed = Arc::new(AtomicBool::new(false));
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        let delivered = Arc::clone(&refreshed);
        let live = self
            .service
            .subscribe_to_messages(conversation, move |messages| {
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                let mut state = lock(&state);
                if state.selected == Some(conversation) {
                    delivered.store(true, Ordering::SeqCst);
                    state.messages = messages;
                }
            })
            .await;
        match live {
            Ok(live) => self.messages_live = Some(live),
            Err(e) => self.events.report("watch messages", &e),
        }

        match self.service.list_messages(conversation).await {
            Ok(messages) if self.is_current(generation) => self.update(|s| {
                if !refreshed.load(Ordering::SeqCst) {
                    s.messages = messages;
                }
            }),
            Ok(_) => debug!(conversation_id = %conversation, "discarding stale messages"),
            Err(e) => self.events.report("load messages", &e),
        }
        if self.is_current(generation) {
            self.update(|s| s.phase = ChatPhase::Ready);
        }
    }

    /// Find or create the conversation with `other` and select it.
    pub async fn open_with(&mut self, other: UserId) -> ClientResult<ConversationId> {
        let conversation = match self.service.start_or_get_conversation(self.viewer, other).await {
            Ok(c) => c,
            Err(e) => {
                self.events.report("open conversation", &e);
                return Err(e);
            }
        };

        let known = lock(&self.state)
            .conversations
            .iter()
            .any(|s| s.conversation.id == conversation.id);
        if !known {
            match self.service.list_conversation_summaries(self.viewer).await {
                Ok(list) => self.update(|s| s.conversations = list),
                Err(e) => self.events.report("load conversations", &e),
            }
        }

        self.select(conversation.id).await;
        Ok(conversation.id)
    }

    /// Send the composer text to the selected conversation. The composer is
    /// cleared only if it still holds the text that was sent.
    pub async fn send_draft(&mut self) -> ClientResult<Option<Message>> {
        let (selected, draft) = {
            let state = lock(&self.state);
            (state.selected, state.draft.clone())
        };
        let Some(conversation) = selected else {
            return Ok(None);
        };

        match self
            .service
            .send_message(conversation, self.viewer, &draft)
            .await
        {
            Ok(Some(message)) => {
                self.update(|s| {
                    if s.draft == draft {
                        s.draft.clear();
                    }
                    if s.selected == Some(conversation) && !s.messages.iter().any(|m| m.id == message.id) {
                        s.messages.push(message.clone());
                    }
                });
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.events.report("send message", &e);
                Err(e)
            }
        }
    }

    /// Tear down every live query.
    pub fn close(&mut self) {
        if let Some(live) = self.messages_live.take() {
            live.close();
        }
        if let Some(live) = self.conversations_live.take() {
            live.close();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn update(&self, f: impl FnOnce(&mut ChatState)) {
        f(&mut lock(&self.state));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use noteify_shared::types::{Conversation, ConversationSummary};
    use noteify_shared::Table;
    use serde_json::json;

    use super::*;
    use crate::testing::{counting, sign_up, store};

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn profile(id: UserId, name: &str) -> Profile {
        Profile {
            id,
            username: name.to_lowercase(),
            display_name: name.into(),
            avatar_url: None,
            bio: None,
            badges: Default::default(),
            role: Default::default(),
            theme: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn panel_marks_own_messages_and_sendability() {
        let me = UserId::new();
        let them = UserId::new();
        let conv = ConversationId::new();
        let message = |sender, content: &str| Message {
            id: MessageId::new(),
            conversation_id: conv,
            sender_id: sender,
            content: content.into(),
            created_at: Utc::now(),
        };
        let bob = profile(them, "Bob");

        let mut state = ChatState {
            phase: ChatPhase::Ready,
            conversations: vec![ConversationSummary {
                conversation: Conversation {
                    id: conv,
                    participant_ids: vec![me, them],
                    created_at: Utc::now(),
                    last_message: Some("yo".into()),
                    last_message_at: None,
                },
                counterpart: Some(bob.clone()),
            }],
            selected: Some(conv),
            messages: vec![message(me, "hi"), message(them, "yo")],
            draft: "   ".into(),
        };

        let view = ChatPanel::view(&state, me, Some(&bob));
        assert_eq!(view.header.as_deref(), Some("Bob"));
        assert!(view.rows[0].is_own);
        assert!(!view.rows[1].is_own);
        assert!(view.conversations[0].selected);
        assert_eq!(view.conversations[0].preview.as_deref(), Some("yo"));
        assert!(!view.can_send);

        state.draft = "hello".into();
        assert!(ChatPanel::view(&state, me, Some(&bob)).can_send);

        state.selected = None;
        let view = ChatPanel::view(&state, me, None);
        assert!(view.header.is_none());
        assert!(!view.can_send);
    }

    #[tokio::test]
    async fn load_moves_idle_to_ready() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());
        service.start_or_get_conversation(alice, bob).await.unwrap();

        let mut chat = ChatContainer::new(service, EventSink::new(), alice);
        assert_eq!(chat.state().phase, ChatPhase::Idle);

        chat.load().await;
        let state = chat.state();
        assert_eq!(state.phase, ChatPhase::Ready);
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(chat.view().conversations[0].title, "BOB");
    }

    #[tokio::test]
    async fn switching_conversations_tears_down_the_old_feed() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let carol = sign_up(&server, "carol").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());
        let with_bob = service.start_or_get_conversation(alice, bob).await.unwrap();
        let with_carol = service.start_or_get_conversation(alice, carol).await.unwrap();

        let mut chat = ChatContainer::new(service.clone(), EventSink::new(), alice);
        chat.load().await;
        chat.select(with_bob.id).await;
        assert_eq!(server.hub().subscriber_count(), 2);

        chat.select(with_carol.id).await;
        settle().await;
        // one feed for the list, one for the selected conversation
        assert_eq!(server.hub().subscriber_count(), 2);

        service.send_message(with_bob.id, bob, "still there?").await.unwrap();
        service.send_message(with_carol.id, carol, "hey").await.unwrap();
        settle().await;

        let state = chat.state();
        assert_eq!(state.selected, Some(with_carol.id));
        assert!(state.messages.iter().all(|m| m.conversation_id == with_carol.id));
        assert_eq!(state.messages.len(), 1);

        chat.close();
        settle().await;
        assert_eq!(server.hub().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn open_with_and_send_draft() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let service = ConversationService::new(Arc::new(server.client()), EventSink::new());

        let mut chat = ChatContainer::new(service.clone(), EventSink::new(), alice);
        chat.load().await;
        let conv = chat.open_with(bob).await.unwrap();
        assert_eq!(chat.view().header.as_deref(), Some("BOB"));

        chat.set_draft("  hi  ");
        assert!(chat.view().can_send);
        let sent = chat.send_draft().await.unwrap().unwrap();
        assert_eq!(sent.content, "hi");

        let state = chat.state();
        assert!(state.draft.is_empty());
        assert_eq!(state.messages.len(), 1);
        assert_eq!(service.list_messages(conv).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn message_arriving_during_select_is_shown() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let (backend, calls) = counting(server.client());
        let service = ConversationService::new(backend, EventSink::new());
        let conv = service.start_or_get_conversation(alice, bob).await.unwrap();

        calls.insert_after_select(
            Table::Messages,
            json!({ "conversation_id": conv.id, "sender_id": bob, "content": "quick" }),
        );
        let mut chat = ChatContainer::new(service.clone(), EventSink::new(), alice);
        chat.select(conv.id).await;
        settle().await;

        assert_eq!(service.list_messages(conv.id).await.unwrap().len(), 1);
        let state = chat.state();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "quick");
    }

    #[tokio::test]
    async fn conversation_started_during_load_is_listed() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let (backend, calls) = counting(server.client());
        let service = ConversationService::new(backend, EventSink::new());

        calls.insert_after_select(
            Table::Conversations,
            json!({ "participant_ids": [bob, alice] }),
        );
        let mut chat = ChatContainer::new(service, EventSink::new(), alice);
        chat.load().await;
        settle().await;

        assert_eq!(chat.state().conversations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_during_send_keeps_the_new_draft() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let bob = sign_up(&server, "bob").await;
        let (backend, calls) = counting(server.client());
        let service = ConversationService::new(backend, EventSink::new());
        let conv = service.start_or_get_conversation(alice, bob).await.unwrap();

        let mut chat = ChatContainer::new(service, EventSink::new(), alice);
        chat.select(conv.id).await;
        chat.set_draft("first");
        calls.delay_writes(Duration::from_millis(200));

        let state = Arc::clone(&chat.state);
        let (sent, _) = tokio::join!(chat.send_draft(), async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            lock(&state).draft = "second".into();
        });

        assert_eq!(sent.unwrap().unwrap().content, "first");
        assert_eq!(chat.state().draft, "second");
    }

    #[tokio::test]
    async fn open_with_self_emits_notice() {
        let server = store();
        let alice = sign_up(&server, "alice").await;
        let events = EventSink::new();
        let mut rx = events.subscribe();
        let service = ConversationService::new(Arc::new(server.client()), events.clone());

        let mut chat = ChatContainer::new(service, events, alice);
        assert!(chat.open_with(alice).await.is_err());
        assert!(matches!(
            rx.recv().await.unwrap(),
            crate::events::ClientEvent::Notice(_)
        ));
        assert_eq!(chat.state().selected, None);
    }
}
