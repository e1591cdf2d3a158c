//! # noteify-client
//!
//! Client-side data layer of Noteify: services for auth, profiles, notes,
//! social reactions and direct messages, the debounced note editor, the
//! chat screen and the HTTP/websocket [`RestBackend`]. Everything is generic
//! over [`noteify_shared::Backend`] so the same code runs against the hosted
//! service or an in-process store.

pub mod autosave;
pub mod chat;
pub mod commands;
pub mod error;
pub mod events;
pub mod live;
pub mod realtime;
pub mod rest;
pub mod state;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use noteify_shared::types::{Note, NoteId, UserId};
use noteify_shared::Backend;

use crate::autosave::NoteEditor;
use crate::chat::ChatContainer;
use crate::commands::auth::AuthService;
use crate::commands::conversations::ConversationService;
use crate::commands::notes::NoteService;
use crate::commands::profile::ProfileService;
use crate::commands::social::{NoteReactions, SocialService};
use crate::events::EventSink;

pub use error::{ClientError, ClientResult};
pub use rest::RestBackend;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("noteify_client=debug,noteify_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// One signed-in (or anonymous) client: a backend handle plus the event
/// stream every component reports to.
pub struct Noteify<B> {
    backend: Arc<B>,
    events: EventSink,
}

impl<B> Clone for Noteify<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
        }
    }
}

impl<B: Backend> Noteify<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            events: EventSink::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn auth(&self) -> AuthService<B> {
        AuthService::new(Arc::clone(&self.backend))
    }

    pub fn conversations(&self) -> ConversationService<B> {
        ConversationService::new(Arc::clone(&self.backend), self.events.clone())
    }

    pub fn notes(&self) -> NoteService<B> {
        NoteService::new(Arc::clone(&self.backend))
    }

    pub fn social(&self) -> SocialService<B> {
        SocialService::new(Arc::clone(&self.backend))
    }

    pub fn profiles(&self) -> ProfileService<B> {
        ProfileService::new(Arc::clone(&self.backend))
    }

    pub fn chat(&self, viewer: UserId) -> ChatContainer<B> {
        ChatContainer::new(self.conversations(), self.events.clone(), viewer)
    }

    pub fn editor(&self, note: Note) -> NoteEditor {
        NoteEditor::open(Arc::clone(&self.backend), self.events.clone(), note)
    }

    pub async fn reactions(&self, note: NoteId, user: UserId) -> ClientResult<NoteReactions<B>> {
        NoteReactions::load(self.social(), self.events.clone(), note, user).await
    }
}
