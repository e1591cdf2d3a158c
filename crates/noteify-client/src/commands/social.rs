//! Comments, likes and saved notes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use noteify_shared::types::{Comment, CommentId, Note, NoteId, SavedNote, UserId};
use noteify_shared::{
    decode_row, decode_rows, validation, Backend, BackendError, Direction, Filter, Query, Table,
};

use crate::error::{ClientError, ClientResult};
use crate::events::EventSink;

pub struct SocialService<B> {
    backend: Arc<B>,
}

impl<B> Clone for SocialService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> SocialService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn list_comments(&self, note: NoteId) -> ClientResult<Vec<Comment>> {
        let rows = self
            .backend
            .select(
                Table::Comments,
                Query::new()
                    .eq("note_id", note)
                    .order_by("created_at", Direction::Asc),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn add_comment(&self, note: NoteId, user: UserId, text: &str) -> ClientResult<Comment> {
        let content = validation::comment_text(text)?;
        let row = self
            .backend
            .insert(
                Table::Comments,
                json!({ "note_id": note, "user_id": user, "content": content }),
            )
            .await?;
        Ok(decode_row(row)?)
    }

    pub async fn delete_comment(&self, id: CommentId) -> ClientResult<()> {
        let removed = self
            .backend
            .delete(Table::Comments, vec![Filter::eq("id", id)])
            .await?;
        if removed == 0 {
            return Err(ClientError::NotFound("Comment"));
        }
        Ok(())
    }

    pub async fn like_count(&self, note: NoteId) -> ClientResult<usize> {
        let rows = self
            .backend
            .select(Table::Likes, Query::new().eq("note_id", note))
            .await?;
        Ok(rows.len())
    }

    pub async fn is_liked(&self, note: NoteId, user: UserId) -> ClientResult<bool> {
        self.has_mark(Table::Likes, note, user).await
    }

    pub async fn is_saved(&self, note: NoteId, user: UserId) -> ClientResult<bool> {
        self.has_mark(Table::SavedNotes, note, user).await
    }

    pub async fn like(&self, note: NoteId, user: UserId) -> ClientResult<()> {
        self.set_mark(Table::Likes, note, user, true).await
    }

    pub async fn unlike(&self, note: NoteId, user: UserId) -> ClientResult<()> {
        self.set_mark(Table::Likes, note, user, false).await
    }

    pub async fn save(&self, note: NoteId, user: UserId) -> ClientResult<()> {
        self.set_mark(Table::SavedNotes, note, user, true).await
    }

    pub async fn unsave(&self, note: NoteId, user: UserId) -> ClientResult<()> {
        self.set_mark(Table::SavedNotes, note, user, false).await
    }

    /// Notes `user` saved, most recently saved first.
    pub async fn saved_notes(&self, user: UserId) -> ClientResult<Vec<Note>> {
        let rows = self
            .backend
            .select(
                Table::SavedNotes,
                Query::new()
                    .eq("user_id", user)
                    .order_by("created_at", Direction::Desc),
            )
            .await?;
        let marks: Vec<SavedNote> = decode_rows(rows)?;
        if marks.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .backend
            .select(
                Table::Notes,
                Query::new().filter(Filter::is_in("id", marks.iter().map(|m| m.note_id))),
            )
            .await?;
        let mut notes: HashMap<NoteId, Note> = decode_rows::<Note>(rows)?
            .into_iter()
            .map(|n| (n.id, n))
            .collect();

        Ok(marks.iter().filter_map(|m| notes.remove(&m.note_id)).collect())
    }

    async fn has_mark(&self, table: Table, note: NoteId, user: UserId) -> ClientResult<bool> {
        let rows = self
            .backend
            .select(
                table,
                Query::new().eq("note_id", note).eq("user_id", user).limit(1),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn set_mark(&self, table: Table, note: NoteId, user: UserId, on: bool) -> ClientResult<()> {
        if on {
            match self
                .backend
                .insert(table, json!({ "note_id": note, "user_id": user }))
                .await
            {
                // already marked
                Ok(_) | Err(BackendError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        } else {
            self.backend
                .delete(
                    table,
                    vec![Filter::eq("note_id", note), Filter::eq("user_id", user)],
                )
                .await?;
        }
        debug!(%table, note_id = %note, on, "mark updated");
        Ok(())
    }
}

/// Like/save state of one note as seen by one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReactionState {
    pub liked: bool,
    pub saved: bool,
    pub like_count: usize,
}

/// Optimistic like/save toggles: the local flag flips first, the remote
/// write follows, and a failed write puts the flag back.
pub struct NoteReactions<B> {
    social: SocialService<B>,
    events: EventSink,
    note: NoteId,
    user: UserId,
    state: ReactionState,
}

impl<B: Backend> NoteReactions<B> {
    pub async fn load(
        social: SocialService<B>,
        events: EventSink,
        note: NoteId,
        user: UserId,
    ) -> ClientResult<Self> {
        let state = ReactionState {
            liked: social.is_liked(note, user).await?,
            saved: social.is_saved(note, user).await?,
            like_count: social.like_count(note).await?,
        };
        Ok(Self {
            social,
            events,
            note,
            user,
            state,
        })
    }

    pub fn state(&self) -> ReactionState {
        self.state
    }

    /// Returns whether the note is liked afterwards.
    pub async fn toggle_like(&mut self) -> bool {
        let previous = self.state;
        let liked = !previous.liked;
        self.state.liked = liked;
        self.state.like_count = if liked {
            previous.like_count + 1
        } else {
            previous.like_count.saturating_sub(1)
        };

        let result = if liked {
            self.social.like(self.note, self.user).await
        } else {
            self.social.unlike(self.note, self.user).await
        };
        if let Err(e) = result {
            self.state = previous;
            self.events.report("like", &e);
        }
        self.state.liked
    }

    /// Returns whether the note is saved afterwards.
    pub async fn toggle_save(&mut self) -> bool {
        let previous = self.state;
        let saved = !previous.saved;
        self.state.saved = saved;

        let result = if saved {
            self.social.save(self.note, self.user).await
        } else {
            self.social.unsave(self.note, self.user).await
        };
        if let Err(e) = result {
            self.state = previous;
            self.events.report("save", &e);
        }
        self.state.saved
    }
}
