use std::sync::Arc;

use serde_json::json;
use tracing::info;

use noteify_shared::constants::EXPLORE_PAGE_SIZE;
use noteify_shared::types::{Note, NoteId, UserId};
use noteify_shared::{decode_row, decode_rows, validation, Backend, Direction, Filter, Query, Table};

use crate::error::{ClientError, ClientResult};

pub struct NoteService<B> {
    backend: Arc<B>,
}

impl<B> Clone for NoteService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> NoteService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// The owner's notes, most recently edited first.
    pub async fn list_notes(&self, owner: UserId) -> ClientResult<Vec<Note>> {
        let rows = self
            .backend
            .select(
                Table::Notes,
                Query::new()
                    .eq("user_id", owner)
                    .order_by("updated_at", Direction::Desc),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn get_note(&self, id: NoteId) -> ClientResult<Note> {
        let rows = self
            .backend
            .select(Table::Notes, Query::new().eq("id", id).limit(1))
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Note"))?;
        Ok(decode_row(row)?)
    }

    pub async fn create_note(&self, owner: UserId, title: &str) -> ClientResult<Note> {
        let title = validation::note_title(title)?;
        let row = self
            .backend
            .insert(
                Table::Notes,
                json!({ "user_id": owner, "title": title, "content": "" }),
            )
            .await?;
        let note: Note = decode_row(row)?;
        info!(note_id = %note.id, "note created");
        Ok(note)
    }

    pub async fn delete_note(&self, id: NoteId) -> ClientResult<()> {
        let removed = self
            .backend
            .delete(Table::Notes, vec![Filter::eq("id", id)])
            .await?;
        if removed == 0 {
            return Err(ClientError::NotFound("Note"));
        }
        info!(note_id = %id, "note deleted");
        Ok(())
    }

    pub async fn set_public(&self, id: NoteId, is_public: bool) -> ClientResult<Note> {
        let rows = self
            .backend
            .update(
                Table::Notes,
                vec![Filter::eq("id", id)],
                json!({ "is_public": is_public }),
            )
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Note"))?;
        Ok(decode_row(row)?)
    }

    /// A note opened through a share link. Private, missing and malformed
    /// ids are all reported as not found.
    pub async fn get_shared_note(&self, id: &str) -> ClientResult<Note> {
        let id = NoteId::parse(id).map_err(|_| ClientError::NotFound("Note"))?;
        let rows = self
            .backend
            .select(
                Table::Notes,
                Query::new().eq("id", id).eq("is_public", true).limit(1),
            )
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Note"))?;
        Ok(decode_row(row)?)
    }

    /// Public notes of everyone, newest first.
    pub async fn explore_feed(&self, limit: Option<usize>) -> ClientResult<Vec<Note>> {
        let limit = limit.unwrap_or(EXPLORE_PAGE_SIZE).clamp(1, EXPLORE_PAGE_SIZE);
        let rows = self
            .backend
            .select(
                Table::Notes,
                Query::new()
                    .eq("is_public", true)
                    .order_by("created_at", Direction::Desc)
                    .limit(limit),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    /// Public notes of one author, newest first.
    pub async fn public_notes_of(&self, owner: UserId) -> ClientResult<Vec<Note>> {
        let rows = self
            .backend
            .select(
                Table::Notes,
                Query::new()
                    .eq("user_id", owner)
                    .eq("is_public", true)
                    .order_by("created_at", Direction::Desc),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::store;

    fn service() -> NoteService<noteify_store::LocalBackend> {
        NoteService::new(Arc::new(store()))
    }

    #[tokio::test]
    async fn create_list_delete() {
        let notes = service();
        let owner = UserId::new();
        let a = notes.create_note(owner, "first").await.unwrap();
        let b = notes.create_note(owner, "second").await.unwrap();
        notes.create_note(UserId::new(), "someone else").await.unwrap();

        let mine = notes.list_notes(owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, b.id);
        assert!(!mine[0].is_public);

        notes.delete_note(a.id).await.unwrap();
        assert_eq!(notes.list_notes(owner).await.unwrap().len(), 1);
        assert!(notes.delete_note(a.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn shared_note_requires_public_flag() {
        let notes = service();
        let note = notes.create_note(UserId::new(), "draft").await.unwrap();
        let id = note.id.to_string();

        assert!(notes.get_shared_note(&id).await.unwrap_err().is_not_found());
        assert!(notes.get_shared_note("not-an-id").await.unwrap_err().is_not_found());

        notes.set_public(note.id, true).await.unwrap();
        assert_eq!(notes.get_shared_note(&id).await.unwrap().title, "draft");
    }

    #[tokio::test]
    async fn explore_lists_public_notes_only() {
        let notes = service();
        let owner = UserId::new();
        let public = notes.create_note(owner, "hello world").await.unwrap();
        notes.create_note(owner, "secret").await.unwrap();
        notes.set_public(public.id, true).await.unwrap();

        let feed = notes.explore_feed(None).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, public.id);
        assert_eq!(notes.public_notes_of(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn long_titles_are_rejected() {
        let notes = service();
        let title = "t".repeat(noteify_shared::constants::MAX_NOTE_TITLE_LEN + 1);
        assert!(matches!(
            notes.create_note(UserId::new(), &title).await,
            Err(ClientError::Validation(_))
        ));
    }
}
