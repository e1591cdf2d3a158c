//! Debounced note autosave.
//!
//! Edits update the local copy at once and are written back after a quiet
//! period. A background task owns the single write slot for the note: it
//! merges pending edits, waits out the debounce window and performs one
//! update at a time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use noteify_shared::constants::AUTOSAVE_DEBOUNCE_MS;
use noteify_shared::types::Note;
use noteify_shared::{decode_row, validation, Backend, Filter, Table};

use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventSink};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct NotePatch {
    title: Option<String>,
    content: Option<String>,
    /// Sequence number of the newest edit folded into this patch.
    seq: u64,
}

impl NotePatch {
    fn merge(&mut self, newer: NotePatch) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
        self.seq = self.seq.max(newer.seq);
    }

    fn to_row(&self) -> Value {
        let mut row = Map::new();
        if let Some(title) = &self.title {
            row.insert("title".into(), Value::String(title.clone()));
        }
        if let Some(content) = &self.content {
            row.insert("content".into(), Value::String(content.clone()));
        }
        row.insert("updated_at".into(), serde_json::json!(Utc::now()));
        Value::Object(row)
    }
}

enum Command {
    Edit(NotePatch),
    Flush(oneshot::Sender<ClientResult<()>>),
}

struct Copies {
    /// What the user sees, including unsaved edits.
    local: Note,
    /// Last version confirmed by the backend.
    saved: Note,
    /// Edit counter and the edit that last touched each field.
    edits: u64,
    title_edit: u64,
    content_edit: u64,
}

impl Copies {
    /// Put back the last saved version, except for fields edited after
    /// the failed patch was taken.
    fn revert(&mut self, failed: &NotePatch) {
        let mut reverted = self.saved.clone();
        if self.title_edit > failed.seq {
            reverted.title = std::mem::take(&mut self.local.title);
        }
        if self.content_edit > failed.seq {
            reverted.content = std::mem::take(&mut self.local.content);
        }
        self.local = reverted;
    }
}

/// Editing session for one note.
pub struct NoteEditor {
    copies: Arc<Mutex<Copies>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl NoteEditor {
    pub fn open<B: Backend>(backend: Arc<B>, events: EventSink, note: Note) -> Self {
        Self::with_debounce(
            backend,
            events,
            note,
            Duration::from_millis(AUTOSAVE_DEBOUNCE_MS),
        )
    }

    pub fn with_debounce<B: Backend>(
        backend: Arc<B>,
        events: EventSink,
        note: Note,
        debounce: Duration,
    ) -> Self {
        let copies = Arc::new(Mutex::new(Copies {
            local: note.clone(),
            saved: note,
            edits: 0,
            title_edit: 0,
            content_edit: 0,
        }));
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = Writer {
            backend,
            events,
            copies: Arc::clone(&copies),
        };
        let task = tokio::spawn(writer.run(rx, debounce));

        Self {
            copies,
            commands: tx,
            task,
        }
    }

    /// The note as currently shown, unsaved edits included.
    pub fn note(&self) -> Note {
        self.lock().local.clone()
    }

    /// The last version the backend confirmed.
    pub fn saved(&self) -> Note {
        self.lock().saved.clone()
    }

    pub fn edit_title(&self, title: &str) -> ClientResult<()> {
        let title = validation::note_title(title)?;
        let mut copies = self.lock();
        copies.edits += 1;
        copies.title_edit = copies.edits;
        copies.local.title = title.to_string();
        // sent under the lock so patches reach the writer in edit order
        self.send(Command::Edit(NotePatch {
            title: Some(title.to_string()),
            content: None,
            seq: copies.edits,
        }));
        Ok(())
    }

    pub fn edit_content(&self, content: &str) {
        let mut copies = self.lock();
        copies.edits += 1;
        copies.content_edit = copies.edits;
        copies.local.content = content.to_string();
        self.send(Command::Edit(NotePatch {
            title: None,
            content: Some(content.to_string()),
            seq: copies.edits,
        }));
    }

    /// Write any pending edit now instead of waiting for the debounce.
    pub async fn flush(&self) -> ClientResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx));
        rx.await.unwrap_or(Ok(()))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("autosave task is gone, edit not scheduled");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Copies> {
        // a poisoned lock still holds a usable copy
        self.copies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for NoteEditor {
    fn drop(&mut self) {
        // pending (not yet started) writes are discarded
        self.task.abort();
    }
}

struct Writer<B> {
    backend: Arc<B>,
    events: EventSink,
    copies: Arc<Mutex<Copies>>,
}

impl<B: Backend> Writer<B> {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>, debounce: Duration) {
        let mut pending: Option<NotePatch> = None;
        let mut deadline = Instant::now();

        loop {
            let command = if pending.is_some() {
                tokio::select! {
                    command = commands.recv() => command,
                    _ = sleep_until(deadline) => {
                        if let Some(patch) = pending.take() {
                            let _ = self.save(patch).await;
                        }
                        continue;
                    }
                }
            } else {
                commands.recv().await
            };

            match command {
                Some(Command::Edit(patch)) => {
                    pending.get_or_insert_with(NotePatch::default).merge(patch);
                    deadline = Instant::now() + debounce;
                }
                Some(Command::Flush(reply)) => {
                    let result = match pending.take() {
                        Some(patch) => self.save(patch).await,
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
                None => break,
            }
        }
    }

    async fn save(&self, patch: NotePatch) -> ClientResult<()> {
        let id = self.copies.lock().unwrap_or_else(|e| e.into_inner()).saved.id;
        debug!(note_id = %id, "autosaving note");

        let result = self
            .backend
            .update(Table::Notes, vec![Filter::eq("id", id)], patch.to_row())
            .await
            .map_err(ClientError::from)
            .and_then(|rows| rows.into_iter().next().ok_or(ClientError::NotFound("Note")))
            .and_then(|row| decode_row::<Note>(row).map_err(ClientError::from));

        match result {
            Ok(stored) => {
                {
                    let mut copies = self.copies.lock().unwrap_or_else(|e| e.into_inner());
                    copies.local.updated_at = stored.updated_at;
                    copies.saved = stored;
                }
                self.events.emit(ClientEvent::NoteSaved { note_id: id });
                Ok(())
            }
            Err(e) => {
                self.copies
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .revert(&patch);
                self.events.report("autosave", &e);
                self.events.emit(ClientEvent::NoteReverted { note_id: id });
                Err(e)
            }
        }
    }
}
