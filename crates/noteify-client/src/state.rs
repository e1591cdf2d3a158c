//! UI-facing state owned by the stateful components.

use serde::Serialize;

use noteify_shared::types::{ConversationId, ConversationSummary, Message};

/// Lifecycle of the chat screen. There is no error phase: a failed load
/// shows a notice and keeps whatever was there before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatPhase {
    #[default]
    Idle,
    Loading,
    Ready,
}

/// Everything the chat panel renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatState {
    pub phase: ChatPhase,
    pub conversations: Vec<ConversationSummary>,
    pub selected: Option<ConversationId>,
    /// Messages of the selected conversation, oldest first.
    pub messages: Vec<Message>,
    /// Unsent text in the composer.
    pub draft: String,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_summary(&self) -> Option<&ConversationSummary> {
        let selected = self.selected?;
        self.conversations
            .iter()
            .find(|s| s.conversation.id == selected)
    }
}
