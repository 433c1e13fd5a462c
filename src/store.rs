//! Ordered message history with edit/rollback/rerun/undo semantics
//!
//! The store performs no I/O. Operations that should trigger a new
//! request return a [`Resend`] outcome which the panel runtime executes,
//! mirroring the pure-mutation / effect split used elsewhere in the
//! crate.

use crate::message::{Message, MessageDraft, MessageId, MessageRole};
use chrono::Utc;

/// Outcome signalling that exactly one new send must follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resend {
    pub content: String,
}

/// Ordered history of user/assistant messages
///
/// Invariants: ids are unique for the life of the store (the counter is
/// never rewound after truncation) and vec order is chronological.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the end of the history
    pub fn append(&mut self, draft: MessageDraft) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role: draft.role,
            content: draft.content,
            timestamp: Utc::now(),
            actions: draft.actions,
            is_processing: draft.is_processing,
            thinking_steps: draft.thinking_steps,
            document_created: draft.document_created,
            candidate_docs: draft.candidate_docs,
        });
        id
    }

    /// Replace a message's content, discarding everything after it
    ///
    /// Complete no-op when `new_content` trims to empty or the id is
    /// unknown. Returns `Some(Resend)` iff the edited message is
    /// user-authored: the caller must trigger exactly one new send with
    /// the edited content.
    pub fn edit(&mut self, id: MessageId, new_content: &str) -> Option<Resend> {
        let trimmed = new_content.trim();
        if trimmed.is_empty() {
            return None;
        }
        let index = self.index_of(id)?;
        self.messages.truncate(index + 1);
        let message = &mut self.messages[index];
        message.content = new_content.to_string();
        if message.role == MessageRole::User {
            Some(Resend {
                content: new_content.to_string(),
            })
        } else {
            None
        }
    }

    /// Keep messages up to and including the target; no-op if unknown
    pub fn rollback_to(&mut self, id: MessageId) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.messages.truncate(index + 1);
                true
            }
            None => false,
        }
    }

    /// Remove the most recent assistant message, scanning backward
    pub fn undo_last_assistant(&mut self) -> Option<MessageId> {
        let index = self
            .messages
            .iter()
            .rposition(|m| m.role == MessageRole::Assistant)?;
        Some(self.messages.remove(index).id)
    }

    /// Roll back to a user message and request its content be resent
    ///
    /// No-op unless the target exists and is user-authored.
    pub fn rerun_from(&mut self, id: MessageId) -> Option<Resend> {
        let index = self.index_of(id)?;
        if self.messages[index].role != MessageRole::User {
            return None;
        }
        self.messages.truncate(index + 1);
        Some(Resend {
            content: self.messages[index].content.clone(),
        })
    }

    /// Most recent assistant message, if any
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.index_of(id).map(|i| &self.messages[i])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn index_of(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}
