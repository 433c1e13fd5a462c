//! Message data model shared by the store, parser, and persistence boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session-scoped message identifier, allocated by the store's counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Reference to a document the assistant considered relevant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocRef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl DocRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
        }
    }

    pub fn titled(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
        }
    }
}

/// Document created by the assistant during a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDocument {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Kind of intermediate reasoning step reported by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Thinking,
    ToolCall,
    Result,
}

/// Tool invocation detail attached to a thinking step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallInfo {
    pub name: String,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One intermediate reasoning/tool step in an assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStep {
    #[serde(rename = "type", default)]
    pub kind: StepKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallInfo>,
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Proposed edit actions carried by this message (opaque to the core)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_processing: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking_steps: Vec<ThinkingStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_created: Option<CreatedDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_docs: Vec<DocRef>,
}

/// Message content prior to id assignment by the store
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub role: MessageRole,
    pub content: String,
    pub actions: Vec<Value>,
    pub is_processing: bool,
    pub thinking_steps: Vec<ThinkingStep>,
    pub document_created: Option<CreatedDocument>,
    pub candidate_docs: Vec<DocRef>,
}

impl MessageDraft {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            actions: Vec::new(),
            is_processing: false,
            thinking_steps: Vec::new(),
            document_created: None,
            candidate_docs: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_thinking_steps(mut self, steps: Vec<ThinkingStep>) -> Self {
        self.thinking_steps = steps;
        self
    }

    pub fn with_candidate_docs(mut self, docs: Vec<DocRef>) -> Self {
        self.candidate_docs = docs;
        self
    }

    pub fn with_document_created(mut self, doc: Option<CreatedDocument>) -> Self {
        self.document_created = doc;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Value>) -> Self {
        self.actions = actions;
        self
    }
}
