//! Trait abstractions for the panel's external collaborators
//!
//! The completion backend, thread persistence, and document index are
//! owned by the host application; the panel only sees these seams.
//! Mock implementations live in `panel::testing`.

use crate::message::{DocRef, MessageRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Request to the chat-completion backend
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Full outgoing message (context summary already prepended)
    pub message: String,
    pub selected_document_id: Option<String>,
    pub model: String,
    pub model_variant: Option<String>,
    pub tool_server_id: Option<String>,
}

/// Failure classification for completion requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    /// Network issues, timeouts
    Network,
    /// Rate limited by the backend
    RateLimit,
    /// Backend-side failure
    ServerError,
    /// Malformed request
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl CompletionErrorKind {
    /// Whether a fresh attempt with the same request could succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            CompletionErrorKind::Network
                | CompletionErrorKind::RateLimit
                | CompletionErrorKind::ServerError
        )
    }
}

/// Error from the completion backend
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Network, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::ServerError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CompletionErrorKind::Unknown, message)
    }
}

/// Chat-completion backend
///
/// The returned string is either plain text or an encoded response
/// envelope; `envelope::parse` tolerates both.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// Opaque identifier of a persisted thread
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Error from the thread-persistence backend
#[derive(Debug, Error)]
pub enum ThreadStoreError {
    #[error("thread not found: {0}")]
    NotFound(String),
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort persistence of conversation threads
///
/// Failures are logged and never affect in-memory state.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn start_thread(&self, initial_context: Option<&str>)
        -> Result<ThreadId, ThreadStoreError>;

    async fn append_message(
        &self,
        thread_id: &ThreadId,
        role: MessageRole,
        content: &str,
        timestamp: DateTime<Utc>,
        candidate_docs: &[DocRef],
    ) -> Result<(), ThreadStoreError>;
}

/// Read-only queries over selectable documents
pub trait DocumentIndex: Send + Sync {
    fn selectable_docs(&self) -> Vec<DocRef>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<T: ThreadStore + ?Sized> ThreadStore for Arc<T> {
    async fn start_thread(
        &self,
        initial_context: Option<&str>,
    ) -> Result<ThreadId, ThreadStoreError> {
        (**self).start_thread(initial_context).await
    }

    async fn append_message(
        &self,
        thread_id: &ThreadId,
        role: MessageRole,
        content: &str,
        timestamp: DateTime<Utc>,
        candidate_docs: &[DocRef],
    ) -> Result<(), ThreadStoreError> {
        (**self)
            .append_message(thread_id, role, content, timestamp, candidate_docs)
            .await
    }
}

impl<T: DocumentIndex + ?Sized> DocumentIndex for Arc<T> {
    fn selectable_docs(&self) -> Vec<DocRef> {
        (**self).selectable_docs()
    }
}
