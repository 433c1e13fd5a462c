//! Mock collaborators for panel tests

use super::traits::{
    CompletionClient, CompletionError, CompletionRequest, DocumentIndex, ThreadId, ThreadStore,
    ThreadStoreError,
};
use crate::message::{DocRef, MessageRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Completion backend replaying a scripted sequence of responses
#[derive(Default)]
pub struct MockCompletion {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn replying(response: impl Into<String>) -> Self {
        let mock = Self::default();
        mock.push_ok(response);
        mock
    }

    pub fn failing(error: CompletionError) -> Self {
        let mock = Self::default();
        mock.responses.lock().unwrap().push_back(Err(error));
        mock
    }

    pub fn push_ok(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.into()));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

/// Recorded call to [`MockThreadStore::append_message`]
#[derive(Debug, Clone)]
pub struct RecordedAppend {
    pub thread_id: ThreadId,
    pub role: MessageRole,
    pub content: String,
}

/// Thread store recording appends, optionally failing every call
#[derive(Default)]
pub struct MockThreadStore {
    pub fail: bool,
    pub started: Mutex<Vec<Option<String>>>,
    pub appends: Mutex<Vec<RecordedAppend>>,
}

impl MockThreadStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn append_count(&self) -> usize {
        self.appends.lock().unwrap().len()
    }
}

#[async_trait]
impl ThreadStore for MockThreadStore {
    async fn start_thread(
        &self,
        initial_context: Option<&str>,
    ) -> Result<ThreadId, ThreadStoreError> {
        if self.fail {
            return Err(ThreadStoreError::Unavailable("mock offline".to_string()));
        }
        self.started
            .lock()
            .unwrap()
            .push(initial_context.map(ToString::to_string));
        Ok(ThreadId("thread-1".to_string()))
    }

    async fn append_message(
        &self,
        thread_id: &ThreadId,
        role: MessageRole,
        content: &str,
        _timestamp: DateTime<Utc>,
        _candidate_docs: &[DocRef],
    ) -> Result<(), ThreadStoreError> {
        if self.fail {
            return Err(ThreadStoreError::Unavailable("mock offline".to_string()));
        }
        self.appends.lock().unwrap().push(RecordedAppend {
            thread_id: thread_id.clone(),
            role,
            content: content.to_string(),
        });
        Ok(())
    }
}

/// Index returning a fixed document list
pub struct MockIndex {
    pub docs: Vec<DocRef>,
}

impl DocumentIndex for MockIndex {
    fn selectable_docs(&self) -> Vec<DocRef> {
        self.docs.clone()
    }
}
