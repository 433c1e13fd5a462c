//! The chat panel runtime: send round trip and conversation commands

use super::traits::{
    CompletionClient, CompletionRequest, DocumentIndex, ThreadId, ThreadStore,
};
use crate::context::{compose_outgoing, ContextSnapshot};
use crate::dispatch::{Dispatcher, FailureBanner, PanelEvent};
use crate::envelope::{self, FailedCall, Intent, ResponseEnvelope};
use crate::graph::{NodeId, TurnDetails, TurnGraph, TurnStatus};
use crate::message::{
    CreatedDocument, Message, MessageDraft, MessageId, MessageRole,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Generic apology appended when a request-level failure occurs
pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while processing that request. Please try again.";

/// Turn-node title length limit
const TITLE_MAX_CHARS: usize = 48;

/// Errors surfaced to callers of the send path
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// A request is already in flight; it cannot be aborted, only
    /// waited out
    #[error("a request is already in flight")]
    Busy,
}

/// Panel configuration for outgoing requests
#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub model: String,
    pub model_variant: Option<String>,
    pub tool_server_id: Option<String>,
    pub selected_document_id: Option<String>,
}

impl PanelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            model_variant: None,
            tool_server_id: None,
            selected_document_id: None,
        }
    }
}

/// One chat panel instance: owns the message history, turn graph,
/// failure banner, and the in-flight gate for its conversation
pub struct ChatPanel<C, T>
where
    C: CompletionClient,
    T: ThreadStore,
{
    config: PanelConfig,
    completion: C,
    threads: T,
    index: Option<Arc<dyn DocumentIndex>>,
    store: crate::store::MessageStore,
    graph: TurnGraph,
    dispatcher: Dispatcher,
    banner: FailureBanner,
    snapshot: ContextSnapshot,
    thread_id: Option<ThreadId>,
    in_flight: bool,
    fit_notify: Arc<tokio::sync::Notify>,
}

impl<C, T> ChatPanel<C, T>
where
    C: CompletionClient,
    T: ThreadStore,
{
    pub fn new(config: PanelConfig, completion: C, threads: T) -> Self {
        Self {
            config,
            completion,
            threads,
            index: None,
            store: crate::store::MessageStore::new(),
            graph: TurnGraph::new(),
            dispatcher: Dispatcher::new(),
            banner: FailureBanner::default(),
            snapshot: ContextSnapshot::default(),
            thread_id: None,
            in_flight: false,
            fit_notify: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Attach a read-only document index; its selectable documents seed
    /// the context-documents section when the snapshot has none
    pub fn with_document_index(mut self, index: Arc<dyn DocumentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Replace the selection/focus snapshot read at the next send
    pub fn set_context(&mut self, snapshot: ContextSnapshot) {
        self.snapshot = snapshot;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.dispatcher.subscribe()
    }

    /// Notified on the next scheduler tick after graph mutations; the
    /// host UI may auto-fit its layout then. Best effort only.
    pub fn layout_notify(&self) -> Arc<tokio::sync::Notify> {
        Arc::clone(&self.fit_notify)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn graph(&self) -> &TurnGraph {
        &self.graph
    }

    pub fn banner(&self) -> &FailureBanner {
        &self.banner
    }

    pub fn dismiss_banner(&mut self) {
        self.banner.dismiss();
    }

    pub fn toggle_banner_expanded(&mut self) {
        self.banner.toggle_expanded();
    }

    /// Send a user message through the full round trip
    ///
    /// The in-flight flag gates re-entry and is released in a final
    /// step regardless of success or failure; there is no cancellation.
    pub async fn send(&mut self, text: &str) -> Result<(), SendError> {
        self.send_internal(text, None).await
    }

    /// Edit a message; a user-message edit triggers exactly one new send
    ///
    /// The edited message becomes the tail of the history and is reused
    /// as the send's user message rather than appended again.
    pub async fn edit_message(&mut self, id: MessageId, new_content: &str) -> Result<(), SendError> {
        if self.in_flight {
            return Err(SendError::Busy);
        }
        if let Some(resend) = self.store.edit(id, new_content) {
            self.send_internal(&resend.content, Some(id)).await?;
        }
        Ok(())
    }

    /// Roll back to a user message and resend its content
    pub async fn rerun_from(&mut self, id: MessageId) -> Result<(), SendError> {
        if self.in_flight {
            return Err(SendError::Busy);
        }
        if let Some(resend) = self.store.rerun_from(id) {
            self.send_internal(&resend.content, Some(id)).await?;
        }
        Ok(())
    }

    /// Keep history up to and including the target message
    pub fn rollback_to(&mut self, id: MessageId) -> bool {
        self.store.rollback_to(id)
    }

    /// Remove the most recent assistant message
    pub fn undo_last_assistant(&mut self) -> Option<MessageId> {
        self.store.undo_last_assistant()
    }

    /// Clear the visualization chain (bulk reset, never node by node)
    pub fn reset_turns(&mut self) {
        self.graph.reset();
        self.schedule_layout_refresh();
    }

    /// Entry point for externally injected prompts
    pub async fn quick_prompt(
        &mut self,
        text: &str,
        document_id: Option<String>,
    ) -> Result<(), SendError> {
        if let Some(doc) = document_id.clone() {
            self.config.selected_document_id = Some(doc);
        }
        self.dispatcher.emit(PanelEvent::QuickPrompt {
            text: text.to_string(),
            document_id,
        });
        self.send(text).await
    }

    async fn send_internal(
        &mut self,
        text: &str,
        existing_user_id: Option<MessageId>,
    ) -> Result<(), SendError> {
        if self.in_flight {
            tracing::debug!("send rejected, request already in flight");
            return Err(SendError::Busy);
        }
        self.in_flight = true;
        self.round_trip(text, existing_user_id).await;
        self.in_flight = false;
        Ok(())
    }

    async fn round_trip(&mut self, text: &str, existing_user_id: Option<MessageId>) {
        let outgoing = compose_outgoing(text, &self.effective_snapshot(), self.store.last_assistant());

        let user_id = existing_user_id
            .unwrap_or_else(|| self.store.append(MessageDraft::user(text)));
        // A resend branches from the original turn's parent; a fresh
        // send chains onto the last node as usual
        let parent = existing_user_id
            .and_then(|id| self.graph.node_for_message(id))
            .map_or_else(|| self.graph.last_node(), |node| self.graph.parent_of(node));
        self.graph.add_turn_at(
            parent,
            MessageRole::User,
            Some(user_id),
            short_title(text),
            text,
            TurnStatus::Completed,
            TurnDetails::default(),
        );
        let reply_node = self.graph.add_turn(
            MessageRole::Assistant,
            None,
            "Assistant",
            "",
            TurnStatus::Active,
            TurnDetails::default(),
        );
        self.schedule_layout_refresh();

        let user_timestamp = chrono::Utc::now();
        self.persist(MessageRole::User, text, user_timestamp, &[]).await;

        let request = CompletionRequest {
            message: outgoing,
            selected_document_id: self.config.selected_document_id.clone(),
            model: self.config.model.clone(),
            model_variant: self.config.model_variant.clone(),
            tool_server_id: self.config.tool_server_id.clone(),
        };

        match self.completion.complete(&request).await {
            Ok(raw) => {
                let envelope = envelope::parse(&raw);
                self.apply_response(reply_node, &envelope).await;
            }
            Err(error) => {
                tracing::error!(kind = ?error.kind, error = %error, "completion request failed");
                self.apply_failure(reply_node, &error.to_string()).await;
            }
        }
        self.schedule_layout_refresh();
    }

    async fn apply_response(&mut self, reply_node: NodeId, envelope: &ResponseEnvelope) {
        self.graph.update_status(
            reply_node,
            TurnStatus::Completed,
            details_from(envelope),
        );

        let created = envelope
            .created_document_id
            .clone()
            .map(|id| CreatedDocument { id, title: None });
        let actions = envelope
            .intents
            .iter()
            .find_map(|intent| match intent {
                Intent::OpenProposal { actions, .. } => Some(actions.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let draft = MessageDraft::assistant(envelope.display_text.clone())
            .with_thinking_steps(envelope.thinking_steps.clone())
            .with_candidate_docs(envelope.candidate_docs.clone())
            .with_document_created(created)
            .with_actions(actions);
        self.store.append(draft);

        self.dispatcher.dispatch(envelope);
        self.banner.record(&envelope.failed_calls);

        self.persist(
            MessageRole::Assistant,
            &envelope.display_text,
            chrono::Utc::now(),
            &envelope.candidate_docs,
        )
        .await;
    }

    async fn apply_failure(&mut self, reply_node: NodeId, message: &str) {
        self.graph
            .update_status(reply_node, TurnStatus::Error, TurnDetails::default());
        self.banner.record(&[FailedCall {
            tool: "request".to_string(),
            message: message.to_string(),
        }]);
        self.store.append(MessageDraft::assistant(APOLOGY_MESSAGE));
        self.persist(
            MessageRole::Assistant,
            APOLOGY_MESSAGE,
            chrono::Utc::now(),
            &[],
        )
        .await;
    }

    /// Best-effort persistence: failures are logged, never propagated
    async fn persist(
        &mut self,
        role: MessageRole,
        content: &str,
        timestamp: chrono::DateTime<chrono::Utc>,
        candidate_docs: &[crate::message::DocRef],
    ) {
        if self.thread_id.is_none() {
            let context = self.snapshot.synthesize();
            let initial = if context.is_empty() {
                None
            } else {
                Some(context.as_str())
            };
            match self.threads.start_thread(initial).await {
                Ok(id) => self.thread_id = Some(id),
                Err(error) => {
                    tracing::warn!(error = %error, "failed to start thread, skipping persistence");
                    return;
                }
            }
        }
        let Some(thread_id) = self.thread_id.clone() else {
            return;
        };
        if let Err(error) = self
            .threads
            .append_message(&thread_id, role, content, timestamp, candidate_docs)
            .await
        {
            tracing::warn!(error = %error, role = role.as_str(), "failed to persist message");
        }
    }

    fn effective_snapshot(&self) -> ContextSnapshot {
        let mut snapshot = self.snapshot.clone();
        if snapshot.context_docs.is_empty() {
            if let Some(index) = &self.index {
                snapshot.context_docs = index.selectable_docs();
            }
        }
        snapshot
    }

    fn schedule_layout_refresh(&self) {
        let notify = Arc::clone(&self.fit_notify);
        tokio::spawn(async move {
            // Let the host's layout settle before asking it to fit
            tokio::task::yield_now().await;
            notify.notify_waiters();
        });
    }
}

fn details_from(envelope: &ResponseEnvelope) -> TurnDetails {
    let tool_calls = if envelope.tool_calls.is_empty() {
        None
    } else {
        Some(
            envelope
                .tool_calls
                .iter()
                .filter_map(|c| serde_json::to_value(c).ok())
                .collect(),
        )
    };
    TurnDetails {
        thinking_steps: non_empty(envelope.thinking_steps.clone()),
        tool_calls,
        artifacts: non_empty(envelope.artifacts.clone()),
        adaptations: non_empty(envelope.adaptations.clone()),
        candidate_docs: non_empty(envelope.candidate_docs.clone()),
    }
}

fn non_empty<V>(items: Vec<V>) -> Option<Vec<V>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn short_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut chars = first_line.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
