//! docpanel — conversation-state core for a document workspace's AI chat panel
//!
//! Owns the message history (edit/rollback/rerun/undo semantics), a
//! visualization-only turn graph, tolerant decoding of agent response
//! envelopes, and dispatch of the resulting side effects to the host
//! application. Rendering, the document editor, and persistence are
//! external collaborators reached through the traits in [`panel`].

pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod graph;
pub mod message;
pub mod panel;
pub mod store;

pub use context::{compose_outgoing, ContextSnapshot, Selection, ToolServer};
pub use dispatch::{Dispatcher, FailureBanner, PanelEvent};
pub use envelope::{parse, FailedCall, Intent, ResponseEnvelope, ToolCallRecord};
pub use graph::{NodeId, TurnDetails, TurnEdge, TurnGraph, TurnNode, TurnStatus};
pub use message::{
    CreatedDocument, DocRef, Message, MessageDraft, MessageId, MessageRole, StepKind, ThinkingStep,
    ToolCallInfo,
};
pub use panel::{
    ChatPanel, CompletionClient, CompletionError, CompletionErrorKind, CompletionRequest,
    DocumentIndex, PanelConfig, SendError, ThreadId, ThreadStore, ThreadStoreError,
    APOLOGY_MESSAGE,
};
pub use store::{MessageStore, Resend};
