//! Chat panel orchestration
//!
//! Ties the store, turn graph, parser, and dispatcher together around
//! the send round trip, behind trait seams for the host application's
//! collaborators.

mod runtime;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use runtime::{ChatPanel, PanelConfig, SendError, APOLOGY_MESSAGE};
pub use traits::{
    CompletionClient, CompletionError, CompletionErrorKind, CompletionRequest, DocumentIndex,
    ThreadId, ThreadStore, ThreadStoreError,
};
