//! Typed side-effect notifications for the host shell
//!
//! Parsed intents fan out over a broadcast bus as a single tagged event
//! enum. Delivery is fire-and-forget: lagged or absent receivers are
//! ignored, and proposal overlays are emitted twice (immediate plus a
//! delayed retry) so a listener that mounts late still hears them.
//! Consumers must treat repeated identical proposals as idempotent.

use crate::envelope::{FailedCall, Intent, ResponseEnvelope};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;

/// Heuristic wait for listener readiness; not an acknowledged handshake
pub const PROPOSAL_RETRY_DELAY: Duration = Duration::from_millis(150);
/// Wait for the target document view to mount before focusing an element
pub const ELEMENT_FOCUS_DELAY: Duration = Duration::from_millis(150);

const CHANNEL_CAPACITY: usize = 64;

/// Events broadcast to external listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum PanelEvent {
    FocusDocument {
        document_id: String,
    },
    /// Follows its paired `FocusDocument` after a short delay
    FocusElement {
        document_id: String,
        element_id: String,
    },
    /// Emitted twice per response that contains proposal actions
    OpenProposalOverlay {
        actions: Vec<Value>,
        message: String,
    },
    /// Emitted once when two or more documents were focused by a single
    /// response, carrying the ordered id list
    MultipleDocumentsOpened {
        document_ids: Vec<String>,
    },
    /// Injects a prompt into the panel's send path from outside
    QuickPrompt {
        text: String,
        document_id: Option<String>,
    },
}

/// Broadcast bus for panel events
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<PanelEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.tx.subscribe()
    }

    /// Emit one notification per intent, in encounter order
    pub fn dispatch(&self, envelope: &ResponseEnvelope) {
        let mut focused: Vec<String> = Vec::new();

        for intent in &envelope.intents {
            match intent {
                Intent::FocusDocument { document_id } => {
                    focused.push(document_id.clone());
                    self.emit(PanelEvent::FocusDocument {
                        document_id: document_id.clone(),
                    });
                }
                Intent::FocusElement {
                    document_id,
                    element_id,
                } => {
                    self.emit_delayed(
                        ELEMENT_FOCUS_DELAY,
                        PanelEvent::FocusElement {
                            document_id: document_id.clone(),
                            element_id: element_id.clone(),
                        },
                    );
                }
                Intent::OpenProposal { actions, message } => {
                    let event = PanelEvent::OpenProposalOverlay {
                        actions: actions.clone(),
                        message: message.clone(),
                    };
                    self.emit(event.clone());
                    self.emit_delayed(PROPOSAL_RETRY_DELAY, event);
                }
            }
        }

        if focused.len() >= 2 {
            self.emit(PanelEvent::MultipleDocumentsOpened {
                document_ids: focused,
            });
        }
    }

    pub fn emit(&self, event: PanelEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("panel event dropped, no listeners subscribed");
        }
    }

    fn emit_delayed(&self, delay: Duration, event: PanelEvent) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).is_err() {
                tracing::debug!("delayed panel event dropped, no listeners subscribed");
            }
        });
    }
}

/// Dismissible, expandable banner listing failed tool calls
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureBanner {
    pub entries: Vec<FailedCall>,
    pub dismissed: bool,
    pub expanded: bool,
}

impl FailureBanner {
    /// Record new failures; a fresh failure un-dismisses the banner
    pub fn record(&mut self, failures: &[FailedCall]) {
        if failures.is_empty() {
            return;
        }
        self.entries.extend_from_slice(failures);
        self.dismissed = false;
    }

    pub fn dismiss(&mut self) {
        self.dismissed = true;
        self.expanded = false;
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }

    pub fn is_visible(&self) -> bool {
        !self.dismissed && !self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::parse;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    fn proposal_raw() -> String {
        json!({
            "finalResponse": "suggested",
            "toolCalls": [{"name": "proposeNode", "result": {"actions": [{"op": "a1"}, {"op": "a2"}], "message": "m"}}],
        })
        .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn proposal_is_emitted_twice_with_identical_payload() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.dispatch(&parse(&proposal_raw()));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, second);
        let PanelEvent::OpenProposalOverlay { actions, message } = first else {
            panic!("expected proposal overlay event");
        };
        assert_eq!(actions, vec![json!({"op": "a1"}), json!({"op": "a2"})]);
        assert_eq!(message, "m");

        // Exactly two, nothing else queued
        tokio::task::yield_now().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn two_focused_documents_yield_one_aggregate_event() {
        let raw = json!({
            "finalResponse": "opened",
            "toolCalls": [
                {"name": "openDocument", "result": {"openedDocumentId": "D1"}},
                {"name": "openDocument", "result": {"openedDocumentId": "D2"}},
            ],
        })
        .to_string();

        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.dispatch(&parse(&raw));

        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::FocusDocument {
                document_id: "D1".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::FocusDocument {
                document_id: "D2".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::MultipleDocumentsOpened {
                document_ids: vec!["D1".to_string(), "D2".to_string()]
            }
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn single_focus_produces_no_aggregate() {
        let raw = json!({
            "finalResponse": "opened",
            "toolCalls": [{"name": "openDocument", "result": {"openedDocumentId": "D1"}}],
        })
        .to_string();

        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.dispatch(&parse(&raw));

        assert!(matches!(
            rx.recv().await.unwrap(),
            PanelEvent::FocusDocument { .. }
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn element_focus_arrives_after_its_document_focus() {
        let raw = json!({
            "finalResponse": "edited",
            "toolCalls": [{"name": "editDoc", "result": {"documentId": "D5", "createdNodeId": "E2"}}],
        })
        .to_string();

        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.dispatch(&parse(&raw));

        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::FocusDocument {
                document_id: "D5".to_string()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PanelEvent::FocusElement {
                document_id: "D5".to_string(),
                element_id: "E2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn dispatch_without_listeners_does_not_panic() {
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch(&parse(&proposal_raw()));
    }

    #[test]
    fn banner_records_dismisses_and_reappears() {
        let mut banner = FailureBanner::default();
        assert!(!banner.is_visible());

        banner.record(&[FailedCall {
            tool: "openDocument".to_string(),
            message: "boom".to_string(),
        }]);
        assert!(banner.is_visible());

        banner.toggle_expanded();
        assert!(banner.expanded);

        banner.dismiss();
        assert!(!banner.is_visible());
        assert!(!banner.expanded);

        // New failure brings the banner back with history intact
        banner.record(&[FailedCall {
            tool: "editDoc".to_string(),
            message: "again".to_string(),
        }]);
        assert!(banner.is_visible());
        assert_eq!(banner.entries.len(), 2);
    }

    #[test]
    fn recording_nothing_leaves_dismissal_alone() {
        let mut banner = FailureBanner::default();
        banner.record(&[FailedCall {
            tool: "t".to_string(),
            message: "m".to_string(),
        }]);
        banner.dismiss();
        banner.record(&[]);
        assert!(!banner.is_visible());
    }
}
