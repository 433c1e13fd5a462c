//! Tolerant decoding of agent response envelopes
//!
//! The completion backend returns either plain text or a JSON-encoded
//! envelope, in one of several historical shapes. Everything is
//! normalized here into a single [`ResponseEnvelope`]; legacy field
//! names never leak past this module.

use crate::message::{DocRef, ThinkingStep};
use serde::Serialize;
use serde_json::Value;

/// Default overlay message when a proposal carries none
pub const DEFAULT_PROPOSAL_MESSAGE: &str = "The assistant proposed changes to this document.";

/// Accepted spellings for a document id inside a normalized payload
const DOC_ID_KEYS: [&str; 4] = ["openedDocumentId", "documentId", "docId", "id"];
/// Accepted spellings for a created element id
const ELEMENT_ID_KEYS: [&str; 2] = ["createdNodeId", "nodeId"];
/// Alternate field names the historical formats used for a call's result
const RESULT_KEYS: [&str; 4] = ["result", "output", "data", "payload"];

/// A machine-actionable intent extracted from a response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Intent {
    /// Focus a document in the host workspace
    FocusDocument { document_id: String },
    /// Focus an element within a document; dispatched after a short
    /// delay so an asynchronously mounting view can settle
    FocusElement {
        document_id: String,
        element_id: String,
    },
    /// Open the proposal overlay with a batch of edit actions
    OpenProposal { actions: Vec<Value>, message: String },
}

/// A tool call reported by the agent, with lenient field resolution
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Normalized result payload (`result`/`output`/`data`/`payload`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ToolCallRecord {
    fn from_value(value: &Value) -> Self {
        let name = value
            .get("name")
            .or_else(|| value.get("tool"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let result = RESULT_KEYS
            .iter()
            .find_map(|key| value.get(*key))
            .cloned();
        Self {
            name,
            args: value.get("args").or_else(|| value.get("arguments")).cloned(),
            result,
            success: value.get("success").and_then(Value::as_bool),
            error: value.get("error").cloned(),
        }
    }

    fn is_failed(&self) -> bool {
        self.success == Some(false)
            || self.error.is_some()
            || self
                .result
                .as_ref()
                .is_some_and(|r| r.get("error").is_some())
    }

    fn failure_message(&self) -> String {
        self.error
            .as_ref()
            .or_else(|| self.result.as_ref().and_then(|r| r.get("error")))
            .map_or_else(
                || "Tool call failed".to_string(),
                |error| match error {
                    Value::String(s) => s.clone(),
                    other => other
                        .get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| other.to_string(), ToString::to_string),
                },
            )
    }
}

/// A failed tool call, normalized for the failure banner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCall {
    pub tool: String,
    pub message: String,
}

/// Decoded form of an assistant response: display text plus structured
/// metadata. Ephemeral, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub display_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub artifacts: Vec<Value>,
    pub thinking_steps: Vec<ThinkingStep>,
    pub adaptations: Vec<Value>,
    pub candidate_docs: Vec<DocRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_document_id: Option<String>,
    /// Normalized side-effect intents, in encounter order
    pub intents: Vec<Intent>,
    pub failed_calls: Vec<FailedCall>,
}

impl ResponseEnvelope {
    fn plain(raw: &str) -> Self {
        Self {
            display_text: raw.to_string(),
            ..Self::default()
        }
    }
}

/// Decode a raw agent response string
///
/// Falls back to verbatim raw-text display (all structured fields
/// empty) when the string is not a JSON object. Never fails.
pub fn parse(raw: &str) -> ResponseEnvelope {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return ResponseEnvelope::plain(raw);
    };
    let Some(object) = value.as_object() else {
        return ResponseEnvelope::plain(raw);
    };

    let mut envelope = ResponseEnvelope::default();

    if let Some(final_response) = object.get("finalResponse").and_then(Value::as_str) {
        envelope.display_text = final_response.to_string();
        envelope.artifacts = lift_array(object.get("artifacts"));
        envelope.adaptations = lift_array(object.get("adaptations"));
        envelope.thinking_steps = lift_typed(object.get("thinkingSteps"));
        envelope.candidate_docs = lift_typed(object.get("candidateDocs"));
    } else if let (Some(text), Some(created)) = (
        object.get("text").and_then(Value::as_str),
        object.get("documentCreated"),
    ) {
        // Legacy shape predating the structured envelope
        envelope.display_text = text.to_string();
        envelope.created_document_id = created
            .get("id")
            .and_then(Value::as_str)
            .map(ToString::to_string);
    } else {
        tracing::debug!("unrecognized envelope shape, displaying raw response");
        envelope.display_text = raw.to_string();
    }

    envelope.tool_calls = lift_array(object.get("toolCalls"))
        .iter()
        .map(ToolCallRecord::from_value)
        .collect();

    envelope.intents = scan_tool_calls(&envelope.tool_calls);
    if envelope.intents.is_empty() {
        envelope.intents = top_level_intents(&value);
    }

    envelope.failed_calls = envelope
        .tool_calls
        .iter()
        .filter(|call| call.is_failed())
        .map(|call| FailedCall {
            tool: call.name.clone(),
            message: call.failure_message(),
        })
        .collect();

    envelope
}

/// Extract intents from recognized tool names, in call order
fn scan_tool_calls(calls: &[ToolCallRecord]) -> Vec<Intent> {
    let mut intents = Vec::new();
    for call in calls {
        let payload = call.result.as_ref();
        match call.name.as_str() {
            "openDocument" | "openDoc" | "summarizeDocument" => {
                if let Some(document_id) = payload.and_then(resolve_doc_id) {
                    intents.push(Intent::FocusDocument { document_id });
                }
            }
            "editDoc" => {
                if let Some(document_id) = payload.and_then(resolve_doc_id) {
                    intents.push(Intent::FocusDocument {
                        document_id: document_id.clone(),
                    });
                    if let Some(element_id) = payload.and_then(resolve_element_id) {
                        intents.push(Intent::FocusElement {
                            document_id,
                            element_id,
                        });
                    }
                }
            }
            "proposeNode" | "proposeUpdateNode" => {
                if let Some(intent) = payload.and_then(proposal_from) {
                    intents.push(intent);
                }
            }
            _ => {}
        }
    }
    intents
}

/// Re-derive the same intent kinds from top-level fields (older agents
/// reported results beside the text instead of inside tool calls)
fn top_level_intents(value: &Value) -> Vec<Intent> {
    let mut intents = Vec::new();

    if let Some(document_id) = value
        .get("openedDocumentId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        intents.push(Intent::FocusDocument {
            document_id: document_id.to_string(),
        });
    }

    if let Some(document_id) = value
        .get("documentId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        intents.push(Intent::FocusDocument {
            document_id: document_id.to_string(),
        });
        if let Some(element_id) = resolve_element_id(value) {
            intents.push(Intent::FocusElement {
                document_id: document_id.to_string(),
                element_id,
            });
        }
    }

    if let Some(intent) = proposal_from(value) {
        intents.push(intent);
    }

    intents
}

fn proposal_from(payload: &Value) -> Option<Intent> {
    let actions = payload.get("actions")?.as_array()?;
    if actions.is_empty() {
        return None;
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROPOSAL_MESSAGE)
        .to_string();
    Some(Intent::OpenProposal {
        actions: actions.clone(),
        message,
    })
}

fn resolve_doc_id(payload: &Value) -> Option<String> {
    DOC_ID_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn resolve_element_id(payload: &Value) -> Option<String> {
    ELEMENT_ID_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Lift a field as an array, defaulting to empty if absent or not one
fn lift_array(field: Option<&Value>) -> Vec<Value> {
    field
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Lift an array of typed elements, skipping malformed entries
fn lift_typed<T: serde::de::DeserializeOwned>(field: Option<&Value>) -> Vec<T> {
    field
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
