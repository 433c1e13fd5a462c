//! Synthesis of selection/focus context for outgoing requests

use crate::message::{DocRef, Message};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Fixed header prepended when any context section produced output
const CONTEXT_HEADER: &str = "[Workspace context]";

/// Preview length limit for the focused selection
const PREVIEW_MAX_CHARS: usize = 160;

/// The currently focused selection in the editor
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub document_id: String,
    pub block_id: Option<String>,
    pub preview: String,
}

/// A connected external tool server
#[derive(Debug, Clone)]
pub struct ToolServer {
    pub name: String,
    pub tool_count: usize,
}

/// Snapshot of the panel's surroundings at send time
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub selection: Option<Selection>,
    pub viewing: Vec<DocRef>,
    pub previously_viewed: Vec<DocRef>,
    pub context_docs: Vec<DocRef>,
    pub tool_server: Option<ToolServer>,
    pub ui_summary: Option<String>,
}

impl ContextSnapshot {
    /// Build the newline-joined summary; empty when there is nothing to say
    ///
    /// Sections with no data are omitted entirely, never emitted as
    /// empty-labeled lines. The fixed header appears iff at least one
    /// section produced output.
    pub fn synthesize(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        if let Some(selection) = &self.selection {
            let mut line = format!("Focused selection: document {}", selection.document_id);
            if let Some(block) = &selection.block_id {
                let _ = write!(line, ", block {block}");
            }
            if !selection.preview.is_empty() {
                let _ = write!(line, ": \"{}\"", truncate_preview(&selection.preview));
            }
            lines.push(line);
        }

        push_doc_line(&mut lines, "Currently viewing", &self.viewing);
        push_doc_line(&mut lines, "Previously viewed", &self.previously_viewed);
        push_doc_line(&mut lines, "Context documents", &self.context_docs);

        if let Some(server) = &self.tool_server {
            lines.push(format!(
                "Connected tool server: {} ({} tools)",
                server.name, server.tool_count
            ));
        }

        if let Some(summary) = self.ui_summary.as_ref().filter(|s| !s.trim().is_empty()) {
            lines.push(format!("UI: {summary}"));
        }

        if lines.is_empty() {
            return String::new();
        }

        let mut out = String::from(CONTEXT_HEADER);
        for line in lines {
            out.push('\n');
            out.push_str(&line);
        }
        out
    }
}

fn push_doc_line(lines: &mut Vec<String>, label: &str, docs: &[DocRef]) {
    if docs.is_empty() {
        return;
    }
    let listed: Vec<&str> = docs
        .iter()
        .map(|d| d.title.as_deref().unwrap_or(d.id.as_str()))
        .collect();
    lines.push(format!("{label}: {}", listed.join(", ")));
}

fn truncate_preview(preview: &str) -> String {
    let mut chars = preview.chars();
    let head: String = chars.by_ref().take(PREVIEW_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Compose the literal outgoing message for a send
///
/// Prepends the synthesized context (when non-empty) and, when the user
/// message references "this/that/the section" after an insertion verb,
/// appends the most recent assistant message verbatim in a fenced block
/// so the insertion target is deterministic.
pub fn compose_outgoing(
    user_message: &str,
    snapshot: &ContextSnapshot,
    last_assistant: Option<&Message>,
) -> String {
    let mut out = String::new();

    let context = snapshot.synthesize();
    if !context.is_empty() {
        out.push_str(&context);
        out.push_str("\n\n");
    }
    out.push_str(user_message);

    if references_section(user_message) {
        if let Some(assistant) = last_assistant {
            let _ = write!(
                out,
                "\n\nThe section being referenced:\n```\n{}\n```",
                assistant.content
            );
        }
    }

    out
}

/// Does the message insert/append/place/put/add "this/that/the section"?
fn references_section(message: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(insert|append|place|put|add)\b[^.\n]*\b(this|that|the)\s+section\b")
            .expect("section-reference pattern is valid")
    });
    pattern.is_match(message)
}
