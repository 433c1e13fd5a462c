//! Visualization-only turn graph
//!
//! Mirrors sends and responses as an append-only arena of nodes and
//! edges for the host UI. Derived state: never the source of truth for
//! conversation history, mutated in place by status updates, cleared
//! only in bulk.

use crate::message::{DocRef, MessageId, MessageRole, ThinkingStep};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed grid layout: columns before wrapping to the next row
const GRID_COLUMNS: u64 = 4;
const GRID_X_SPACING: f64 = 260.0;
const GRID_Y_SPACING: f64 = 160.0;

const COLOR_ACTIVE: &str = "#f59e0b";
const COLOR_COMPLETED: &str = "#22c55e";
const COLOR_ERROR: &str = "#ef4444";

/// Identifier of a node in the turn graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Lifecycle status of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Active,
    Completed,
    Error,
}

impl TurnStatus {
    fn color(self) -> &'static str {
        match self {
            TurnStatus::Active => COLOR_ACTIVE,
            TurnStatus::Completed => COLOR_COMPLETED,
            TurnStatus::Error => COLOR_ERROR,
        }
    }
}

/// Deterministic layout position derived from the turn counter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: f64,
    pub y: f64,
}

impl GridPosition {
    #[allow(clippy::cast_precision_loss)] // turn counts stay far below 2^52
    fn for_index(index: u64) -> Self {
        Self {
            x: (index % GRID_COLUMNS) as f64 * GRID_X_SPACING,
            y: (index / GRID_COLUMNS) as f64 * GRID_Y_SPACING,
        }
    }
}

/// Structured payload carried by a turn node; fields merge individually
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_steps: Option<Vec<ThinkingStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptations: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_docs: Option<Vec<DocRef>>,
}

impl TurnDetails {
    /// Overlay `other` on `self`: present fields win, absent fields keep
    fn merge(&mut self, other: TurnDetails) {
        if other.thinking_steps.is_some() {
            self.thinking_steps = other.thinking_steps;
        }
        if other.tool_calls.is_some() {
            self.tool_calls = other.tool_calls;
        }
        if other.artifacts.is_some() {
            self.artifacts = other.artifacts;
        }
        if other.adaptations.is_some() {
            self.adaptations = other.adaptations;
        }
        if other.candidate_docs.is_some() {
            self.candidate_docs = other.candidate_docs;
        }
    }
}

/// One node in the turn arena
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnNode {
    pub id: NodeId,
    /// Node this turn follows; `None` for a root. Edit/rollback resends
    /// branch here instead of re-linearizing history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    pub role: MessageRole,
    /// Message this turn mirrors, if one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<MessageId>,
    pub title: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: TurnStatus,
    pub position: GridPosition,
    #[serde(flatten)]
    pub details: TurnDetails,
}

/// Visual styling of an edge, derived from the target node's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeStyle {
    pub color: String,
    pub animated: bool,
}

impl EdgeStyle {
    fn for_status(status: TurnStatus) -> Self {
        Self {
            color: status.color().to_string(),
            animated: status == TurnStatus::Active,
        }
    }
}

/// Edge from a node's parent to the node itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(flatten)]
    pub style: EdgeStyle,
}

/// Append-only arena of turns with deterministic grid layout
///
/// Sequential sends chain each new node to the previous one: after N
/// `add_turn` calls with no intervening `reset` there are exactly N
/// nodes and N-1 edges, edge k connecting node k to node k+1. Resends
/// after an edit or rollback instead pass an explicit parent through
/// `add_turn_at`, creating a true branch point; nodes are never deleted
/// individually, only in bulk by `reset`.
#[derive(Debug, Default)]
pub struct TurnGraph {
    nodes: Vec<TurnNode>,
    edges: Vec<TurnEdge>,
    counter: u64,
    last_node: Option<NodeId>,
}

impl TurnGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node chained to the previous last node
    pub fn add_turn(
        &mut self,
        role: MessageRole,
        source_message_id: Option<MessageId>,
        title: impl Into<String>,
        content: impl Into<String>,
        status: TurnStatus,
        details: TurnDetails,
    ) -> NodeId {
        let parent = self.last_node;
        self.add_turn_at(parent, role, source_message_id, title, content, status, details)
    }

    /// Create a node under an explicit parent (branch point)
    #[allow(clippy::too_many_arguments)]
    pub fn add_turn_at(
        &mut self,
        parent: Option<NodeId>,
        role: MessageRole,
        source_message_id: Option<MessageId>,
        title: impl Into<String>,
        content: impl Into<String>,
        status: TurnStatus,
        details: TurnDetails,
    ) -> NodeId {
        let index = self.counter;
        self.counter += 1;
        let id = NodeId(index);
        let parent = parent.filter(|p| self.nodes.iter().any(|n| n.id == *p));

        self.nodes.push(TurnNode {
            id,
            parent,
            role,
            source_message_id,
            title: title.into(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
            status,
            position: GridPosition::for_index(index),
            details,
        });

        if let Some(parent) = parent {
            self.edges.push(TurnEdge {
                source: parent,
                target: id,
                style: EdgeStyle::for_status(status),
            });
        }
        self.last_node = Some(id);
        id
    }

    /// Update a node's status, merging any partial details, and restyle
    /// its single inbound edge
    pub fn update_status(&mut self, node_id: NodeId, status: TurnStatus, details: TurnDetails) {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) else {
            tracing::debug!(node = %node_id, "status update for unknown turn node ignored");
            return;
        };
        node.status = status;
        node.details.merge(details);

        if let Some(edge) = self.edges.iter_mut().find(|e| e.target == node_id) {
            edge.style = EdgeStyle::for_status(status);
        }
    }

    /// Clear all nodes and edges and reset the counter and last-node pointer
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.counter = 0;
        self.last_node = None;
    }

    pub fn nodes(&self) -> &[TurnNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[TurnEdge] {
        &self.edges
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.last_node
    }

    /// Node mirroring a given message, if one was recorded for it
    pub fn node_for_message(&self, message_id: MessageId) -> Option<NodeId> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.source_message_id == Some(message_id))
            .map(|n| n.id)
    }

    pub fn parent_of(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.id == node_id)
            .and_then(|n| n.parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_plain(graph: &mut TurnGraph, status: TurnStatus) -> NodeId {
        graph.add_turn(
            MessageRole::User,
            None,
            "turn",
            "content",
            status,
            TurnDetails::default(),
        )
    }

    #[test]
    fn n_turns_form_a_single_chain() {
        let mut graph = TurnGraph::new();
        let n = 7;
        let ids: Vec<NodeId> = (0..n)
            .map(|_| add_plain(&mut graph, TurnStatus::Completed))
            .collect();

        assert_eq!(graph.nodes().len(), n);
        assert_eq!(graph.edges().len(), n - 1);
        for (k, edge) in graph.edges().iter().enumerate() {
            assert_eq!(edge.source, ids[k]);
            assert_eq!(edge.target, ids[k + 1]);
        }
        assert_eq!(graph.last_node(), Some(ids[n - 1]));
    }

    #[test]
    fn positions_wrap_into_rows() {
        let mut graph = TurnGraph::new();
        for _ in 0..6 {
            add_plain(&mut graph, TurnStatus::Completed);
        }
        let nodes = graph.nodes();
        assert!((nodes[0].position.x - 0.0).abs() < f64::EPSILON);
        assert!((nodes[3].position.y - 0.0).abs() < f64::EPSILON);
        // Fifth node wraps onto the second row, first column
        assert!((nodes[4].position.x - 0.0).abs() < f64::EPSILON);
        assert!((nodes[4].position.y - GRID_Y_SPACING).abs() < f64::EPSILON);
    }

    #[test]
    fn active_edges_are_animated_until_status_settles() {
        let mut graph = TurnGraph::new();
        add_plain(&mut graph, TurnStatus::Completed);
        let active = add_plain(&mut graph, TurnStatus::Active);

        assert!(graph.edges()[0].style.animated);
        assert_eq!(graph.edges()[0].style.color, COLOR_ACTIVE);

        graph.update_status(active, TurnStatus::Completed, TurnDetails::default());
        assert!(!graph.edges()[0].style.animated);
        assert_eq!(graph.edges()[0].style.color, COLOR_COMPLETED);

        graph.update_status(active, TurnStatus::Error, TurnDetails::default());
        assert_eq!(graph.edges()[0].style.color, COLOR_ERROR);
    }

    #[test]
    fn update_merges_partial_details_field_by_field() {
        let mut graph = TurnGraph::new();
        let id = graph.add_turn(
            MessageRole::Assistant,
            None,
            "reply",
            "",
            TurnStatus::Active,
            TurnDetails {
                tool_calls: Some(vec![serde_json::json!({"name": "openDocument"})]),
                ..TurnDetails::default()
            },
        );

        graph.update_status(
            id,
            TurnStatus::Completed,
            TurnDetails {
                artifacts: Some(vec![serde_json::json!({"id": "a1"})]),
                ..TurnDetails::default()
            },
        );

        let node = &graph.nodes()[0];
        assert!(node.details.tool_calls.is_some(), "existing field kept");
        assert!(node.details.artifacts.is_some(), "new field merged");
    }

    #[test]
    fn update_of_unknown_node_is_ignored() {
        let mut graph = TurnGraph::new();
        add_plain(&mut graph, TurnStatus::Active);
        graph.update_status(NodeId(99), TurnStatus::Error, TurnDetails::default());
        assert_eq!(graph.nodes()[0].status, TurnStatus::Active);
    }

    #[test]
    fn explicit_parent_creates_a_branch_point() {
        let mut graph = TurnGraph::new();
        let root = add_plain(&mut graph, TurnStatus::Completed);
        let first_reply = add_plain(&mut graph, TurnStatus::Completed);

        // Resend after an edit branches from the original turn's parent
        let branch = graph.add_turn_at(
            graph.parent_of(first_reply),
            MessageRole::User,
            None,
            "edited",
            "edited content",
            TurnStatus::Completed,
            TurnDetails::default(),
        );

        assert_eq!(graph.nodes().len(), 3);
        assert_eq!(graph.parent_of(branch), Some(root));
        let inbound: Vec<_> = graph.edges().iter().filter(|e| e.source == root).collect();
        assert_eq!(inbound.len(), 2, "root now has two children");
        assert_eq!(graph.last_node(), Some(branch));
    }

    #[test]
    fn unknown_parent_falls_back_to_a_root_node() {
        let mut graph = TurnGraph::new();
        let id = graph.add_turn_at(
            Some(NodeId(42)),
            MessageRole::User,
            None,
            "turn",
            "content",
            TurnStatus::Completed,
            TurnDetails::default(),
        );
        assert_eq!(graph.parent_of(id), None);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn node_for_message_returns_the_latest_mirror() {
        let mut graph = TurnGraph::new();
        let message = MessageId(3);
        graph.add_turn(
            MessageRole::User,
            Some(message),
            "first",
            "",
            TurnStatus::Completed,
            TurnDetails::default(),
        );
        let resend = graph.add_turn(
            MessageRole::User,
            Some(message),
            "resend",
            "",
            TurnStatus::Completed,
            TurnDetails::default(),
        );
        assert_eq!(graph.node_for_message(message), Some(resend));
        assert_eq!(graph.node_for_message(MessageId(99)), None);
    }

    #[test]
    fn reset_clears_everything_including_the_counter() {
        let mut graph = TurnGraph::new();
        add_plain(&mut graph, TurnStatus::Completed);
        add_plain(&mut graph, TurnStatus::Completed);
        graph.reset();

        assert!(graph.nodes().is_empty());
        assert!(graph.edges().is_empty());
        assert_eq!(graph.last_node(), None);

        let fresh = add_plain(&mut graph, TurnStatus::Completed);
        assert_eq!(fresh, NodeId(0));
        assert!((graph.nodes()[0].position.x - 0.0).abs() < f64::EPSILON);
    }
}
