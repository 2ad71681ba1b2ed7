//! Completion state of an analysis session.
//!
//! Everything here is recomputed from the session markers and the live graph
//! on each call; nothing is cached between queries.

use crate::graph::{DependencyGraph, NodeId, UnresolvedNode};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BLOCKER_NO_ACTION_URL: &str = "Target action URL has not been identified.";
pub const BLOCKER_NO_MASTER_NODE: &str = "Master node has not been created for the target action.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionState {
    NoTargetIdentified,
    MasterNodePending,
    InProgress,
    Complete,
    Blocked,
}

impl CompletionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionState::NoTargetIdentified => "NoTargetIdentified",
            CompletionState::MasterNodePending => "MasterNodePending",
            CompletionState::InProgress => "InProgress",
            CompletionState::Complete => "Complete",
            CompletionState::Blocked => "Blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CompletionState::Complete | CompletionState::Blocked)
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDiagnostics {
    pub has_action_url: bool,
    pub has_master_node: bool,
    pub unresolved_nodes: Vec<UnresolvedNode>,
    /// Independently actionable reasons the session is not complete.
    pub blockers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSnapshot {
    pub state: CompletionState,
    pub diagnostics: CompletionDiagnostics,
}

/// Compute the completion state from the session markers and the graph.
///
/// The action URL counts as set whenever it is present and non-empty; a
/// whitespace-only URL is treated as set.
pub fn analyze_completion(
    action_url: Option<&str>,
    master_node_id: Option<NodeId>,
    graph: &DependencyGraph,
) -> CompletionSnapshot {
    let has_action_url = action_url.is_some_and(|url| !url.is_empty());
    let has_master_node = master_node_id.is_some();
    let unresolved_nodes = graph.unresolved_nodes();

    let mut blockers = Vec::new();
    if !has_action_url {
        blockers.push(BLOCKER_NO_ACTION_URL.to_string());
    }

    let state = match master_node_id {
        _ if !has_action_url => CompletionState::NoTargetIdentified,
        None => {
            blockers.push(BLOCKER_NO_MASTER_NODE.to_string());
            CompletionState::MasterNodePending
        }
        Some(id) if !graph.contains(id) => {
            blockers.push(format!("Master node {} no longer exists in the graph.", id));
            CompletionState::Blocked
        }
        Some(_) if graph.is_complete() => CompletionState::Complete,
        Some(_) => CompletionState::InProgress,
    };

    for node in &unresolved_nodes {
        blockers.push(unresolved_blocker(node));
    }

    CompletionSnapshot {
        state,
        diagnostics: CompletionDiagnostics {
            has_action_url,
            has_master_node,
            unresolved_nodes,
            blockers,
        },
    }
}

pub fn unresolved_blocker(node: &UnresolvedNode) -> String {
    format!(
        "Node {} has unresolved parts: {}",
        node.node_id,
        node.dynamic_parts.join(", ")
    )
}
