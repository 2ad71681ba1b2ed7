use crate::graph::{NodeId, NodeKind, UnresolvedNode};
use crate::oracle::OracleError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Dependency graph is cyclic through nodes: {}", join_ids(.nodes))]
    GraphCyclic { nodes: Vec<NodeId> },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Analysis incomplete: {} node(s) still have unresolved parts", .unresolved.len())]
    AnalysisIncomplete { unresolved: Vec<UnresolvedNode> },

    #[error("Oracle failure: {0}")]
    Oracle(#[from] OracleError),

    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    #[error("A {kind} node cannot carry {content} content")]
    ContentMismatch {
        kind: NodeKind,
        content: &'static str,
    },

    #[error("Edge from {0} to itself rejected")]
    SelfLoop(NodeId),

    #[error("Node {node} would both consume and extract: {}", .values.join(", "))]
    OverlappingParts { node: NodeId, values: Vec<String> },

    #[error("Target action URL has not been identified")]
    NoActionUrl,

    #[error("Target action is not present in the capture: {0}")]
    TargetNotCaptured(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid capture: {0}")]
    InvalidCapture(String),

    #[error("Invalid graph snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
