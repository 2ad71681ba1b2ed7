//! Dependency graph of captured HTTP interactions.
//!
//! One node per interaction, or per synthetic cookie / not-found / master
//! placeholder. An edge `from -> to` means `to` consumes a value produced by
//! `from`. Edges are accepted before global consistency is known, so cycles
//! can exist; they are detected explicitly and make ordering fail rather than
//! being prevented on insertion.

use crate::catalog::RequestDescription;
use crate::error::{Error, Result};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// Placeholder dynamic part for a node that was discovered but not yet
/// examined by the oracle. Keeps the node unresolved until it is analyzed.
pub const PENDING_ANALYSIS: &str = "<pending analysis>";

/// Opaque node identifier, generated once at insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(NodeId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A captured call that produces values for others.
    Request,
    /// A cookie from the jar.
    Cookie,
    /// A value with no discoverable origin.
    NotFound,
    /// The target action before it is bound to a captured call.
    Master,
    /// The captured call that performs the target action.
    MasterRequest,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Request => "request",
            NodeKind::Cookie => "cookie",
            NodeKind::NotFound => "not_found",
            NodeKind::Master => "master",
            NodeKind::MasterRequest => "master_request",
        }
    }

    /// Whether `content` is the payload this kind carries.
    pub fn accepts(&self, content: &NodeContent) -> bool {
        match self {
            NodeKind::Request | NodeKind::MasterRequest => {
                matches!(content, NodeContent::Request(_))
            }
            NodeKind::Cookie => matches!(content, NodeContent::Cookie { .. }),
            NodeKind::NotFound => matches!(content, NodeContent::NotFound { .. }),
            NodeKind::Master => matches!(content, NodeContent::Action { .. }),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "request" => Ok(NodeKind::Request),
            "cookie" => Ok(NodeKind::Cookie),
            "not_found" => Ok(NodeKind::NotFound),
            "master" => Ok(NodeKind::Master),
            "master_request" => Ok(NodeKind::MasterRequest),
            other => Err(Error::UnknownNodeKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeContent {
    Request(RequestDescription),
    Cookie { key: String, value: String },
    NotFound { value: String },
    Action { url: String },
}

impl NodeContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeContent::Request(_) => "request",
            NodeContent::Cookie { .. } => "cookie",
            NodeContent::NotFound { .. } => "not_found",
            NodeContent::Action { .. } => "action",
        }
    }

    pub fn as_request(&self) -> Option<&RequestDescription> {
        match self {
            NodeContent::Request(request) => Some(request),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub content: NodeContent,
    /// Values this node needs that are not yet traced to a source.
    #[serde(default)]
    pub dynamic_parts: Vec<String>,
    /// Values this node's response is known to supply.
    #[serde(default)]
    pub extracted_parts: Vec<String>,
    /// User-supplied known values, by variable name.
    #[serde(default)]
    pub input_variables: BTreeMap<String, String>,
}

impl Node {
    pub fn is_resolved(&self) -> bool {
        self.dynamic_parts.is_empty()
    }

    pub fn is_pending_analysis(&self) -> bool {
        self.dynamic_parts.iter().any(|p| p == PENDING_ANALYSIS)
    }

    /// Short human-readable description for reports.
    pub fn label(&self) -> String {
        match &self.content {
            NodeContent::Request(request) => {
                format!("{} {}", request.method.to_uppercase(), request.url)
            }
            NodeContent::Cookie { key, .. } => format!("cookie {}", key),
            NodeContent::NotFound { value } => format!("unresolved '{}'", value),
            NodeContent::Action { url } => format!("action {}", url),
        }
    }
}

/// Attributes applied by `add_node` / `update_node`.
///
/// List attributes replace the current value (de-duplicated, order kept);
/// input variables are merged by name.
#[derive(Debug, Clone, Default)]
pub struct NodeAttrs {
    pub dynamic_parts: Option<Vec<String>>,
    pub extracted_parts: Option<Vec<String>>,
    pub input_variables: Option<BTreeMap<String, String>>,
}

impl NodeAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dynamic_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dynamic_parts = Some(parts.into_iter().map(Into::into).collect());
        self
    }

    pub fn extracted_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extracted_parts = Some(parts.into_iter().map(Into::into).collect());
        self
    }

    pub fn input_variables(mut self, vars: BTreeMap<String, String>) -> Self {
        self.input_variables = Some(vars);
        self
    }

    fn merge_into(self, node: &mut Node) -> Result<()> {
        let dynamic = self
            .dynamic_parts
            .map(dedup_ordered)
            .unwrap_or_else(|| node.dynamic_parts.clone());
        let extracted = self
            .extracted_parts
            .map(dedup_ordered)
            .unwrap_or_else(|| node.extracted_parts.clone());

        let overlap: Vec<String> = dynamic
            .iter()
            .filter(|part| extracted.contains(part))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(Error::OverlappingParts {
                node: node.id,
                values: overlap,
            });
        }

        node.dynamic_parts = dynamic;
        node.extracted_parts = extracted;
        if let Some(vars) = self.input_variables {
            node.input_variables.extend(vars);
        }
        Ok(())
    }
}

/// Remove duplicates while keeping first occurrences in order.
pub fn dedup_ordered(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedNode {
    pub node_id: NodeId,
    pub dynamic_parts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: NodeId,
    pub to: NodeId,
    /// The value flowing along this edge, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Serialized form of a graph: stable and order-preserving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<EdgeRecord>,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is on the active DFS path.
    Gray,
    /// Node and everything reachable from it has been visited.
    Black,
}

/// One level of the explicit DFS stack.
struct Frame {
    node: NodeIndex,
    successors: Vec<NodeIndex>,
    next: usize,
}

/// Append-only dependency graph owned by a single analysis session.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<Node, Option<String>>,
    index: HashMap<NodeId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with a fresh id.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        content: NodeContent,
        attrs: NodeAttrs,
    ) -> Result<NodeId> {
        if !kind.accepts(&content) {
            return Err(Error::ContentMismatch {
                kind,
                content: content.type_name(),
            });
        }

        let mut node = Node {
            id: NodeId::generate(),
            kind,
            content,
            dynamic_parts: Vec::new(),
            extracted_parts: Vec::new(),
            input_variables: BTreeMap::new(),
        };
        attrs.merge_into(&mut node)?;

        let id = node.id;
        debug!("Adding {} node {} ({})", kind, id, node.label());
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(id)
    }

    /// Merge attributes into an existing node.
    pub fn update_node(&mut self, id: NodeId, attrs: NodeAttrs) -> Result<()> {
        let idx = self.node_index(id)?;
        attrs.merge_into(&mut self.graph[idx])
    }

    /// Record that `to` consumes something `from` produces.
    ///
    /// Acyclicity is not checked here. Repeated edges between the same pair
    /// are kept.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.connect(from, to, None)
    }

    /// Like `add_edge`, recording which value flows along the edge.
    pub fn add_value_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        value: impl Into<String>,
    ) -> Result<()> {
        self.connect(from, to, Some(value.into()))
    }

    fn connect(&mut self, from: NodeId, to: NodeId, value: Option<String>) -> Result<()> {
        let from_idx = self.node_index(from)?;
        let to_idx = self.node_index(to)?;
        if from_idx == to_idx {
            return Err(Error::SelfLoop(from));
        }
        self.graph.add_edge(from_idx, to_idx, value);
        Ok(())
    }

    pub fn get_node(&self, id: NodeId) -> Result<&Node> {
        let idx = self.node_index(id)?;
        Ok(&self.graph[idx])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    fn node_index(&self, id: NodeId) -> Result<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or(Error::NodeNotFound(id))
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> Vec<EdgeRecord> {
        self.graph
            .edge_references()
            .map(|edge| self.edge_record(edge.source(), edge.target(), edge.weight()))
            .collect()
    }

    /// Edges pointing into `id`, in insertion order.
    pub fn incoming(&self, id: NodeId) -> Result<Vec<EdgeRecord>> {
        let idx = self.node_index(id)?;
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| (edge.id(), edge.source(), edge.target(), edge.weight()))
            .collect();
        edges.sort_by_key(|(edge_id, ..)| *edge_id);

        Ok(edges
            .into_iter()
            .map(|(_, source, target, value)| self.edge_record(source, target, value))
            .collect())
    }

    fn edge_record(&self, source: NodeIndex, target: NodeIndex, value: &Option<String>) -> EdgeRecord {
        EdgeRecord {
            from: self.graph[source].id,
            to: self.graph[target].id,
            value: value.clone(),
        }
    }

    /// Outgoing targets in edge insertion order, repeats included.
    fn outgoing_targets(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| (edge.id(), edge.target()))
            .collect();
        edges.sort_by_key(|(edge_id, _)| *edge_id);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Find cycles with an iterative depth-first search.
    ///
    /// When a node already on the active path is reached again, the path
    /// suffix starting at that node is reported as a cycle. Returns `None`
    /// for an acyclic graph.
    pub fn detect_cycles(&self) -> Option<Vec<Vec<NodeId>>> {
        let mut colors = vec![Color::White; self.graph.node_count()];
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut cycles: Vec<Vec<NodeId>> = Vec::new();

        for start in self.graph.node_indices() {
            if colors[start.index()] != Color::White {
                continue;
            }

            colors[start.index()] = Color::Gray;
            path.push(start);
            let mut stack = vec![Frame {
                node: start,
                successors: self.unique_successors(start),
                next: 0,
            }];

            while let Some(frame) = stack.last_mut() {
                let Some(&next) = frame.successors.get(frame.next) else {
                    let finished = frame.node;
                    colors[finished.index()] = Color::Black;
                    path.pop();
                    stack.pop();
                    continue;
                };
                frame.next += 1;

                match colors[next.index()] {
                    Color::White => {
                        colors[next.index()] = Color::Gray;
                        path.push(next);
                        stack.push(Frame {
                            node: next,
                            successors: self.unique_successors(next),
                            next: 0,
                        });
                    }
                    Color::Gray => {
                        if let Some(start_pos) = path.iter().position(|&n| n == next) {
                            let cycle = path[start_pos..]
                                .iter()
                                .map(|&n| self.graph[n].id)
                                .collect();
                            cycles.push(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        if cycles.is_empty() {
            None
        } else {
            Some(cycles)
        }
    }

    fn unique_successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = HashSet::new();
        self.outgoing_targets(idx)
            .into_iter()
            .filter(|target| seen.insert(*target))
            .collect()
    }

    /// Order nodes so every producer precedes its consumers (Kahn's algorithm).
    ///
    /// Fails with `GraphCyclic` naming exactly the nodes that sit on a cycle;
    /// edges are never dropped to force an order.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        let mut in_degree = vec![0usize; self.graph.node_count()];
        for edge in self.graph.edge_references() {
            in_degree[edge.target().index()] += 1;
        }

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(idx) = queue.pop_front() {
            order.push(self.graph[idx].id);
            for target in self.outgoing_targets(idx) {
                in_degree[target.index()] -= 1;
                if in_degree[target.index()] == 0 {
                    queue.push_back(target);
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let nodes = self.cyclic_nodes();
            warn!(
                "Topological sort left {} node(s) unordered, {} on cycles",
                self.graph.node_count() - order.len(),
                nodes.len()
            );
            return Err(Error::GraphCyclic { nodes });
        }

        Ok(order)
    }

    /// Nodes belonging to a strongly connected component of more than one
    /// node, in insertion order. Self-loops are rejected on insertion.
    fn cyclic_nodes(&self) -> Vec<NodeId> {
        let on_cycle: HashSet<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flatten()
            .collect();

        self.graph
            .node_indices()
            .filter(|idx| on_cycle.contains(idx))
            .map(|idx| self.graph[idx].id)
            .collect()
    }

    /// True iff no node has dynamic parts left.
    pub fn is_complete(&self) -> bool {
        self.graph.node_weights().all(Node::is_resolved)
    }

    /// Every node with dynamic parts left, with a copy of those parts.
    pub fn unresolved_nodes(&self) -> Vec<UnresolvedNode> {
        self.graph
            .node_weights()
            .filter(|node| !node.is_resolved())
            .map(|node| UnresolvedNode {
                node_id: node.id,
                dynamic_parts: node.dynamic_parts.clone(),
            })
            .collect()
    }

    /// The request or master-request node for the same call, if any.
    pub fn find_node_by_request(&self, request: &RequestDescription) -> Option<NodeId> {
        let key = request.identity_key();
        self.graph
            .node_weights()
            .find(|node| match node.kind {
                NodeKind::Request | NodeKind::MasterRequest => node
                    .content
                    .as_request()
                    .is_some_and(|candidate| candidate.identity_key() == key),
                NodeKind::Cookie | NodeKind::NotFound | NodeKind::Master => false,
            })
            .map(|node| node.id)
    }

    pub fn find_cookie_node(&self, cookie_key: &str) -> Option<NodeId> {
        self.graph
            .node_weights()
            .find(|node| {
                matches!(&node.content, NodeContent::Cookie { key, .. } if key == cookie_key)
            })
            .map(|node| node.id)
    }

    pub fn find_not_found_node(&self, dynamic_part: &str) -> Option<NodeId> {
        self.graph
            .node_weights()
            .find(|node| {
                matches!(&node.content, NodeContent::NotFound { value } if value == dynamic_part)
            })
            .map(|node| node.id)
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self.edges(),
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_snapshot())?)
    }

    /// Rebuild a graph from its serialized form, keeping node ids and order.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        if snapshot.node_count != snapshot.nodes.len() || snapshot.edge_count != snapshot.edges.len() {
            return Err(Error::InvalidSnapshot(format!(
                "declared {} nodes / {} edges but found {} / {}",
                snapshot.node_count,
                snapshot.edge_count,
                snapshot.nodes.len(),
                snapshot.edges.len()
            )));
        }

        let mut graph = DependencyGraph::new();
        for node in snapshot.nodes {
            if graph.index.contains_key(&node.id) {
                return Err(Error::InvalidSnapshot(format!("duplicate node id {}", node.id)));
            }
            if !node.kind.accepts(&node.content) {
                return Err(Error::ContentMismatch {
                    kind: node.kind,
                    content: node.content.type_name(),
                });
            }

            let mut checked = Node {
                dynamic_parts: Vec::new(),
                extracted_parts: Vec::new(),
                input_variables: BTreeMap::new(),
                ..node.clone()
            };
            NodeAttrs {
                dynamic_parts: Some(node.dynamic_parts),
                extracted_parts: Some(node.extracted_parts),
                input_variables: Some(node.input_variables),
            }
            .merge_into(&mut checked)?;

            let id = checked.id;
            let idx = graph.graph.add_node(checked);
            graph.index.insert(id, idx);
        }

        for edge in snapshot.edges {
            if !graph.contains(edge.from) || !graph.contains(edge.to) {
                return Err(Error::InvalidSnapshot(format!(
                    "edge {} -> {} references an unknown node",
                    edge.from, edge.to
                )));
            }
            graph.connect(edge.from, edge.to, edge.value)?;
        }

        Ok(graph)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: GraphSnapshot = serde_json::from_str(content)?;
        Self::from_snapshot(snapshot)
    }
}
