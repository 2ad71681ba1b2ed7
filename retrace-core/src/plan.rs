//! Replay plan: the ordered call chain handed to code generation.

use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, NodeContent, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedValue {
    pub from: NodeId,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStep {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub summary: String,
    pub content: NodeContent,
    pub extracts: Vec<String>,
    pub consumes: Vec<ConsumedValue>,
    pub input_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPlan {
    pub steps: Vec<ReplayStep>,
}

impl ReplayPlan {
    /// Build the plan, refusing while any node has unresolved parts.
    pub fn from_graph(graph: &DependencyGraph) -> Result<Self> {
        if !graph.is_complete() {
            return Err(Error::AnalysisIncomplete {
                unresolved: graph.unresolved_nodes(),
            });
        }

        let mut steps = Vec::with_capacity(graph.node_count());
        for id in graph.topological_sort()? {
            let node = graph.get_node(id)?;
            let consumes = graph
                .incoming(id)?
                .into_iter()
                .filter_map(|edge| {
                    edge.value.map(|value| ConsumedValue {
                        from: edge.from,
                        value,
                    })
                })
                .collect();

            steps.push(ReplayStep {
                node_id: id,
                kind: node.kind,
                summary: node.label(),
                content: node.content.clone(),
                extracts: node.extracted_parts.clone(),
                consumes,
                input_variables: node.input_variables.clone(),
            });
        }

        Ok(Self { steps })
    }

    /// Steps that issue an HTTP call, in replay order.
    pub fn http_steps(&self) -> impl Iterator<Item = &ReplayStep> {
        self.steps.iter().filter(|step| match step.kind {
            NodeKind::Request | NodeKind::MasterRequest => true,
            NodeKind::Cookie | NodeKind::NotFound | NodeKind::Master => false,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
