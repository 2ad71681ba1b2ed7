// Report generation from an analysis session or a saved graph

use crate::completion::{CompletionDiagnostics, CompletionState, analyze_completion};
use crate::error::Result;
use crate::graph::{DependencyGraph, NodeContent, NodeId, NodeKind};
use crate::plan::ReplayPlan;
use crate::session::AnalysisSession;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const THIN_RULE: &str = "────────────────────────────────────────────────────────────────────────────────";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "markdown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub dynamic_parts: Vec<String>,
    pub extracted_parts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub state: CompletionState,
    pub diagnostics: CompletionDiagnostics,
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes: Vec<NodeRow>,
    pub cycles: Vec<Vec<NodeId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_order: Option<Vec<NodeId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ReplayPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_error: Option<String>,
}

/// Gather everything a report shows about a live session.
pub fn build_report(session: &AnalysisSession) -> ReportData {
    let mut data = gather(
        session.action_url.as_deref(),
        session.master_node_id,
        &session.graph,
    );
    data.session_id = Some(session.id.to_string());
    data.created_at = Some(session.created_at.to_rfc3339());
    data
}

/// Report on a graph loaded without its session, e.g. from a snapshot.
///
/// The master node is the first `master` or `master_request` node; its
/// content supplies the action URL.
pub fn build_graph_report(graph: &DependencyGraph) -> ReportData {
    let master = graph.nodes().find(|node| match node.kind {
        NodeKind::Master | NodeKind::MasterRequest => true,
        NodeKind::Request | NodeKind::Cookie | NodeKind::NotFound => false,
    });

    let action_url = master.and_then(|node| match &node.content {
        NodeContent::Request(request) => Some(request.url.clone()),
        NodeContent::Action { url } => Some(url.clone()),
        NodeContent::Cookie { .. } | NodeContent::NotFound { .. } => None,
    });

    gather(action_url.as_deref(), master.map(|node| node.id), graph)
}

fn gather(action_url: Option<&str>, master: Option<NodeId>, graph: &DependencyGraph) -> ReportData {
    let completion = analyze_completion(action_url, master, graph);

    let nodes = graph
        .nodes()
        .map(|node| NodeRow {
            id: node.id,
            kind: node.kind,
            label: node.label(),
            dynamic_parts: node.dynamic_parts.clone(),
            extracted_parts: node.extracted_parts.clone(),
        })
        .collect();

    let (plan, plan_error) = match ReplayPlan::from_graph(graph) {
        Ok(plan) => (Some(plan), None),
        Err(e) => (None, Some(e.to_string())),
    };

    ReportData {
        session_id: None,
        created_at: None,
        action_url: action_url.map(String::from),
        state: completion.state,
        diagnostics: completion.diagnostics,
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        nodes,
        cycles: graph.detect_cycles().unwrap_or_default(),
        replay_order: graph.topological_sort().ok(),
        plan,
        plan_error,
    }
}

fn section(report: &mut String, title: &str) {
    report.push_str(RULE);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(RULE);
    report.push_str("\n\n");
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    // Header
    report.push_str(RULE);
    report.push('\n');
    report.push_str("                        RETRACE DEPENDENCY ANALYSIS REPORT\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    if let Some(ref id) = data.session_id {
        report.push_str(&format!("Session ID:   {}\n", id));
    }
    if let Some(ref created) = data.created_at {
        report.push_str(&format!("Started:      {}\n", created));
    }
    report.push_str(&format!(
        "Target:       {}\n",
        data.action_url.as_deref().unwrap_or("(not identified)")
    ));
    report.push_str(&format!("State:        {}\n", data.state));
    report.push_str(&format!("Nodes:        {}\n", data.node_count));
    report.push_str(&format!("Edges:        {}\n", data.edge_count));
    report.push('\n');

    if !data.diagnostics.blockers.is_empty() {
        section(&mut report, "BLOCKERS");
        for (idx, blocker) in data.diagnostics.blockers.iter().enumerate() {
            report.push_str(&format!("[{}]\n", idx + 1));
            report.push_str(&wrap_text(blocker, 80, "  "));
        }
        report.push('\n');
    }

    section(&mut report, "DEPENDENCY GRAPH");
    if data.nodes.is_empty() {
        report.push_str("  (empty)\n");
    }
    for node in &data.nodes {
        report.push_str(&format!("{:<16} {}\n", format!("[{}]", node.kind), node.label));
        report.push_str(&format!("                 id: {}\n", node.id));
        if !node.extracted_parts.is_empty() {
            report.push_str(&format!(
                "                 supplies: {}\n",
                node.extracted_parts.join(", ")
            ));
        }
        if !node.dynamic_parts.is_empty() {
            report.push_str(&format!(
                "                 unresolved: {}\n",
                node.dynamic_parts.join(", ")
            ));
        }
    }
    report.push('\n');

    if !data.cycles.is_empty() {
        section(&mut report, "CYCLES");
        for cycle in &data.cycles {
            let ids: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            report.push_str(&format!("  {}\n", ids.join(" -> ")));
        }
        report.push('\n');
    }

    section(&mut report, "REPLAY ORDER");
    match (&data.plan, &data.plan_error) {
        (Some(plan), _) => {
            for (idx, step) in plan.steps.iter().enumerate() {
                report.push_str(&format!("{:>3}. {}\n", idx + 1, step.summary));
                for consumed in &step.consumes {
                    report.push_str(&format!(
                        "       uses '{}' from {}\n",
                        consumed.value, consumed.from
                    ));
                }
                for (name, value) in &step.input_variables {
                    report.push_str(&format!("       input {} = '{}'\n", name, value));
                }
            }
        }
        (None, Some(error)) => {
            report.push_str("Replay plan not available:\n");
            report.push_str(&wrap_text(error, 80, "  "));
        }
        (None, None) => report.push_str("  (empty)\n"),
    }
    report.push('\n');
    report.push_str(THIN_RULE);
    report.push('\n');

    // Footer
    report.push_str("\nGenerated by Retrace - API call chain reconstruction\n\n");

    report
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str("# Retrace Dependency Analysis\n\n");
    if let Some(ref id) = data.session_id {
        report.push_str(&format!("- **Session:** `{}`\n", id));
    }
    report.push_str(&format!(
        "- **Target:** {}\n",
        data.action_url
            .as_deref()
            .map(|url| format!("`{}`", url))
            .unwrap_or_else(|| "_not identified_".to_string())
    ));
    report.push_str(&format!("- **State:** {}\n", data.state));
    report.push_str(&format!(
        "- **Graph:** {} nodes, {} edges\n\n",
        data.node_count, data.edge_count
    ));

    if !data.diagnostics.blockers.is_empty() {
        report.push_str("## Blockers\n\n");
        for blocker in &data.diagnostics.blockers {
            report.push_str(&format!("- {}\n", blocker));
        }
        report.push('\n');
    }

    report.push_str("## Nodes\n\n");
    report.push_str("| Kind | Node | Supplies | Unresolved |\n");
    report.push_str("|------|------|----------|------------|\n");
    for node in &data.nodes {
        report.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            node.kind,
            escape_cell(&node.label),
            escape_cell(&node.extracted_parts.join(", ")),
            escape_cell(&node.dynamic_parts.join(", "))
        ));
    }
    report.push('\n');

    if !data.cycles.is_empty() {
        report.push_str("## Cycles\n\n");
        for cycle in &data.cycles {
            let ids: Vec<String> = cycle.iter().map(|id| format!("`{}`", id)).collect();
            report.push_str(&format!("- {}\n", ids.join(" → ")));
        }
        report.push('\n');
    }

    if let Some(ref plan) = data.plan {
        report.push_str("## Replay order\n\n");
        for (idx, step) in plan.steps.iter().enumerate() {
            report.push_str(&format!("{}. {}\n", idx + 1, escape_cell(&step.summary)));
        }
        report.push('\n');
    }

    report
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

pub fn generate_json_report(data: &ReportData) -> std::result::Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Retrace",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "session": {
                "id": data.session_id,
                "created_at": data.created_at,
                "action_url": data.action_url,
            },
            "completion": {
                "state": data.state,
                "diagnostics": data.diagnostics,
            },
            "graph": {
                "node_count": data.node_count,
                "edge_count": data.edge_count,
                "nodes": data.nodes,
                "cycles": data.cycles,
            },
            "replay_order": data.replay_order,
            "plan": data.plan,
            "plan_error": data.plan_error,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn render_report(data: &ReportData, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
        ReportFormat::Json => Ok(generate_json_report(data)?),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.len() + word.len() + 1 > width - indent.len() && !current_line.is_empty() {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_breaks_long_lines() {
        let text = "alpha beta gamma delta epsilon";
        let wrapped = wrap_text(text, 16, "  ");
        assert_eq!(wrapped, "  alpha beta\n  gamma delta\n  epsilon\n");
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("a|b"), "a\\|b");
    }
}
