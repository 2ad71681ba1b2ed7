// Tests for report generation functionality

use retrace_core::catalog::{CapturedRequest, RequestCatalog};
use retrace_core::completion::CompletionState;
use retrace_core::graph::{DependencyGraph, NodeAttrs, NodeContent, NodeKind};
use retrace_core::report::{
    ReportFormat, build_graph_report, build_report, generate_json_report,
    generate_markdown_report, generate_text_report, render_report, save_report,
};
use retrace_core::session::AnalysisSession;
use tempfile::TempDir;

fn pending_session() -> AnalysisSession {
    let catalog = RequestCatalog::new(vec![CapturedRequest::new(
        "POST",
        "https://shop.test/api/checkout",
    )]);
    let mut session = AnalysisSession::new();
    session.set_action_url("https://shop.test/api/checkout");
    session.create_master_node(&catalog).unwrap();
    session
}

fn complete_graph() -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let cookie = graph
        .add_node(
            NodeKind::Cookie,
            NodeContent::Cookie {
                key: "sid".to_string(),
                value: "s-1".to_string(),
            },
            NodeAttrs::new().extracted_parts(["s-1"]),
        )
        .unwrap();
    let master = graph
        .add_node(
            NodeKind::MasterRequest,
            NodeContent::Request(CapturedRequest::new("GET", "https://shop.test/api/me").describe(0)),
            NodeAttrs::new(),
        )
        .unwrap();
    graph.add_value_edge(cookie, master, "s-1").unwrap();
    graph
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert!(matches!(ReportFormat::from_str("text"), Some(ReportFormat::Text)));
    assert!(matches!(ReportFormat::from_str("json"), Some(ReportFormat::Json)));
    assert!(matches!(ReportFormat::from_str("markdown"), Some(ReportFormat::Markdown)));
    assert!(matches!(ReportFormat::from_str("md"), Some(ReportFormat::Markdown)));
}

#[test]
fn test_report_format_from_str_case_insensitive() {
    assert!(matches!(ReportFormat::from_str("TEXT"), Some(ReportFormat::Text)));
    assert!(matches!(ReportFormat::from_str("Json"), Some(ReportFormat::Json)));
}

#[test]
fn test_report_format_from_str_invalid() {
    assert!(ReportFormat::from_str("csv").is_none());
    assert!(ReportFormat::from_str("pdf").is_none());
}

// ============================================================================
// Report Data Tests
// ============================================================================

#[test]
fn test_session_report_lists_blockers() {
    let session = pending_session();
    let data = build_report(&session);

    assert_eq!(data.session_id, Some(session.id.to_string()));
    assert_eq!(data.state, CompletionState::InProgress);
    assert_eq!(data.diagnostics.blockers.len(), 1);
    assert!(data.plan.is_none());
    assert!(data.plan_error.as_deref().unwrap().contains("Analysis incomplete"));
}

#[test]
fn test_graph_report_finds_master() {
    let data = build_graph_report(&complete_graph());

    assert_eq!(data.action_url.as_deref(), Some("https://shop.test/api/me"));
    assert_eq!(data.state, CompletionState::Complete);
    assert_eq!(data.replay_order.as_ref().unwrap().len(), 2);
    assert_eq!(data.plan.as_ref().unwrap().steps.len(), 2);
}

#[test]
fn test_graph_report_with_cycle() {
    let mut graph = complete_graph();
    let ids: Vec<_> = graph.nodes().map(|n| n.id).collect();
    graph.add_edge(ids[1], ids[0]).unwrap();

    let data = build_graph_report(&graph);
    assert_eq!(data.cycles.len(), 1);
    assert!(data.replay_order.is_none());
    assert!(data.plan_error.as_deref().unwrap().contains("cyclic"));
}

// ============================================================================
// Report Generation Tests
// ============================================================================

#[test]
fn test_text_report_sections() {
    let report = generate_text_report(&build_report(&pending_session()));

    assert!(report.contains("RETRACE DEPENDENCY ANALYSIS REPORT"));
    assert!(report.contains("BLOCKERS"));
    assert!(report.contains("DEPENDENCY GRAPH"));
    assert!(report.contains("POST https://shop.test/api/checkout"));
    assert!(report.contains("Replay plan not available"));
    assert!(!report.contains("CYCLES"));
}

#[test]
fn test_text_report_replay_order() {
    let report = generate_text_report(&build_graph_report(&complete_graph()));

    assert!(report.contains("REPLAY ORDER"));
    assert!(report.contains("  1. cookie sid"));
    assert!(report.contains("  2. GET https://shop.test/api/me"));
    assert!(report.contains("uses 's-1'"));
}

#[test]
fn test_markdown_report() {
    let report = generate_markdown_report(&build_graph_report(&complete_graph()));

    assert!(report.starts_with("# Retrace Dependency Analysis"));
    assert!(report.contains("| Kind | Node | Supplies | Unresolved |"));
    assert!(report.contains("## Replay order"));
}

#[test]
fn test_json_report_metadata() {
    let json = generate_json_report(&build_report(&pending_session())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["report"]["metadata"]["generator"], "Retrace");
    assert_eq!(value["report"]["metadata"]["format"], "json");
    assert!(value["report"]["metadata"]["generated_at"].is_string());
    assert_eq!(value["report"]["completion"]["state"], "InProgress");
    assert_eq!(
        value["report"]["session"]["action_url"],
        "https://shop.test/api/checkout"
    );
}

#[test]
fn test_render_and_save_report() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.md");
    let data = build_graph_report(&complete_graph());

    let content = render_report(&data, ReportFormat::Markdown).unwrap();
    save_report(&content, &path).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
}
