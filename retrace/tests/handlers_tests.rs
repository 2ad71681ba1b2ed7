use retrace::handlers::*;
use retrace_core::catalog::{CapturedRequest, CapturedResponse, RequestCatalog};
use retrace_core::config::{CONFIG_FILE_NAME, RetraceConfig};
use retrace_core::graph::{DependencyGraph, NodeAttrs, NodeContent, NodeKind};
use retrace_core::report::ReportFormat;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

fn shop_capture() -> Vec<CapturedRequest> {
    vec![
        CapturedRequest::new("GET", "https://shop.test/api/session").with_response(
            CapturedResponse {
                status: 200,
                headers: BTreeMap::from([(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )]),
                text: Some(r#"{"csrf":"csrf-abc"}"#.to_string()),
                json: Some(json!({"csrf": "csrf-abc"})),
            },
        ),
        CapturedRequest::new("POST", "https://shop.test/api/cart")
            .with_header("X-CSRF", "csrf-abc")
            .with_body(json!({"sku": "A-1"})),
    ]
}

fn write_json(value: &impl serde::Serialize) -> Result<NamedTempFile, Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{}", serde_json::to_string(value)?)?;
    Ok(file)
}

fn values(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Input Assignment Tests
// ============================================================================

#[test]
fn test_parse_input_assignment() {
    assert_eq!(
        parse_input_assignment("user=alice"),
        Ok(("user".to_string(), "alice".to_string()))
    );
}

#[test]
fn test_parse_input_assignment_keeps_equals_in_value() {
    assert_eq!(
        parse_input_assignment("filter=a=b"),
        Ok(("filter".to_string(), "a=b".to_string()))
    );
}

#[test]
fn test_parse_input_assignment_allows_empty_value() {
    assert_eq!(
        parse_input_assignment("note="),
        Ok(("note".to_string(), String::new()))
    );
}

#[test]
fn test_parse_input_assignment_rejects_malformed() {
    assert!(parse_input_assignment("alice").is_err());
    assert!(parse_input_assignment("=alice").is_err());
    assert!(parse_input_assignment("  =alice").is_err());
}

#[test]
fn test_parse_inputs_last_assignment_wins() {
    let inputs = parse_inputs(&values(&["qty=1", "user=alice", "qty=2"])).unwrap();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs["qty"], "2");
    assert_eq!(inputs["user"], "alice");
}

#[test]
fn test_parse_inputs_reports_first_error() {
    let err = parse_inputs(&values(&["user=alice", "broken"])).unwrap_err();
    assert!(err.contains("broken"));
}

// ============================================================================
// API Key Selection Tests
// ============================================================================

#[test]
fn test_select_api_key_precedence() {
    let flag = "from-flag".to_string();
    assert_eq!(
        select_api_key(Some(&flag), Some("from-config".into()), Some("from-env".into())),
        Some("from-flag".to_string())
    );
    assert_eq!(
        select_api_key(None, Some("from-config".into()), Some("from-env".into())),
        Some("from-config".to_string())
    );
    assert_eq!(
        select_api_key(None, None, Some("from-env".into())),
        Some("from-env".to_string())
    );
    assert_eq!(select_api_key(None, None, None), None);
}

#[test]
fn test_select_api_key_ignores_blank() {
    let flag = "  ".to_string();
    assert_eq!(select_api_key(Some(&flag), None, None), None);
}

// ============================================================================
// Loading Tests
// ============================================================================

#[test]
fn test_load_capture_native_format() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_json(&shop_capture())?;
    let catalog = load_capture(file.path())?;

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.entries()[1].url, "https://shop.test/api/cart");
    Ok(())
}

#[test]
fn test_load_capture_rejects_other_json() -> Result<(), Box<dyn std::error::Error>> {
    let file = write_json(&json!({"requests": []}))?;
    let err = load_capture(file.path()).unwrap_err();

    assert!(err.to_string().contains("Failed to load capture"));
    Ok(())
}

#[test]
fn test_load_capture_missing_file() {
    let path = PathBuf::from("/nonexistent/retrace/capture.har");
    assert!(load_capture(&path).is_err());
}

#[test]
fn test_load_cookies_optional() -> Result<(), Box<dyn std::error::Error>> {
    assert!(load_cookies(None)?.is_empty());

    let file = write_json(&json!({"session_cookie": "sess456"}))?;
    let path = file.path().to_path_buf();
    let jar = load_cookies(Some(&path))?;
    assert_eq!(jar.get("session_cookie").map(|c| c.value.as_str()), Some("sess456"));
    Ok(())
}

// ============================================================================
// Resolve Tests
// ============================================================================

#[test]
fn test_resolve_values_partitions_by_source() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = RequestCatalog::new(shop_capture());
    let cookie_file = write_json(&json!({"session_cookie": "sess456"}))?;
    let cookies = load_cookies(Some(&cookie_file.path().to_path_buf()))?;

    let resolution = resolve_values(
        &catalog,
        &cookies,
        &values(&["sess456", "csrf-abc", "ghost"]),
        None,
    );

    assert_eq!(resolution.cookie_deps.len(), 1);
    assert_eq!(resolution.cookie_deps[0].cookie_key, "session_cookie");
    assert_eq!(resolution.request_deps.len(), 1);
    assert_eq!(resolution.request_deps[0].source_request, 0);
    assert_eq!(resolution.not_found.len(), 1);
    assert_eq!(resolution.not_found[0].dynamic_part, "ghost");
    Ok(())
}

#[test]
fn test_resolve_values_before_limits_sources() {
    let catalog = RequestCatalog::new(shop_capture());
    let cookies = load_cookies(None).unwrap();

    let resolution = resolve_values(&catalog, &cookies, &values(&["csrf-abc"]), Some(0));

    assert!(resolution.request_deps.is_empty());
    assert_eq!(resolution.not_found.len(), 1);
}

#[test]
fn test_format_resolution_lists_buckets() {
    let catalog = RequestCatalog::new(shop_capture());
    let cookies = load_cookies(None).unwrap();
    let resolution = resolve_values(&catalog, &cookies, &values(&["csrf-abc", "ghost"]), None);

    let text = format_resolution(&resolution, &catalog);

    assert!(text.contains("Cookies"));
    assert!(text.contains("Responses"));
    assert!(text.contains("Not found"));
    assert!(text.contains("'csrf-abc'"));
    assert!(text.contains("https://shop.test/api/session"));
    assert!(text.contains("'ghost'"));
}

// ============================================================================
// Init Tests
// ============================================================================

#[test]
fn test_write_default_config_creates_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let target = dir.path().join("nested");

    let outcome = write_default_config(&target, false)?;
    let path = target.join(CONFIG_FILE_NAME);

    assert_eq!(outcome, InitOutcome::Created(path.clone()));
    assert_eq!(RetraceConfig::load(&path)?, RetraceConfig::default());
    Ok(())
}

#[test]
fn test_write_default_config_respects_existing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, r#"{"analysis": {"max_nodes": 3}}"#)?;

    let outcome = write_default_config(dir.path(), false)?;
    assert_eq!(outcome, InitOutcome::AlreadyExists(path.clone()));
    assert!(std::fs::read_to_string(&path)?.contains("3"));

    let outcome = write_default_config(dir.path(), true)?;
    assert_eq!(outcome, InitOutcome::Created(path.clone()));
    assert_eq!(RetraceConfig::load(&path)?, RetraceConfig::default());
    Ok(())
}

// ============================================================================
// Inspect Tests
// ============================================================================

fn saved_graph() -> Result<NamedTempFile, Box<dyn std::error::Error>> {
    let capture = shop_capture();
    let mut graph = DependencyGraph::new();
    let master = graph.add_node(
        NodeKind::MasterRequest,
        NodeContent::Request(capture[1].describe(1)),
        NodeAttrs::new(),
    )?;
    let source = graph.add_node(
        NodeKind::Request,
        NodeContent::Request(capture[0].describe(0)),
        NodeAttrs::new().extracted_parts(["csrf-abc"]),
    )?;
    graph.add_value_edge(source, master, "csrf-abc")?;

    let mut file = NamedTempFile::new()?;
    write!(file, "{}", graph.to_json()?)?;
    Ok(file)
}

#[test]
fn test_inspect_snapshot_text() -> Result<(), Box<dyn std::error::Error>> {
    let file = saved_graph()?;
    let report = inspect_snapshot(file.path(), ReportFormat::Text)?;

    assert!(report.contains("RETRACE DEPENDENCY ANALYSIS REPORT"));
    assert!(report.contains("REPLAY ORDER"));
    assert!(report.contains("GET https://shop.test/api/session"));
    Ok(())
}

#[test]
fn test_inspect_snapshot_json() -> Result<(), Box<dyn std::error::Error>> {
    let file = saved_graph()?;
    let report = inspect_snapshot(file.path(), ReportFormat::Json)?;
    let value: serde_json::Value = serde_json::from_str(&report)?;

    assert_eq!(value["report"]["completion"]["state"], "Complete");
    assert_eq!(value["report"]["graph"]["node_count"], 2);
    assert_eq!(value["report"]["graph"]["edge_count"], 1);
    Ok(())
}

#[test]
fn test_inspect_snapshot_rejects_garbage() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{{\"nodes\": 5}}")?;

    let err = inspect_snapshot(file.path(), ReportFormat::Text).unwrap_err();
    assert!(err.to_string().contains("Invalid graph snapshot"));
    Ok(())
}
