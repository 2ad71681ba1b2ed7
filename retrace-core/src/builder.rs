//! Analysis pass: grows a session's graph breadth-first from the master node.
//!
//! Each pending request node is shown to the oracle, the values it names are
//! traced to a cookie, an earlier response, or nowhere, and every value ends
//! up owned by exactly one provenance node with an edge into the consumer.

use crate::catalog::{RequestCatalog, RequestDescription};
use crate::completion::CompletionSnapshot;
use crate::config::AnalysisOptions;
use crate::cookies::CookieJar;
use crate::error::{Error, Result};
use crate::graph::{
    DependencyGraph, NodeAttrs, NodeContent, NodeId, NodeKind, PENDING_ANALYSIS, dedup_ordered,
};
use crate::oracle::OracleAdapter;
use crate::resolver::DependencyResolver;
use crate::session::AnalysisSession;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub nodes_processed: usize,
    /// Nodes left pending because the oracle had nothing to say (strict mode).
    pub nodes_deferred: usize,
    pub cookie_deps: usize,
    pub request_deps: usize,
    pub not_found: usize,
    /// Nodes still awaiting analysis when the pass stopped.
    pub nodes_pending: usize,
    pub completion: CompletionSnapshot,
}

#[derive(Default)]
struct PassCounters {
    processed: usize,
    deferred: usize,
    cookie_deps: usize,
    request_deps: usize,
    not_found: usize,
}

/// Run one analysis pass over `session`.
///
/// Resumable: nodes still carrying the pending marker from an earlier pass
/// are picked up again. An oracle failure aborts the pass; everything
/// recorded so far stays in the graph and the failing node stays pending.
pub async fn run_analysis(
    session: &mut AnalysisSession,
    catalog: &RequestCatalog,
    cookies: &CookieJar,
    oracle: &dyn OracleAdapter,
    options: &AnalysisOptions,
) -> Result<AnalysisSummary> {
    let master = session.create_master_node(catalog)?;
    if let NodeContent::Action { url } = &session.graph.get_node(master)?.content {
        return Err(Error::TargetNotCaptured(url.clone()));
    }

    let mut queue: VecDeque<NodeId> = session
        .graph
        .nodes()
        .filter(|node| node.is_pending_analysis())
        .map(|node| node.id)
        .collect();
    let mut counters = PassCounters::default();

    info!(
        "Starting analysis pass for session {} ({} pending node(s))",
        session.id,
        queue.len()
    );

    while let Some(id) = queue.pop_front() {
        if counters.processed >= options.max_nodes {
            info!(
                "Node limit of {} reached, {} node(s) left pending",
                options.max_nodes,
                queue.len() + 1
            );
            break;
        }
        counters.processed += 1;

        let discovered = analyze_node(session, id, catalog, cookies, oracle, options, &mut counters).await?;
        queue.extend(discovered);
    }

    let nodes_pending = session
        .graph
        .nodes()
        .filter(|node| node.is_pending_analysis())
        .count();

    Ok(AnalysisSummary {
        nodes_processed: counters.processed,
        nodes_deferred: counters.deferred,
        cookie_deps: counters.cookie_deps,
        request_deps: counters.request_deps,
        not_found: counters.not_found,
        nodes_pending,
        completion: session.completion(),
    })
}

/// Analyze one node and return the request nodes it caused to be created.
async fn analyze_node(
    session: &mut AnalysisSession,
    id: NodeId,
    catalog: &RequestCatalog,
    cookies: &CookieJar,
    oracle: &dyn OracleAdapter,
    options: &AnalysisOptions,
    counters: &mut PassCounters,
) -> Result<Vec<NodeId>> {
    let node = session.graph.get_node(id)?;
    let request: RequestDescription = match node.kind {
        NodeKind::Request | NodeKind::MasterRequest => match node.content.as_request() {
            Some(request) => request.clone(),
            None => return Ok(Vec::new()),
        },
        NodeKind::Cookie | NodeKind::NotFound | NodeKind::Master => return Ok(Vec::new()),
    };

    let mut known_inputs = session.input_variables.clone();
    known_inputs.extend(node.input_variables.clone());

    debug!("Asking oracle about {} {}", request.method, request.url);
    let answer = oracle
        .identify_dynamic_parts(&request, &known_inputs)
        .await
        .map_err(|e| {
            warn!("Oracle failed for {}: {}", request.url, e);
            Error::from(e)
        })?;

    let answer: Vec<String> = answer
        .into_iter()
        .filter(|value| !value.trim().is_empty())
        .collect();

    if answer.is_empty() && options.strict_oracle {
        warn!("Oracle had nothing to say about {}, leaving it pending", request.url);
        counters.deferred += 1;
        return Ok(Vec::new());
    }

    let mut node_inputs = BTreeMap::new();
    let mut dynamic = Vec::new();
    for value in dedup_ordered(answer) {
        match known_inputs.iter().find(|(_, known)| **known == value) {
            Some((name, _)) => {
                node_inputs.insert(name.clone(), value);
            }
            None => dynamic.push(value),
        }
    }

    let resolution = DependencyResolver::new(catalog.preceding(request.catalog_index), cookies)
        .excluding(request.identity_key())
        .resolve(&dynamic);
    let graph = &mut session.graph;
    let mut discovered = Vec::new();
    let mut unresolved = Vec::new();

    for dep in resolution.cookie_deps {
        let cookie_id = match graph.find_cookie_node(&dep.cookie_key) {
            Some(existing) => {
                append_extracted(graph, existing, &dep.dynamic_part)?;
                existing
            }
            None => graph.add_node(
                NodeKind::Cookie,
                NodeContent::Cookie {
                    key: dep.cookie_key.clone(),
                    value: dep.dynamic_part.clone(),
                },
                NodeAttrs::new().extracted_parts([dep.dynamic_part.clone()]),
            )?,
        };
        graph.add_value_edge(cookie_id, id, dep.dynamic_part)?;
        counters.cookie_deps += 1;
    }

    for dep in resolution.request_deps {
        let Some(source) = catalog
            .get(dep.source_request)
            .map(|entry| entry.describe(dep.source_request))
        else {
            unresolved.push(dep.dynamic_part);
            continue;
        };

        let source_id = match graph.find_node_by_request(&source) {
            Some(existing) if existing == id => {
                debug!("'{}' only traces back to an identical call", dep.dynamic_part);
                unresolved.push(dep.dynamic_part);
                continue;
            }
            Some(existing) => {
                append_extracted(graph, existing, &dep.dynamic_part)?;
                existing
            }
            None => {
                let created = graph.add_node(
                    NodeKind::Request,
                    NodeContent::Request(source),
                    NodeAttrs::new()
                        .dynamic_parts([PENDING_ANALYSIS])
                        .extracted_parts([dep.dynamic_part.clone()]),
                )?;
                discovered.push(created);
                created
            }
        };
        graph.add_value_edge(source_id, id, dep.dynamic_part)?;
        counters.request_deps += 1;
    }

    unresolved.extend(resolution.not_found.into_iter().map(|dep| dep.dynamic_part));
    for value in unresolved {
        let not_found_id = match graph.find_not_found_node(&value) {
            Some(existing) => existing,
            None => graph.add_node(
                NodeKind::NotFound,
                NodeContent::NotFound {
                    value: value.clone(),
                },
                NodeAttrs::new().dynamic_parts([value.clone()]),
            )?,
        };
        graph.add_value_edge(not_found_id, id, value)?;
        counters.not_found += 1;
    }

    graph.update_node(
        id,
        NodeAttrs::new()
            .dynamic_parts(Vec::<String>::new())
            .input_variables(node_inputs),
    )?;

    Ok(discovered)
}

fn append_extracted(graph: &mut DependencyGraph, id: NodeId, value: &str) -> Result<()> {
    let node = graph.get_node(id)?;
    if node.extracted_parts.iter().any(|part| part == value) {
        return Ok(());
    }

    let mut parts = node.extracted_parts.clone();
    parts.push(value.to_string());
    graph.update_node(id, NodeAttrs::new().extracted_parts(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CapturedRequest, CapturedResponse};
    use crate::completion::CompletionState;
    use crate::oracle::{OracleError, StaticOracle};

    fn json_response(text: &str) -> CapturedResponse {
        CapturedResponse {
            status: 200,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            text: Some(text.to_string()),
            json: None,
        }
    }

    #[tokio::test]
    async fn test_oracle_failure_keeps_master_pending() {
        let catalog = RequestCatalog::new(vec![
            CapturedRequest::new("POST", "https://x.test/api/buy").with_response(json_response("{}")),
        ]);
        let oracle = StaticOracle::new().with_failure(
            "https://x.test/api/buy",
            OracleError::Status {
                status: 502,
                message: "bad gateway".to_string(),
            },
        );
        let mut session = AnalysisSession::new();
        session.set_action_url("https://x.test/api/buy");

        let result = run_analysis(
            &mut session,
            &catalog,
            &CookieJar::new(),
            &oracle,
            &AnalysisOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(Error::Oracle(OracleError::Status { status: 502, .. }))));
        let master = session.master_node_id.unwrap();
        assert!(session.graph.get_node(master).unwrap().is_pending_analysis());
        assert_eq!(session.completion().state, CompletionState::InProgress);
    }

    #[tokio::test]
    async fn test_input_variables_are_not_dynamic() {
        let catalog = RequestCatalog::new(vec![
            CapturedRequest::new("GET", "https://x.test/api/search?q=shoes")
                .with_response(json_response("[]")),
        ]);
        let oracle = StaticOracle::new().with_answer("https://x.test/api/search?q=shoes", ["shoes"]);
        let mut session = AnalysisSession::new()
            .with_input_variables(BTreeMap::from([("query".to_string(), "shoes".to_string())]));
        session.set_action_url("https://x.test/api/search?q=shoes");

        let summary = run_analysis(
            &mut session,
            &catalog,
            &CookieJar::new(),
            &oracle,
            &AnalysisOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.completion.state, CompletionState::Complete);
        let master = session.graph.get_node(session.master_node_id.unwrap()).unwrap();
        assert_eq!(master.input_variables.get("query"), Some(&"shoes".to_string()));
        assert_eq!(session.graph.node_count(), 1);
    }
}
