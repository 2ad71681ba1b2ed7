// Analysis sessions: each one exclusively owns its dependency graph

use crate::catalog::RequestCatalog;
use crate::completion::{CompletionSnapshot, analyze_completion};
use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, NodeAttrs, NodeContent, NodeId, NodeKind, PENDING_ANALYSIS};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AnalysisSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub action_url: Option<String>,
    pub master_node_id: Option<NodeId>,
    pub graph: DependencyGraph,
    /// Values the user supplied up front, by variable name.
    pub input_variables: BTreeMap<String, String>,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            action_url: None,
            master_node_id: None,
            graph: DependencyGraph::new(),
            input_variables: BTreeMap::new(),
        }
    }

    pub fn with_input_variables(mut self, vars: BTreeMap<String, String>) -> Self {
        self.input_variables = vars;
        self
    }

    pub fn set_action_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        debug!("Session {} targets {}", self.id, url);
        self.action_url = Some(url);
    }

    /// Add the node for the target action, once.
    ///
    /// Binds to the captured call for the action URL when there is one,
    /// pending oracle analysis. Otherwise a `master` placeholder is recorded
    /// whose only dynamic part is the URL itself. Calling again returns the
    /// existing node.
    pub fn create_master_node(&mut self, catalog: &RequestCatalog) -> Result<NodeId> {
        if let Some(id) = self.master_node_id
            && self.graph.contains(id)
        {
            return Ok(id);
        }

        let action_url = match self.action_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => return Err(Error::NoActionUrl),
        };

        let id = match catalog.find_action(&action_url) {
            Some(index) => {
                let request = catalog
                    .get(index)
                    .map(|entry| entry.describe(index))
                    .ok_or_else(|| Error::TargetNotCaptured(action_url.clone()))?;
                info!("Target action bound to capture entry #{}", index);
                self.graph.add_node(
                    NodeKind::MasterRequest,
                    NodeContent::Request(request),
                    NodeAttrs::new().dynamic_parts([PENDING_ANALYSIS]),
                )?
            }
            None => {
                warn!("Target action {} is not in the capture", action_url);
                self.graph.add_node(
                    NodeKind::Master,
                    NodeContent::Action {
                        url: action_url.clone(),
                    },
                    NodeAttrs::new().dynamic_parts([action_url.clone()]),
                )?
            }
        };

        self.master_node_id = Some(id);
        Ok(id)
    }

    pub fn completion(&self) -> CompletionSnapshot {
        analyze_completion(self.action_url.as_deref(), self.master_node_id, &self.graph)
    }
}

/// In-memory registry of live sessions. Ending a session drops its graph.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<Uuid, AnalysisSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Uuid {
        self.insert(AnalysisSession::new())
    }

    pub fn insert(&mut self, session: AnalysisSession) -> Uuid {
        let id = session.id;
        self.sessions.insert(id, session);
        id
    }

    pub fn get(&self, id: Uuid) -> Result<&AnalysisSession> {
        self.sessions.get(&id).ok_or(Error::SessionNotFound(id))
    }

    pub fn get_mut(&mut self, id: Uuid) -> Result<&mut AnalysisSession> {
        self.sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))
    }

    pub fn end(&mut self, id: Uuid) -> Result<AnalysisSession> {
        self.sessions.remove(&id).ok_or(Error::SessionNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn analyze_completion_state(&self, id: Uuid) -> Result<CompletionSnapshot> {
        Ok(self.get(id)?.completion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CapturedRequest;
    use crate::completion::CompletionState;

    #[test]
    fn test_create_master_node_requires_url() {
        let mut session = AnalysisSession::new();
        let catalog = RequestCatalog::default();
        assert!(matches!(
            session.create_master_node(&catalog),
            Err(Error::NoActionUrl)
        ));
    }

    #[test]
    fn test_create_master_node_is_idempotent() {
        let catalog = RequestCatalog::new(vec![CapturedRequest::new("POST", "https://x.test/api/buy")]);
        let mut session = AnalysisSession::new();
        session.set_action_url("https://x.test/api/buy");

        let first = session.create_master_node(&catalog).unwrap();
        let second = session.create_master_node(&catalog).unwrap();

        assert_eq!(first, second);
        assert_eq!(session.graph.node_count(), 1);
        assert_eq!(session.graph.get_node(first).unwrap().kind, NodeKind::MasterRequest);
        assert_eq!(session.completion().state, CompletionState::InProgress);
    }

    #[test]
    fn test_uncaptured_target_gets_placeholder() {
        let mut session = AnalysisSession::new();
        session.set_action_url("https://x.test/missing");

        let id = session.create_master_node(&RequestCatalog::default()).unwrap();
        let node = session.graph.get_node(id).unwrap();

        assert_eq!(node.kind, NodeKind::Master);
        assert_eq!(node.dynamic_parts, vec!["https://x.test/missing"]);
    }

    #[test]
    fn test_store_end_drops_session() {
        let mut store = SessionStore::new();
        let id = store.create();
        assert!(store.analyze_completion_state(id).is_ok());

        store.end(id).unwrap();
        assert!(matches!(
            store.analyze_completion_state(id),
            Err(Error::SessionNotFound(missing)) if missing == id
        ));
    }
}
